// Licensed under the Apache-2.0 license

//! Register map and access layer for the packet-mode I2C controller.
//!
//! Register identifiers are logical. One controller instance lives inside the
//! DVC (voltage controller) block, where the I2C registers are moved: offsets
//! at or above the TX FIFO shift by `0x10`, everything below shifts by `0x40`.
//! [`Registers`] applies that translation so callers never see it.

use bitflags::bitflags;
use core::ptr::NonNull;

/// Raw 32-bit register I/O at a byte offset from the block base.
///
/// Methods take `&self` because the interrupt handler and the transfer path
/// share the register window. Implementations must be volatile.
pub trait RegisterBus {
    fn read32(&self, offset: usize) -> u32;
    fn write32(&self, offset: usize, value: u32);
}

impl<T: RegisterBus + ?Sized> RegisterBus for &T {
    fn read32(&self, offset: usize) -> u32 {
        (**self).read32(offset)
    }

    fn write32(&self, offset: usize, value: u32) {
        (**self).write32(offset, value);
    }
}

/// Memory-mapped register window.
pub struct MmioBus {
    base: NonNull<u32>,
}

impl MmioBus {
    /// Wrap the register block at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be the word-aligned, non-null address of the controller's
    /// register block, mapped for the lifetime of the returned value and not
    /// accessed through any other path that assumes exclusive ownership.
    #[must_use]
    pub const unsafe fn new(base: NonNull<u32>) -> Self {
        Self { base }
    }

    fn reg_ptr(&self, offset: usize) -> *mut u32 {
        self.base.as_ptr().cast::<u8>().wrapping_add(offset).cast::<u32>()
    }
}

// SAFETY: the window is only touched through volatile word accesses, which
// the hardware serialises.
unsafe impl Send for MmioBus {}
// SAFETY: see above.
unsafe impl Sync for MmioBus {}

impl RegisterBus for MmioBus {
    fn read32(&self, offset: usize) -> u32 {
        // SAFETY: `new` guarantees the window is mapped; offsets come from `Reg`.
        unsafe { core::ptr::read_volatile(self.reg_ptr(offset)) }
    }

    fn write32(&self, offset: usize, value: u32) {
        // SAFETY: as for `read32`.
        unsafe { core::ptr::write_volatile(self.reg_ptr(offset), value) }
    }
}

/// Logical I2C controller registers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reg {
    Cnfg,
    Status,
    SlCnfg,
    SlAddr1,
    SlAddr2,
    TxFifo,
    RxFifo,
    PacketTransferStatus,
    FifoControl,
    FifoStatus,
    IntMask,
    IntStatus,
    ClkDivisor,
}

impl Reg {
    /// Offset within a standalone controller.
    #[must_use]
    pub const fn offset(self) -> usize {
        match self {
            Reg::Cnfg => 0x000,
            Reg::Status => 0x01c,
            Reg::SlCnfg => 0x020,
            Reg::SlAddr1 => 0x02c,
            Reg::SlAddr2 => 0x030,
            Reg::TxFifo => 0x050,
            Reg::RxFifo => 0x054,
            Reg::PacketTransferStatus => 0x058,
            Reg::FifoControl => 0x05c,
            Reg::FifoStatus => 0x060,
            Reg::IntMask => 0x064,
            Reg::IntStatus => 0x068,
            Reg::ClkDivisor => 0x06c,
        }
    }

    /// Offset after the DVC relocation, when `embedded` is set.
    #[must_use]
    pub const fn physical(self, embedded: bool) -> usize {
        let offset = self.offset();
        if !embedded {
            offset
        } else if offset >= Reg::TxFifo.offset() {
            offset + 0x10
        } else {
            offset + 0x40
        }
    }
}

/// Registers of the DVC block that hosts the embedded controller.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DvcReg {
    CtrlReg1,
    CtrlReg2,
    CtrlReg3,
    Status,
}

impl DvcReg {
    #[must_use]
    pub const fn offset(self) -> usize {
        match self {
            DvcReg::CtrlReg1 => 0x000,
            DvcReg::CtrlReg2 => 0x004,
            DvcReg::CtrlReg3 => 0x008,
            DvcReg::Status => 0x00c,
        }
    }
}

pub const CNFG_DEBOUNCE_CNT_SHIFT: u32 = 12;
pub const CNFG_PACKET_MODE_EN: u32 = 1 << 10;
pub const CNFG_NEW_MASTER_FSM: u32 = 1 << 11;

pub const STATUS_BUSY: u32 = 1 << 8;

pub const SL_CNFG_NACK: u32 = 1 << 1;
pub const SL_CNFG_NEWSL: u32 = 1 << 2;

pub const FIFO_CONTROL_RX_FLUSH: u32 = 1 << 0;
pub const FIFO_CONTROL_TX_FLUSH: u32 = 1 << 1;
pub const FIFO_CONTROL_RX_TRIG_SHIFT: u32 = 2;
pub const FIFO_CONTROL_TX_TRIG_SHIFT: u32 = 5;

pub const FIFO_STATUS_RX_MASK: u32 = 0x0f;
pub const FIFO_STATUS_RX_SHIFT: u32 = 0;
pub const FIFO_STATUS_TX_MASK: u32 = 0xf0;
pub const FIFO_STATUS_TX_SHIFT: u32 = 4;

pub const DVC_CTRL_REG1_INTR_EN: u32 = 1 << 10;
pub const DVC_CTRL_REG3_SW_PROG: u32 = 1 << 26;
pub const DVC_CTRL_REG3_I2C_DONE_INTR_EN: u32 = 1 << 30;
pub const DVC_STATUS_I2C_DONE_INTR: u32 = 1 << 30;

bitflags! {
    /// Bits of the interrupt mask and interrupt status registers.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct IntStatus: u32 {
        const RX_FIFO_DATA_REQ = 1 << 0;
        const TX_FIFO_DATA_REQ = 1 << 1;
        const ARBITRATION_LOST = 1 << 2;
        const NO_ACK = 1 << 3;
        const RX_FIFO_UNDERFLOW = 1 << 4;
        const TX_FIFO_OVERFLOW = 1 << 5;
        const ALL_PACKETS_XFER_COMPLETE = 1 << 6;
        const PACKET_XFER_COMPLETE = 1 << 7;
    }
}

impl IntStatus {
    /// Status bits that end a message with an error.
    pub const ERRORS: Self = Self::NO_ACK
        .union(Self::ARBITRATION_LOST)
        .union(Self::TX_FIFO_OVERFLOW)
        .union(Self::RX_FIFO_UNDERFLOW);

    /// Every interrupt source a transfer may unmask.
    pub const TRANSFER: Self = Self::NO_ACK
        .union(Self::ARBITRATION_LOST)
        .union(Self::PACKET_XFER_COMPLETE)
        .union(Self::TX_FIFO_DATA_REQ)
        .union(Self::RX_FIFO_DATA_REQ)
        .union(Self::TX_FIFO_OVERFLOW);
}

/// Register access for one controller instance.
pub struct Registers<B> {
    bus: B,
    embedded: bool,
}

impl<B: RegisterBus> Registers<B> {
    /// `embedded` marks the instance living inside the DVC block.
    pub const fn new(bus: B, embedded: bool) -> Self {
        Self { bus, embedded }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    #[must_use]
    pub fn is_embedded(&self) -> bool {
        self.embedded
    }

    #[must_use]
    pub fn read(&self, reg: Reg) -> u32 {
        self.bus.read32(reg.physical(self.embedded))
    }

    pub fn write(&self, reg: Reg, value: u32) {
        self.bus.write32(reg.physical(self.embedded), value);
    }

    /// Read `words.len()` consecutive words from one register (a FIFO port).
    pub fn read_burst(&self, reg: Reg, words: &mut [u32]) {
        let offset = reg.physical(self.embedded);
        for word in words.iter_mut() {
            *word = self.bus.read32(offset);
        }
    }

    /// Write every word in `words` to one register (a FIFO port).
    pub fn write_burst(&self, reg: Reg, words: &[u32]) {
        let offset = reg.physical(self.embedded);
        for word in words {
            self.bus.write32(offset, *word);
        }
    }

    /// DVC block registers are never relocated.
    #[must_use]
    pub fn dvc_read(&self, reg: DvcReg) -> u32 {
        self.bus.read32(reg.offset())
    }

    pub fn dvc_write(&self, reg: DvcReg, value: u32) {
        self.bus.write32(reg.offset(), value);
    }

    #[must_use]
    pub fn int_status(&self) -> IntStatus {
        IntStatus::from_bits_retain(self.read(Reg::IntStatus))
    }

    pub fn mask_irq(&self, bits: IntStatus) {
        let mask = self.read(Reg::IntMask) & !bits.bits();
        self.write(Reg::IntMask, mask);
    }

    pub fn unmask_irq(&self, bits: IntStatus) {
        let mask = self.read(Reg::IntMask) | bits.bits();
        self.write(Reg::IntMask, mask);
    }

    pub fn dvc_mask_irq(&self, bits: u32) {
        let mask = self.dvc_read(DvcReg::CtrlReg3) & !bits;
        self.dvc_write(DvcReg::CtrlReg3, mask);
    }

    pub fn dvc_unmask_irq(&self, bits: u32) {
        let mask = self.dvc_read(DvcReg::CtrlReg3) | bits;
        self.dvc_write(DvcReg::CtrlReg3, mask);
    }

    /// Free word slots in the transmit FIFO.
    #[must_use]
    pub fn tx_fifo_free(&self) -> usize {
        ((self.read(Reg::FifoStatus) & FIFO_STATUS_TX_MASK) >> FIFO_STATUS_TX_SHIFT) as usize
    }

    /// Words waiting in the receive FIFO.
    #[must_use]
    pub fn rx_fifo_count(&self) -> usize {
        ((self.read(Reg::FifoStatus) & FIFO_STATUS_RX_MASK) >> FIFO_STATUS_RX_SHIFT) as usize
    }
}
