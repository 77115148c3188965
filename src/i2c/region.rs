// Licensed under the Apache-2.0 license

//! State shared between the transfer path and the interrupt handler.
//!
//! A [`ControllerRegion`] is created once per controller and borrowed by the
//! [`crate::i2c::i2c_controller::I2cController`] that drives it and by the
//! interrupt vector that calls [`ControllerRegion::handle_interrupt`]. The
//! per-message bookkeeping lives behind a critical section so the handler and
//! the caller never observe a half-updated cursor.

use crate::common::{Logger, NoOpLogger};
use crate::i2c::common::{Message, Payload, MAX_MESSAGE_LEN};
use crate::i2c::error::{ErrorFlags, TransferError};
use crate::i2c::fifo;
use crate::i2c::packet::PacketHeader;
use crate::i2c::registers::{Reg, RegisterBus, Registers};
use crate::i2c::traits::{Completion, IrqControl};
use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};
use critical_section::Mutex;
use heapless::Vec;

/// Bookkeeping for the one message in flight.
pub(crate) struct Transfer {
    pub(crate) buf: Vec<u8, MAX_MESSAGE_LEN>,
    pub(crate) cursor: usize,
    pub(crate) read: bool,
    pub(crate) address: u16,
    pub(crate) header: PacketHeader,
    pub(crate) errors: ErrorFlags,
}

impl Transfer {
    const fn new() -> Self {
        Self {
            buf: Vec::new(),
            cursor: 0,
            read: false,
            address: 0,
            header: PacketHeader {
                generic: 0,
                payload_size: 0,
                io: 0,
            },
            errors: ErrorFlags::empty(),
        }
    }

    /// Bytes still to be moved through the FIFO.
    pub(crate) fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.cursor)
    }

    pub(crate) fn fill<B: RegisterBus>(&mut self, regs: &Registers<B>) {
        let moved = self
            .buf
            .get(self.cursor..)
            .map_or(0, |pending| fifo::fill_tx(regs, pending));
        self.cursor += moved;
    }

    pub(crate) fn drain<B: RegisterBus>(&mut self, regs: &Registers<B>) {
        let cursor = self.cursor;
        let moved = self
            .buf
            .get_mut(cursor..)
            .map_or(0, |dest| fifo::drain_rx(regs, dest));
        self.cursor += moved;
    }
}

pub struct ControllerRegion<B, Q, C, L = NoOpLogger> {
    pub(crate) regs: Registers<B>,
    pub(crate) irq: Q,
    pub(crate) completion: C,
    pub(crate) logger: L,
    pub(crate) xfer: Mutex<RefCell<Transfer>>,
    pub(crate) irq_disabled: AtomicBool,
}

impl<B, Q, C, L> ControllerRegion<B, Q, C, L>
where
    B: RegisterBus,
    Q: IrqControl,
    C: Completion,
    L: Logger,
{
    /// `embedded` selects the relocated register layout of the instance
    /// living inside the DVC block.
    pub const fn new(bus: B, embedded: bool, irq: Q, completion: C, logger: L) -> Self {
        Self {
            regs: Registers::new(bus, embedded),
            irq,
            completion,
            logger,
            xfer: Mutex::new(RefCell::new(Transfer::new())),
            irq_disabled: AtomicBool::new(false),
        }
    }

    pub fn registers(&self) -> &Registers<B> {
        &self.regs
    }

    pub fn irq(&self) -> &Q {
        &self.irq
    }

    /// Whether the interrupt handler shut the line off after a storm or an
    /// inconsistent status. The next `init()` turns it back on.
    pub fn irq_line_disabled(&self) -> bool {
        self.irq_disabled.load(Ordering::Acquire)
    }

    /// Load `message`, queue its header and, for writes, prime the FIFO.
    ///
    /// Returns the bytes left for the interrupt handler to move.
    pub(crate) fn begin(
        &self,
        message: &Message<'_>,
        header: PacketHeader,
    ) -> Result<usize, TransferError> {
        critical_section::with(|cs| {
            let mut xfer = self.xfer.borrow_ref_mut(cs);
            xfer.buf.clear();
            let loaded = match &message.payload {
                Payload::Write(bytes) => xfer.buf.extend_from_slice(bytes),
                Payload::Read(buf) => xfer.buf.resize(buf.len(), 0),
            };
            loaded.map_err(|()| TransferError::InvalidArgument)?;
            xfer.cursor = 0;
            xfer.read = message.is_read();
            xfer.address = message.address;
            xfer.header = header;
            xfer.errors = ErrorFlags::empty();
            self.completion.reinit();

            self.regs.write_burst(Reg::TxFifo, &header.words());
            if !xfer.read {
                xfer.fill(&self.regs);
            }
            Ok(xfer.remaining())
        })
    }

    /// Collect the outcome of the message and copy received bytes out.
    pub(crate) fn finish(&self, message: &mut Message<'_>) -> ErrorFlags {
        critical_section::with(|cs| {
            let xfer = self.xfer.borrow_ref(cs);
            if let Payload::Read(dest) = &mut message.payload {
                if let Some(src) = xfer.buf.get(..dest.len()) {
                    dest.copy_from_slice(src);
                }
            }
            xfer.errors
        })
    }

    pub(crate) fn disable_line(&self) {
        if !self.irq_disabled.swap(true, Ordering::AcqRel) {
            self.irq.disable_irq();
        }
    }

    pub(crate) fn restore_line(&self) {
        if self.irq_disabled.swap(false, Ordering::AcqRel) {
            self.irq.enable_irq();
        }
    }

    /// Log the controller registers and the header of the current packet.
    pub(crate) fn dump_state(&self) {
        self.logger.debug(format_args!(
            "reg: cnfg {:#010x} status {:#010x} int_status {:#010x} packet {:#010x}",
            self.regs.read(Reg::Cnfg),
            self.regs.read(Reg::Status),
            self.regs.read(Reg::IntStatus),
            self.regs.read(Reg::PacketTransferStatus),
        ));
        let header = critical_section::with(|cs| self.xfer.borrow_ref(cs).header);
        self.logger.debug(format_args!(
            "packet: {:#010x} {} {:#010x}",
            header.generic, header.payload_size, header.io
        ));
    }
}
