// Licensed under the Apache-2.0 license

//! Simulated packet-mode controller for host tests.
//!
//! [`SimHardware`] answers register accesses the way the controller does:
//! it parses the three header words written to the transmit FIFO, hands
//! payload to a per-address device model, feeds the receive FIFO, latches
//! interrupt status and honours the flush bits. [`with_pump`] runs an
//! interrupt thread next to the test body that steps the bus and calls
//! [`ControllerRegion::handle_interrupt`] whenever an unmasked source is
//! pending.

use crate::common::NoOpLogger;
use crate::i2c::common::PinmuxId;
use crate::i2c::completion::CondvarCompletion;
use crate::i2c::packet::{
    I2C_HEADER_10BIT_ADDR, I2C_HEADER_IE_ENABLE, I2C_HEADER_READ, I2C_HEADER_SLAVE_ADDR_SHIFT,
};
use crate::i2c::region::ControllerRegion;
use crate::i2c::registers::{
    DvcReg, IntStatus, Reg, RegisterBus, FIFO_CONTROL_RX_FLUSH, FIFO_CONTROL_TX_FLUSH,
    FIFO_STATUS_TX_SHIFT, STATUS_BUSY,
};
use crate::i2c::traits::{ErrorType, IrqControl, PinmuxControl, SystemControl};
use crate::syscon::{ClockConfig, ClockId, ResetId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Words the simulated transmit and receive FIFOs hold.
pub(crate) const SIM_FIFO_WORDS: usize = 8;

const RX_PAD: u8 = 0xab;

const ALL_REGS: [Reg; 13] = [
    Reg::Cnfg,
    Reg::Status,
    Reg::SlCnfg,
    Reg::SlAddr1,
    Reg::SlAddr2,
    Reg::TxFifo,
    Reg::RxFifo,
    Reg::PacketTransferStatus,
    Reg::FifoControl,
    Reg::FifoStatus,
    Reg::IntMask,
    Reg::IntStatus,
    Reg::ClkDivisor,
];

const ALL_DVC_REGS: [DvcReg; 4] = [
    DvcReg::CtrlReg1,
    DvcReg::CtrlReg2,
    DvcReg::CtrlReg3,
    DvcReg::Status,
];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Behaviour {
    Ack,
    Nack,
    /// Lose arbitration on the next `times` packets, then acknowledge.
    ArbitrationLost { times: u32 },
    /// Never finish a packet.
    Silent,
}

#[derive(Debug)]
pub(crate) struct SimDevice {
    pub behaviour: Behaviour,
    pub response: Vec<u8>,
    pub received: Vec<Vec<u8>>,
}

#[derive(Debug)]
struct Packet {
    address: u16,
    read: bool,
    /// Packet completion raises the interrupt only when the header asked.
    interrupt_enable: bool,
    len: usize,
    words_expected: usize,
    words_written: usize,
    delivered: Vec<u8>,
    queued: usize,
    done: bool,
}

enum Target {
    I2c(Reg),
    Dvc(DvcReg),
}

#[derive(Default)]
struct SimState {
    regs: HashMap<usize, u32>,
    dvc: HashMap<usize, u32>,
    latched: u32,
    header: Vec<u32>,
    packet: Option<Packet>,
    headers: Vec<[u32; 3]>,
    tx_fifo: VecDeque<u32>,
    rx_fifo: VecDeque<u32>,
    devices: HashMap<u16, SimDevice>,
    flush_stuck: bool,
    busy: bool,
    spurious: u32,
    dvc_acks: Vec<u32>,
}

impl SimState {
    fn levels(&self) -> u32 {
        let mut status = self.latched;
        if !self.rx_fifo.is_empty() {
            status |= IntStatus::RX_FIFO_DATA_REQ.bits();
        }
        if let Some(packet) = &self.packet {
            if !packet.read && !packet.done && self.tx_fifo.len() < SIM_FIFO_WORDS {
                status |= IntStatus::TX_FIFO_DATA_REQ.bits();
            }
        }
        status
    }

    fn stored(&self, reg: Reg) -> u32 {
        self.regs.get(&reg.offset()).copied().unwrap_or(0)
    }

    fn start_packet(&mut self, words: [u32; 3]) {
        self.headers.push(words);
        let io = words[2];
        let read = io & I2C_HEADER_READ != 0;
        let address = if io & I2C_HEADER_10BIT_ADDR != 0 {
            (io & 0x3ff) as u16
        } else {
            ((io >> I2C_HEADER_SLAVE_ADDR_SHIFT) & 0x7f) as u16
        };
        let len = words[1] as usize + 1;
        self.packet = Some(Packet {
            address,
            read,
            interrupt_enable: io & I2C_HEADER_IE_ENABLE != 0,
            len,
            words_expected: if read { 0 } else { len.div_ceil(4) },
            words_written: 0,
            delivered: Vec::new(),
            queued: 0,
            done: false,
        });
    }

    fn write_tx(&mut self, value: u32) {
        if let Some(packet) = self.packet.as_mut() {
            if packet.words_written < packet.words_expected {
                if self.tx_fifo.len() >= SIM_FIFO_WORDS {
                    self.latched |= IntStatus::TX_FIFO_OVERFLOW.bits();
                } else {
                    self.tx_fifo.push_back(value);
                    packet.words_written += 1;
                }
                return;
            }
        }
        self.header.push(value);
        if self.header.len() == 3 {
            let words = [self.header[0], self.header[1], self.header[2]];
            self.header.clear();
            self.start_packet(words);
        }
    }

    fn step(&mut self) {
        let Some(packet) = self.packet.as_mut() else {
            return;
        };
        if packet.done {
            return;
        }
        let device = self.devices.get_mut(&packet.address);
        let behaviour = device.as_ref().map_or(Behaviour::Nack, |d| d.behaviour);
        match behaviour {
            Behaviour::Silent => return,
            Behaviour::Nack => {
                self.latched |= IntStatus::NO_ACK.bits();
                packet.done = true;
                return;
            }
            Behaviour::ArbitrationLost { times } if times > 0 => {
                if let Some(device) = device {
                    device.behaviour = Behaviour::ArbitrationLost { times: times - 1 };
                }
                self.latched |= IntStatus::ARBITRATION_LOST.bits();
                packet.done = true;
                return;
            }
            _ => {}
        }
        let Some(device) = device else {
            return;
        };

        if packet.read {
            while self.rx_fifo.len() < SIM_FIFO_WORDS && packet.queued < packet.len {
                let mut word = [RX_PAD; 4];
                let take = (packet.len - packet.queued).min(4);
                for (i, byte) in word.iter_mut().take(take).enumerate() {
                    *byte = device
                        .response
                        .get(packet.queued + i)
                        .copied()
                        .unwrap_or(0);
                }
                self.rx_fifo.push_back(u32::from_le_bytes(word));
                packet.queued += take;
            }
            if packet.queued == packet.len {
                self.latched |= IntStatus::PACKET_XFER_COMPLETE.bits();
                packet.done = true;
            }
        } else {
            while let Some(word) = self.tx_fifo.pop_front() {
                let take = (packet.len - packet.delivered.len()).min(4);
                packet.delivered.extend_from_slice(&word.to_le_bytes()[..take]);
            }
            if packet.delivered.len() == packet.len {
                device.received.push(packet.delivered.clone());
                self.latched |= IntStatus::PACKET_XFER_COMPLETE.bits();
                packet.done = true;
            }
        }
    }
}

pub(crate) struct SimHardware {
    embedded: bool,
    state: Mutex<SimState>,
}

impl SimHardware {
    pub(crate) fn new(embedded: bool) -> Self {
        Self {
            embedded,
            state: Mutex::new(SimState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn decode(&self, offset: usize) -> Target {
        // The DVC instance has no slave block; its relocated slave offsets
        // alias the FIFO registers.
        let slave = |r: &Reg| matches!(r, Reg::SlCnfg | Reg::SlAddr1 | Reg::SlAddr2);
        if let Some(reg) = ALL_REGS
            .iter()
            .filter(|r| !(self.embedded && slave(*r)))
            .find(|r| r.physical(self.embedded) == offset)
        {
            return Target::I2c(*reg);
        }
        if self.embedded {
            if let Some(reg) = ALL_DVC_REGS.iter().find(|r| r.offset() == offset) {
                return Target::Dvc(*reg);
            }
        }
        panic!("access to unmapped offset {offset:#x}");
    }

    pub(crate) fn add_device(&self, address: u16, behaviour: Behaviour, response: &[u8]) {
        self.state().devices.insert(
            address,
            SimDevice {
                behaviour,
                response: response.to_vec(),
                received: Vec::new(),
            },
        );
    }

    pub(crate) fn received(&self, address: u16) -> Vec<Vec<u8>> {
        self.state()
            .devices
            .get(&address)
            .map(|d| d.received.clone())
            .unwrap_or_default()
    }

    pub(crate) fn headers(&self) -> Vec<[u32; 3]> {
        self.state().headers.clone()
    }

    /// Logical register contents as last programmed.
    pub(crate) fn reg(&self, reg: Reg) -> u32 {
        self.state().stored(reg)
    }

    pub(crate) fn dvc_reg(&self, reg: DvcReg) -> u32 {
        self.state().dvc.get(&reg.offset()).copied().unwrap_or(0)
    }

    /// Values written to the DVC status register, oldest first.
    pub(crate) fn dvc_acks(&self) -> Vec<u32> {
        self.state().dvc_acks.clone()
    }

    /// Place a word in the receive FIFO as if the bus had clocked it in.
    pub(crate) fn push_rx(&self, word: u32) {
        self.state().rx_fifo.push_back(word);
    }

    /// Load a packet header as the driver would, without touching the FIFO.
    pub(crate) fn load_header(&self, words: [u32; 3]) {
        self.state().start_packet(words);
    }

    pub(crate) fn poke(&self, reg: Reg, value: u32) {
        self.state().regs.insert(reg.offset(), value);
    }

    pub(crate) fn set_flush_stuck(&self, stuck: bool) {
        self.state().flush_stuck = stuck;
    }

    pub(crate) fn set_busy(&self, busy: bool) {
        self.state().busy = busy;
    }

    pub(crate) fn latch(&self, bits: IntStatus) {
        self.state().latched |= bits.bits();
    }

    /// Raise `count` interrupts while a packet is loaded, whatever the status.
    pub(crate) fn raise_spurious(&self, count: u32) {
        self.state().spurious = count;
    }

    /// Advance the bus by one device step.
    pub(crate) fn step(&self) {
        self.state().step();
    }

    /// Whether the interrupt output is asserted, consuming one spurious
    /// interrupt if that is the only cause.
    pub(crate) fn poll_irq(&self) -> bool {
        let mut state = self.state();
        let mut enabled = state.stored(Reg::IntMask);
        if state.packet.as_ref().is_some_and(|p| p.interrupt_enable) {
            enabled |= IntStatus::PACKET_XFER_COMPLETE.bits();
        }
        if state.levels() & enabled != 0 {
            return true;
        }
        if state.spurious > 0 && state.packet.is_some() {
            state.spurious -= 1;
            return true;
        }
        false
    }
}

impl RegisterBus for SimHardware {
    fn read32(&self, offset: usize) -> u32 {
        let target = self.decode(offset);
        let mut state = self.state();
        match target {
            Target::Dvc(reg) => state.dvc.get(&reg.offset()).copied().unwrap_or(0),
            Target::I2c(Reg::Status) => {
                if state.busy {
                    STATUS_BUSY
                } else {
                    0
                }
            }
            Target::I2c(Reg::FifoStatus) => {
                let free = (SIM_FIFO_WORDS - state.tx_fifo.len()) as u32;
                let avail = state.rx_fifo.len().min(15) as u32;
                (free << FIFO_STATUS_TX_SHIFT) | avail
            }
            Target::I2c(Reg::RxFifo) => match state.rx_fifo.pop_front() {
                Some(word) => word,
                None => {
                    state.latched |= IntStatus::RX_FIFO_UNDERFLOW.bits();
                    0
                }
            },
            Target::I2c(Reg::TxFifo) => 0,
            Target::I2c(Reg::IntStatus) => state.levels(),
            Target::I2c(Reg::PacketTransferStatus) => state
                .packet
                .as_ref()
                .map_or(0, |p| p.delivered.len() as u32),
            Target::I2c(reg) => state.stored(reg),
        }
    }

    fn write32(&self, offset: usize, value: u32) {
        let target = self.decode(offset);
        let mut state = self.state();
        match target {
            Target::Dvc(DvcReg::Status) => state.dvc_acks.push(value),
            Target::Dvc(reg) => {
                state.dvc.insert(reg.offset(), value);
            }
            Target::I2c(Reg::IntStatus) => state.latched &= !value,
            Target::I2c(Reg::TxFifo) => state.write_tx(value),
            Target::I2c(Reg::FifoControl) => {
                let flush = FIFO_CONTROL_TX_FLUSH | FIFO_CONTROL_RX_FLUSH;
                let mut stored = value;
                if value & flush != 0 && !state.flush_stuck {
                    state.tx_fifo.clear();
                    state.rx_fifo.clear();
                    state.header.clear();
                    state.packet = None;
                    stored &= !flush;
                }
                state.regs.insert(Reg::FifoControl.offset(), stored);
            }
            Target::I2c(reg) => {
                state.regs.insert(reg.offset(), value);
            }
        }
    }
}

/// Interrupt line that only records what the driver asks of it.
#[derive(Default)]
pub(crate) struct SimIrq {
    enabled: AtomicBool,
    pub enables: AtomicU32,
    pub disables: AtomicU32,
}

impl SimIrq {
    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

impl IrqControl for SimIrq {
    fn enable_irq(&self) {
        self.enables.fetch_add(1, Ordering::AcqRel);
        self.enabled.store(true, Ordering::Release);
    }

    fn disable_irq(&self) {
        self.disables.fetch_add(1, Ordering::AcqRel);
        self.enabled.store(false, Ordering::Release);
    }
}

pub(crate) type SimRegion = ControllerRegion<SimHardware, SimIrq, CondvarCompletion, NoOpLogger>;

pub(crate) fn sim_region(embedded: bool) -> SimRegion {
    ControllerRegion::new(
        SimHardware::new(embedded),
        embedded,
        SimIrq::default(),
        CondvarCompletion::new(),
        NoOpLogger,
    )
}

/// Run `body` with an interrupt thread servicing `region`.
pub(crate) fn with_pump<R>(region: &SimRegion, body: impl FnOnce() -> R) -> R {
    let stop = AtomicBool::new(false);
    std::thread::scope(|s| {
        s.spawn(|| {
            while !stop.load(Ordering::Acquire) {
                let hw = region.registers().bus();
                hw.step();
                if region.irq().is_enabled() && hw.poll_irq() {
                    region.handle_interrupt();
                } else {
                    std::thread::sleep(Duration::from_micros(50));
                }
            }
        });
        let result = body();
        stop.store(true, Ordering::Release);
        result
    })
}

/// `SystemControl` that records every call.
#[derive(Default)]
pub(crate) struct MockSystemController {
    pub calls: HashMap<&'static str, usize>,
    pub clock_frequencies: HashMap<ClockId, u64>,
    pub frequencies: Vec<u64>,
    pub enabled_clocks: HashSet<ClockId>,
    pub reset_states: HashMap<ResetId, bool>,
    pub pinmux_log: Vec<(&'static str, PinmuxId)>,
    pub fail_reset: bool,
    pub fail_clock: bool,
}

impl MockSystemController {
    pub(crate) fn count(&self, call: &str) -> usize {
        self.calls.get(call).copied().unwrap_or(0)
    }

    pub(crate) fn clock_enabled(&self, clock_id: ClockId) -> bool {
        self.enabled_clocks.contains(&clock_id)
    }

    fn record(&mut self, call: &'static str) {
        *self.calls.entry(call).or_insert(0) += 1;
    }
}

impl ErrorType for MockSystemController {
    type Error = ();
}

impl SystemControl for MockSystemController {
    type ClockId = ClockId;
    type ResetId = ResetId;
    type ClockConfig = ClockConfig;

    fn enable(&mut self, clock_id: &Self::ClockId) -> Result<(), Self::Error> {
        self.record("enable");
        self.enabled_clocks.insert(*clock_id);
        Ok(())
    }

    fn disable(&mut self, clock_id: &Self::ClockId) -> Result<(), Self::Error> {
        self.record("disable");
        self.enabled_clocks.remove(clock_id);
        Ok(())
    }

    fn set_frequency(&mut self, clock_id: &Self::ClockId, frequency: u64) -> Result<(), Self::Error> {
        self.record("set_frequency");
        if self.fail_clock {
            return Err(());
        }
        self.clock_frequencies.insert(*clock_id, frequency);
        self.frequencies.push(frequency);
        Ok(())
    }

    fn get_frequency(&self, clock_id: &Self::ClockId) -> Result<u64, Self::Error> {
        self.clock_frequencies.get(clock_id).copied().ok_or(())
    }

    fn reset_assert(&mut self, reset_id: &Self::ResetId) -> Result<(), Self::Error> {
        self.record("reset_assert");
        if self.fail_reset {
            return Err(());
        }
        self.reset_states.insert(*reset_id, true);
        Ok(())
    }

    fn reset_deassert(&mut self, reset_id: &Self::ResetId) -> Result<(), Self::Error> {
        self.record("reset_deassert");
        self.reset_states.insert(*reset_id, false);
        Ok(())
    }

    fn reset_pulse(&mut self, reset_id: &Self::ResetId, _duration_us: u32) -> Result<(), Self::Error> {
        self.reset_assert(reset_id)?;
        self.reset_deassert(reset_id)
    }

    fn configure_clock(
        &mut self,
        clock_id: &Self::ClockId,
        config: &Self::ClockConfig,
    ) -> Result<(), Self::Error> {
        self.set_frequency(clock_id, config.rate_hz)?;
        if config.enabled {
            self.enable(clock_id)
        } else {
            self.disable(clock_id)
        }
    }

    fn get_clock_config(&self, clock_id: &Self::ClockId) -> Result<Self::ClockConfig, Self::Error> {
        Ok(ClockConfig {
            rate_hz: self.get_frequency(clock_id)?,
            enabled: self.clock_enabled(*clock_id),
        })
    }
}

impl PinmuxControl for MockSystemController {
    fn set_safe_pinmux(&mut self, pinmux: PinmuxId) -> Result<(), Self::Error> {
        self.record("set_safe_pinmux");
        self.pinmux_log.push(("safe", pinmux));
        Ok(())
    }

    fn apply_pinmux(&mut self, pinmux: PinmuxId) -> Result<(), Self::Error> {
        self.record("apply_pinmux");
        self.pinmux_log.push(("apply", pinmux));
        Ok(())
    }
}

/// Delay that returns immediately.
#[derive(Default)]
pub(crate) struct NoDelay;

impl embedded_hal::delay::DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i2c::packet::I2C_HEADER_REPEAT_START;
    use crate::i2c::registers::DVC_STATUS_I2C_DONE_INTR;

    fn header(io: u32) -> [u32; 3] {
        [0, 0, io | (0x30 << I2C_HEADER_SLAVE_ADDR_SHIFT)]
    }

    #[test]
    fn test_packet_complete_needs_interrupt_enable() {
        let hw = SimHardware::new(false);
        hw.add_device(0x30, Behaviour::Ack, &[0x5a]);

        hw.load_header(header(I2C_HEADER_READ | I2C_HEADER_REPEAT_START));
        hw.step();
        assert_ne!(hw.state().latched & IntStatus::PACKET_XFER_COMPLETE.bits(), 0);
        assert!(!hw.poll_irq());

        hw.load_header(header(I2C_HEADER_READ | I2C_HEADER_IE_ENABLE));
        hw.step();
        assert!(hw.poll_irq());
    }

    #[test]
    fn test_dvc_status_writes_are_recorded() {
        let hw = SimHardware::new(true);
        hw.write32(DvcReg::Status.offset(), DVC_STATUS_I2C_DONE_INTR);
        assert_eq!(hw.dvc_acks(), vec![DVC_STATUS_I2C_DONE_INTR]);
        assert_eq!(hw.dvc_reg(DvcReg::Status), 0);
    }
}
