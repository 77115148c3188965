// Licensed under the Apache-2.0 license

//! High-level I2C controller abstraction for the packet-mode controller.
//!
//! [`I2cController`] is the transaction side of the driver. It owns the
//! platform handles (reset and clocks, delay, bus recovery), borrows the
//! [`ControllerRegion`] it shares with the interrupt handler, and serialises
//! batches through `&mut self`. [`I2cBus`] binds a controller to one bus
//! configuration and implements the embedded-hal `I2c` traits on top of it.

use crate::common::{Logger, NoOpLogger};
use crate::i2c::common::{
    BusConfig, ConfigurationError, ControllerConfig, Message, PinmuxId, MAX_MESSAGE_LEN,
};
use crate::i2c::error::{BatchError, ErrorFlags, InitError, TransferError};
use crate::i2c::hardware_instantiation::ControllerInstance;
use crate::i2c::packet::PacketHeader;
use crate::i2c::region::ControllerRegion;
use crate::i2c::registers::{IntStatus, Reg, RegisterBus, DVC_CTRL_REG3_I2C_DONE_INTR_EN};
use crate::i2c::system_setup::{I2cSystemSetup, CLOCK_DIVISOR};
use crate::i2c::traits::{
    BusRecovery, Completion, ErrorType, I2cMaster, IrqControl, NoRecovery, PinmuxControl,
    SystemControl, WaitOutcome,
};
use crate::syscon::{ClockId, ResetId};
use bitflags::bitflags;
use core::fmt::Debug;
use core::sync::atomic::Ordering;
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{Operation, SevenBitAddress, TenBitAddress};
use fugit::HertzU32;

/// Consecutive failed re-inits after which batches fail fast.
pub const MAX_REINIT_FAILURES: u8 = 3;

/// Direction changes accepted in one embedded-hal transaction.
pub const MAX_OPERATIONS: usize = 16;

bitflags! {
    /// Protocol support advertised to client drivers.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct Functionality: u32 {
        const I2C = 0x0000_0001;
        const SMBUS_READ_BYTE = 0x0002_0000;
        const SMBUS_WRITE_BYTE = 0x0004_0000;
        const SMBUS_READ_BYTE_DATA = 0x0008_0000;
        const SMBUS_WRITE_BYTE_DATA = 0x0010_0000;
        const SMBUS_BYTE = Self::SMBUS_READ_BYTE.bits() | Self::SMBUS_WRITE_BYTE.bits();
        const SMBUS_BYTE_DATA = Self::SMBUS_READ_BYTE_DATA.bits() | Self::SMBUS_WRITE_BYTE_DATA.bits();
    }
}

pub struct I2cController<'r, B, Q, C, S, D, R = NoRecovery, L = NoOpLogger> {
    region: &'r ControllerRegion<B, Q, C, L>,
    config: ControllerConfig,
    clock: ClockId,
    reset: ResetId,
    sys: S,
    delay: D,
    recovery: R,
    active_pinmux: Option<PinmuxId>,
    last_rate: HertzU32,
    clock_on: bool,
    suspended: bool,
    init_failures: u8,
}

impl<'r, B, Q, C, S, D, L> I2cController<'r, B, Q, C, S, D, NoRecovery, L>
where
    B: RegisterBus,
    Q: IrqControl,
    C: Completion,
    S: SystemControl<ClockId = ClockId, ResetId = ResetId> + PinmuxControl,
    <S as ErrorType>::Error: Debug,
    D: DelayNs,
    L: Logger,
{
    /// Bring up the controller behind `region` without a bus-recovery
    /// strategy.
    ///
    /// # Errors
    ///
    /// Returns any [`InitError`] from the first `init()`, including a FIFO
    /// flush timeout.
    pub fn attach(
        region: &'r ControllerRegion<B, Q, C, L>,
        config: ControllerConfig,
        sys: S,
        delay: D,
    ) -> Result<Self, InitError> {
        Self::attach_with_recovery(region, config, sys, delay, NoRecovery)
    }
}

impl<'r, B, Q, C, S, D, R, L> I2cController<'r, B, Q, C, S, D, R, L>
where
    B: RegisterBus,
    Q: IrqControl,
    C: Completion,
    S: SystemControl<ClockId = ClockId, ResetId = ResetId> + PinmuxControl,
    <S as ErrorType>::Error: Debug,
    D: DelayNs,
    R: BusRecovery,
    L: Logger,
{
    /// Bring up the controller behind `region`.
    ///
    /// Runs a full `init()` at the default bus rate and enables the
    /// interrupt line.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::Configuration`] for an unknown controller id or
    /// when a slave-capable config is attached to the DVC instance, or any
    /// error from the first `init()`.
    pub fn attach_with_recovery(
        region: &'r ControllerRegion<B, Q, C, L>,
        config: ControllerConfig,
        sys: S,
        delay: D,
        recovery: R,
    ) -> Result<Self, InitError> {
        let instance = ControllerInstance::from_cont_id(config.cont_id)
            .ok_or(ConfigurationError::UnknownController(config.cont_id))?;
        if region.regs.is_embedded() && config.slave_capable {
            return Err(ConfigurationError::SlaveNotSupported.into());
        }

        let mut controller = Self {
            region,
            config,
            clock: instance.clock_id(),
            reset: instance.reset_id(),
            sys,
            delay,
            recovery,
            active_pinmux: None,
            last_rate: config.default_bus_rate,
            clock_on: false,
            suspended: false,
            init_failures: 0,
        };

        region.irq_disabled.store(false, Ordering::Release);
        if config.clock_always_on {
            controller.clock_acquire()?;
        }
        controller.init()?;
        region.irq.enable_irq();
        Ok(controller)
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn region(&self) -> &'r ControllerRegion<B, Q, C, L> {
        self.region
    }

    pub fn system(&self) -> &S {
        &self.sys
    }

    pub fn system_mut(&mut self) -> &mut S {
        &mut self.sys
    }

    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Bus rate the controller clock is currently programmed for.
    #[must_use]
    pub fn bus_rate(&self) -> HertzU32 {
        self.last_rate
    }

    #[must_use]
    pub fn active_pinmux(&self) -> Option<PinmuxId> {
        self.active_pinmux
    }

    #[must_use]
    pub fn functionality(&self) -> Functionality {
        Functionality::I2C | Functionality::SMBUS_BYTE | Functionality::SMBUS_BYTE_DATA
    }

    fn logger(&self) -> &'r L {
        &self.region.logger
    }

    /// Ungate the controller clock. Returns whether this call turned it on.
    fn clock_acquire(&mut self) -> Result<bool, InitError> {
        if self.clock_on {
            return Ok(false);
        }
        if let Err(err) = self.sys.enable(&self.clock) {
            self.logger()
                .error(format_args!("failed to enable controller clock: {err:?}"));
            return Err(InitError::Clock);
        }
        self.clock_on = true;
        Ok(true)
    }

    fn clock_release(&mut self) {
        if !self.clock_on || self.config.clock_always_on {
            return;
        }
        if let Err(err) = self.sys.disable(&self.clock) {
            self.logger()
                .warn(format_args!("failed to gate controller clock: {err:?}"));
        }
        self.clock_on = false;
    }

    /// Reset and reprogram the controller.
    ///
    /// A FIFO flush timeout is returned only after every other step has
    /// completed, and does not stop later transfers. Success, including a
    /// flush timeout, clears the re-init failure count.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::Reset`] or [`InitError::Clock`] if the system
    /// controller fails, or [`InitError::FlushTimeout`].
    pub fn init(&mut self) -> Result<(), InitError> {
        let acquired = self.clock_acquire()?;
        let result = self.program();
        if acquired {
            self.clock_release();
        }
        if let Err(err) = result {
            if err.is_hard() {
                return result;
            }
        }
        self.init_failures = 0;
        result
    }

    fn program(&mut self) -> Result<(), InitError> {
        let region = self.region;

        if let Err(err) = I2cSystemSetup::reset_controller(&mut self.sys, self.reset, &mut self.delay) {
            region
                .logger
                .error(format_args!("controller reset failed: {err:?}"));
            return Err(InitError::Reset);
        }

        if region.regs.is_embedded() {
            region.dvc_init();
        }
        region.configure_packet_mode();

        if let Err(err) = I2cSystemSetup::program_bus_clock(&mut self.sys, self.clock, self.last_rate) {
            region
                .logger
                .error(format_args!("failed to program bus clock: {err:?}"));
            return Err(InitError::Clock);
        }
        region.regs.write(Reg::ClkDivisor, CLOCK_DIVISOR);
        region.configure_fifo_triggers();

        if self.config.slave_capable {
            region.slave_init(self.config.slave_address);
        }

        let flushed = region.flush_fifos(&mut self.delay);
        region.restore_line();
        flushed
    }

    /// Re-init after a failed message. Only hard failures are counted.
    fn reinit_after_error(&mut self) {
        match self.init() {
            Ok(()) => {}
            Err(InitError::FlushTimeout) => {
                self.logger()
                    .warn(format_args!("re-init left fifo flush pending"));
            }
            Err(err) => {
                self.init_failures = self.init_failures.saturating_add(1);
                self.logger().error(format_args!(
                    "re-init failed: {err:?} ({} consecutive)",
                    self.init_failures
                ));
            }
        }
    }

    fn select_bus(&mut self, bus: &BusConfig) {
        if self.active_pinmux != bus.pinmux {
            if let Err(err) =
                I2cSystemSetup::switch_pinmux(&mut self.sys, self.active_pinmux, bus.pinmux)
            {
                self.logger()
                    .warn(format_args!("pinmux switch failed: {err:?}"));
            }
            self.active_pinmux = bus.pinmux;
        }

        // The cached rate only moves once the clock tree accepted it, so a
        // failed switch is attempted again on the next batch.
        if self.last_rate != bus.rate {
            match I2cSystemSetup::program_bus_clock(&mut self.sys, self.clock, bus.rate) {
                Ok(_) => {
                    self.last_rate = bus.rate;
                    self.region.regs.write(Reg::ClkDivisor, CLOCK_DIVISOR);
                }
                Err(err) => self
                    .logger()
                    .warn(format_args!("failed to set bus rate {}: {err:?}", bus.rate)),
            }
        }
    }

    /// Run one message to completion.
    ///
    /// `is_last` ends the message with a stop condition instead of a repeated
    /// start. Bus selection and clock gating are done by
    /// [`I2cController::transfer_batch`]; call this directly only inside a
    /// batch the caller has already set up.
    ///
    /// # Errors
    ///
    /// Returns the classified [`TransferError`]. Every error except
    /// [`TransferError::InvalidArgument`] leaves the controller re-initialised.
    pub fn transfer_message(
        &mut self,
        bus: &BusConfig,
        message: &mut Message<'_>,
        is_last: bool,
    ) -> Result<(), TransferError> {
        let region = self.region;

        if region.flush_fifos(&mut self.delay).is_err() {
            region
                .logger
                .debug(format_args!("continuing after fifo flush timeout"));
        }

        let len = message.len();
        if len == 0 || len > MAX_MESSAGE_LEN {
            return Err(TransferError::InvalidArgument);
        }

        let header = PacketHeader::build(
            message,
            is_last,
            self.config.cont_id,
            self.config.high_speed_master_code,
        );
        let remaining = region.begin(message, header)?;

        let embedded = region.regs.is_embedded();
        if embedded {
            region.regs.dvc_unmask_irq(DVC_CTRL_REG3_I2C_DONE_INTR_EN);
        }

        let mut int_mask =
            IntStatus::NO_ACK | IntStatus::ARBITRATION_LOST | IntStatus::TX_FIFO_OVERFLOW;
        if message.is_read() {
            int_mask |= IntStatus::RX_FIFO_DATA_REQ;
        } else if remaining > 0 {
            int_mask |= IntStatus::TX_FIFO_DATA_REQ;
        }
        region.regs.unmask_irq(int_mask);
        region.logger.debug(format_args!(
            "unmasked irq: {:#04x}",
            region.regs.read(Reg::IntMask)
        ));

        let outcome = region.completion.wait_for(bus.timeout());
        region.regs.mask_irq(int_mask);
        if embedded {
            region.regs.dvc_mask_irq(DVC_CTRL_REG3_I2C_DONE_INTR_EN);
        }

        if outcome == WaitOutcome::TimedOut {
            region.logger.error(format_args!(
                "transfer timed out, addr {:#06x}, data {:#04x}",
                message.address,
                message.first_byte().unwrap_or(0)
            ));
            region.dump_state();
            self.reinit_after_error();
            return Err(TransferError::Timeout);
        }

        let errors = region.finish(message);
        if errors.is_empty() {
            return Ok(());
        }
        region.dump_state();

        if errors == ErrorFlags::ARBITRATION_LOST {
            let recovered = match self.recovery.recover(bus.scl_gpio, bus.sda_gpio) {
                Ok(()) => true,
                Err(err) => {
                    region
                        .logger
                        .debug(format_args!("bus recovery unavailable: {err:?}"));
                    false
                }
            };
            self.reinit_after_error();
            return Err(TransferError::ArbitrationLost { recovered });
        }

        self.reinit_after_error();
        errors.classify(message.flags)
    }

    /// Run `messages` in order on `bus`, stopping at the first failure.
    ///
    /// Only the final message ends with a stop condition. The bus's pin
    /// configuration and rate are applied only when they differ from what
    /// the controller last used.
    ///
    /// # Errors
    ///
    /// Returns a [`BatchError`] carrying the first error and the number of
    /// messages that completed before it.
    pub fn transfer_batch(
        &mut self,
        bus: &BusConfig,
        messages: &mut [Message<'_>],
    ) -> Result<usize, BatchError> {
        if self.suspended {
            return Err(BatchError::new(0, TransferError::Suspended));
        }
        if self.init_failures >= MAX_REINIT_FAILURES {
            return Err(BatchError::new(0, TransferError::ControllerFault));
        }
        let acquired = self
            .clock_acquire()
            .map_err(|_| BatchError::new(0, TransferError::ControllerFault))?;

        self.select_bus(bus);

        let last = messages.len().saturating_sub(1);
        let mut completed = 0;
        let mut failure = None;
        for (index, message) in messages.iter_mut().enumerate() {
            match self.transfer_message(bus, message, index == last) {
                Ok(()) => completed += 1,
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
        }

        if acquired {
            self.clock_release();
        }
        match failure {
            None => Ok(completed),
            Some(error) => Err(BatchError::new(completed, error)),
        }
    }

    /// Refuse new batches until [`I2cController::resume`].
    pub fn suspend(&mut self) {
        self.suspended = true;
        if self.clock_on {
            if let Err(err) = self.sys.disable(&self.clock) {
                self.logger()
                    .warn(format_args!("failed to gate controller clock: {err:?}"));
            }
            self.clock_on = false;
        }
    }

    /// Re-initialise and accept batches again.
    ///
    /// # Errors
    ///
    /// Returns any [`InitError`]; the controller then stays suspended.
    pub fn resume(&mut self) -> Result<(), InitError> {
        if self.config.clock_always_on {
            self.clock_acquire()?;
        }
        self.init()?;
        self.suspended = false;
        Ok(())
    }

    /// Mask every interrupt, shut the line off and gate the clock.
    ///
    /// Returns the system controller handle.
    pub fn detach(mut self) -> S {
        if self.clock_acquire().is_ok() {
            self.region.regs.write(Reg::IntMask, 0);
        }
        self.region.disable_line();
        if self.clock_on {
            if let Err(err) = self.sys.disable(&self.clock) {
                self.logger()
                    .warn(format_args!("failed to gate controller clock: {err:?}"));
            }
            self.clock_on = false;
        }
        self.sys
    }
}

impl<B, Q, C, S, D, R, L> I2cMaster for I2cController<'_, B, Q, C, S, D, R, L>
where
    B: RegisterBus,
    Q: IrqControl,
    C: Completion,
    S: SystemControl<ClockId = ClockId, ResetId = ResetId> + PinmuxControl,
    <S as ErrorType>::Error: Debug,
    D: DelayNs,
    R: BusRecovery,
    L: Logger,
{
    fn transfer_batch(
        &mut self,
        bus: &BusConfig,
        messages: &mut [Message<'_>],
    ) -> Result<usize, BatchError> {
        I2cController::transfer_batch(self, bus, messages)
    }
}

/// One bus of a controller, usable wherever an embedded-hal `I2c` is.
///
/// Batches failing with a retryable error are resubmitted up to
/// `BusConfig::retries` times.
pub struct I2cBus<'c, T> {
    controller: &'c mut T,
    config: BusConfig,
}

impl<'c, T: I2cMaster> I2cBus<'c, T> {
    pub fn new(controller: &'c mut T, config: BusConfig) -> Self {
        Self { controller, config }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    fn run(&mut self, messages: &mut [Message<'_>]) -> Result<(), TransferError> {
        let mut attempt = 0;
        loop {
            match self.controller.transfer_batch(&self.config, messages) {
                Ok(_) => return Ok(()),
                Err(err) if err.error.is_retryable() && attempt < self.config.retries => {
                    attempt += 1;
                }
                Err(err) => return Err(err.error),
            }
        }
    }

    /// Run `operations` as one batch.
    ///
    /// Adjacent operations in the same direction share one message, so no
    /// start or stop condition separates them on the wire. A run of several
    /// operations is staged through a scratch buffer and split back out once
    /// the batch has completed.
    fn transact(
        &mut self,
        address: u16,
        ten_bit: bool,
        operations: &mut [Operation<'_>],
    ) -> Result<(), TransferError> {
        let runs = plan_runs(operations)?;
        if runs.is_empty() {
            return Ok(());
        }

        let mut scratch: heapless::Vec<u8, MAX_MESSAGE_LEN> = heapless::Vec::new();
        for run in runs.iter().filter(|run| run.count > 1) {
            if run.read {
                scratch
                    .resize(scratch.len() + run.len, 0)
                    .map_err(|()| TransferError::InvalidArgument)?;
                continue;
            }
            for operation in operations.iter().skip(run.first).take(run.count) {
                if let Operation::Write(bytes) = operation {
                    scratch
                        .extend_from_slice(bytes)
                        .map_err(|()| TransferError::InvalidArgument)?;
                }
            }
        }

        {
            let mut messages: heapless::Vec<Message<'_>, MAX_OPERATIONS> = heapless::Vec::new();
            let mut pending = operations.iter_mut();
            let mut staged: &mut [u8] = scratch.as_mut_slice();
            for run in &runs {
                let message = if run.count == 1 {
                    match pending.next() {
                        Some(Operation::Read(buffer)) => Message::read(address, buffer),
                        Some(Operation::Write(bytes)) => Message::write(address, bytes),
                        None => return Err(TransferError::InvalidArgument),
                    }
                } else {
                    pending.nth(run.count - 1);
                    let (chunk, rest) = core::mem::take(&mut staged)
                        .split_at_mut_checked(run.len)
                        .ok_or(TransferError::InvalidArgument)?;
                    staged = rest;
                    if run.read {
                        Message::read(address, chunk)
                    } else {
                        Message::write(address, chunk)
                    }
                };
                let message = if ten_bit { message.ten_bit() } else { message };
                messages
                    .push(message)
                    .map_err(|_| TransferError::InvalidArgument)?;
            }
            self.run(&mut messages)?;
        }

        let mut offset = 0;
        for run in runs.iter().filter(|run| run.count > 1) {
            let start = offset;
            offset += run.len;
            if !run.read {
                continue;
            }
            let mut received = scratch.get(start..offset).unwrap_or_default();
            for operation in operations.iter_mut().skip(run.first).take(run.count) {
                if let Operation::Read(buffer) = operation {
                    let (head, rest) = received
                        .split_at_checked(buffer.len())
                        .ok_or(TransferError::InvalidArgument)?;
                    buffer.copy_from_slice(head);
                    received = rest;
                }
            }
        }
        Ok(())
    }
}

/// Consecutive operations sharing a direction.
#[derive(Copy, Clone, Debug)]
struct Run {
    read: bool,
    first: usize,
    count: usize,
    len: usize,
}

fn plan_runs(
    operations: &[Operation<'_>],
) -> Result<heapless::Vec<Run, MAX_OPERATIONS>, TransferError> {
    let mut runs: heapless::Vec<Run, MAX_OPERATIONS> = heapless::Vec::new();
    for (index, operation) in operations.iter().enumerate() {
        let (read, len) = match operation {
            Operation::Read(buffer) => (true, buffer.len()),
            Operation::Write(bytes) => (false, bytes.len()),
        };
        match runs.last_mut() {
            Some(run) if run.read == read => {
                run.count += 1;
                run.len += len;
            }
            _ => runs
                .push(Run {
                    read,
                    first: index,
                    count: 1,
                    len,
                })
                .map_err(|_| TransferError::InvalidArgument)?,
        }
    }
    Ok(runs)
}

impl<T: I2cMaster> embedded_hal::i2c::ErrorType for I2cBus<'_, T> {
    type Error = TransferError;
}

impl<T: I2cMaster> embedded_hal::i2c::I2c<SevenBitAddress> for I2cBus<'_, T> {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.transact(u16::from(address), false, operations)
    }
}

impl<T: I2cMaster> embedded_hal::i2c::I2c<TenBitAddress> for I2cBus<'_, T> {
    fn transaction(
        &mut self,
        address: TenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.transact(address, true, operations)
    }
}
