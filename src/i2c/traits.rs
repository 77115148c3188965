// Licensed under the Apache-2.0 license

//! # Platform seams for the I2C controller driver
//!
//! The driver owns the register window and the transfer state machine. Every
//! resource it does not own is reached through one of the small traits here,
//! so a board crate can supply its clock tree, interrupt controller and
//! scheduler without the driver knowing about them.
//!
//! ```text
//! SystemControl   reset line and controller clock (`OpenProt` HAL)
//! PinmuxControl   pin-configuration tables
//! IrqControl      the controller's interrupt line
//! Completion      wakeup from the interrupt handler to the blocked caller
//! BusRecovery     optional unwedging after arbitration loss
//! I2cMaster       batch submission, implemented by the controller
//! ```

use crate::i2c::common::{BusConfig, Message, PinmuxId};
use crate::i2c::error::BatchError;
use fugit::MillisDurationU32;
pub use openprot_hal_blocking::system_control::{ErrorType, SystemControl};

/// Pin-configuration tables, the part of system control the `OpenProt`
/// [`SystemControl`] trait does not cover.
///
/// The controller is bound on `SystemControl<ClockId = ClockId, ResetId =
/// ResetId> + PinmuxControl`; both share one error type.
///
/// # Examples
///
/// ```rust,no_run
/// use openprot_hal_blocking::system_control::{ErrorType, SystemControl};
/// use tegra_ddk::i2c::{I2cSystemSetup, PinmuxControl, PinmuxId};
/// use tegra_ddk::syscon::{ClockId, ResetId};
/// use fugit::HertzU32;
///
/// fn bring_up<S>(sys: &mut S) -> Result<(), <S as ErrorType>::Error>
/// where
///     S: SystemControl<ClockId = ClockId, ResetId = ResetId> + PinmuxControl,
/// {
///     sys.enable(&ClockId::ClkI2c1)?;
///     I2cSystemSetup::program_bus_clock(sys, ClockId::ClkI2c1, HertzU32::from_raw(400_000))?;
///     I2cSystemSetup::switch_pinmux(sys, None, Some(PinmuxId(0)))
/// }
/// ```
pub trait PinmuxControl: ErrorType {
    /// Park the pins of `pinmux` in their safe (idle) configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be applied.
    fn set_safe_pinmux(&mut self, pinmux: PinmuxId) -> Result<(), Self::Error>;

    /// Route the pins of `pinmux` to the controller.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be applied.
    fn apply_pinmux(&mut self, pinmux: PinmuxId) -> Result<(), Self::Error>;
}

/// The controller's interrupt line.
///
/// Called from both the interrupt handler and the transfer path.
pub trait IrqControl: Sync {
    fn enable_irq(&self);
    fn disable_irq(&self);
}

/// Result of a bounded wait on a [`Completion`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed,
    TimedOut,
}

/// One-shot signal from the interrupt handler to the blocked caller.
pub trait Completion: Sync {
    /// Arm the signal for the next message.
    fn reinit(&self);

    /// Signal the waiter. Safe to call from interrupt context.
    fn complete(&self);

    /// Block until [`Completion::complete`] is called or `timeout` expires.
    fn wait_for(&self, timeout: MillisDurationU32) -> WaitOutcome;
}

/// Strategy for freeing a bus after arbitration loss.
///
/// Receives the clock and data line identifiers of the bus the message was
/// sent on. Returning `Ok` tells the caller the batch may be resubmitted.
pub trait BusRecovery {
    type Error: core::fmt::Debug;

    /// # Errors
    ///
    /// Returns an error if the bus is still held after the attempt.
    fn recover(&mut self, scl_gpio: u32, sda_gpio: u32) -> Result<(), Self::Error>;
}

/// Recovery placeholder for boards without a recovery sequence.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoRecovery;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RecoveryUnsupported;

impl BusRecovery for NoRecovery {
    type Error = RecoveryUnsupported;

    fn recover(&mut self, _scl_gpio: u32, _sda_gpio: u32) -> Result<(), Self::Error> {
        Err(RecoveryUnsupported)
    }
}

/// Batch submission on a controller, as seen by bus adapters.
pub trait I2cMaster {
    /// Run `messages` in order on `bus`.
    ///
    /// # Errors
    ///
    /// Returns the first failure and how many messages completed before it.
    fn transfer_batch(
        &mut self,
        bus: &BusConfig,
        messages: &mut [Message<'_>],
    ) -> Result<usize, BatchError>;
}

impl<R: BusRecovery + ?Sized> BusRecovery for &mut R {
    type Error = R::Error;

    fn recover(&mut self, scl_gpio: u32, sda_gpio: u32) -> Result<(), Self::Error> {
        (**self).recover(scl_gpio, sda_gpio)
    }
}

impl<T: IrqControl + ?Sized> IrqControl for &T {
    fn enable_irq(&self) {
        (**self).enable_irq();
    }

    fn disable_irq(&self) {
        (**self).disable_irq();
    }
}

impl<T: Completion + ?Sized> Completion for &T {
    fn reinit(&self) {
        (**self).reinit();
    }

    fn complete(&self) {
        (**self).complete();
    }

    fn wait_for(&self, timeout: MillisDurationU32) -> WaitOutcome {
        (**self).wait_for(timeout)
    }
}
