// Licensed under the Apache-2.0 license

//! I2C System Setup Helper
//!
//! This module provides helper functions for the system-level half of
//! controller bring-up: the reset pulse, the source clock feeding the
//! divisor, and pin-configuration switching between buses.

use crate::i2c::common::PinmuxId;
use crate::i2c::traits::{ErrorType, PinmuxControl, SystemControl};
use crate::syscon::{ClockId, ResetId};
use embedded_hal::delay::DelayNs;
use fugit::HertzU32;

/// The controller divides its source clock by eight to produce SCL.
pub const SOURCE_CLOCK_MULTIPLIER: u32 = 8;

/// Divisor register value matching [`SOURCE_CLOCK_MULTIPLIER`].
pub const CLOCK_DIVISOR: u32 = 3;

/// Helper for controller system control operations through [`SystemControl`]
pub struct I2cSystemSetup;

impl I2cSystemSetup {
    /// Pulse the controller reset line
    ///
    /// Waits for a pending stop condition to reach the bus, then holds reset
    /// for two microseconds.
    ///
    /// # Errors
    ///
    /// Returns the system controller's error if either edge fails.
    pub fn reset_controller<S, D>(
        system_controller: &mut S,
        reset: ResetId,
        delay: &mut D,
    ) -> Result<(), <S as ErrorType>::Error>
    where
        S: SystemControl<ResetId = ResetId>,
        D: DelayNs,
    {
        delay.delay_ms(1);
        system_controller.reset_assert(&reset)?;
        delay.delay_us(2);
        system_controller.reset_deassert(&reset)
    }

    /// Program the source clock for the given bus rate
    ///
    /// # Returns
    ///
    /// * `Result<HertzU32, S::Error>` - The source rate requested
    ///
    /// # Errors
    ///
    /// Returns the system controller's error if the rate cannot be set.
    pub fn program_bus_clock<S>(
        system_controller: &mut S,
        clock: ClockId,
        bus_rate: HertzU32,
    ) -> Result<HertzU32, <S as ErrorType>::Error>
    where
        S: SystemControl<ClockId = ClockId>,
    {
        let source = HertzU32::from_raw(bus_rate.raw().saturating_mul(SOURCE_CLOCK_MULTIPLIER));
        system_controller.set_frequency(&clock, u64::from(source.raw()))?;
        Ok(source)
    }

    /// Move the controller from one pin configuration to another
    ///
    /// The previous table, if any, is parked in its safe configuration before
    /// the next one is applied.
    ///
    /// # Errors
    ///
    /// Returns the first error reported by the system controller.
    pub fn switch_pinmux<S>(
        system_controller: &mut S,
        from: Option<PinmuxId>,
        to: Option<PinmuxId>,
    ) -> Result<(), <S as ErrorType>::Error>
    where
        S: PinmuxControl,
    {
        if let Some(previous) = from {
            system_controller.set_safe_pinmux(previous)?;
        }
        if let Some(next) = to {
            system_controller.apply_pinmux(next)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i2c::sim::MockSystemController;

    #[derive(Default)]
    struct RecordingDelay {
        total_ns: u64,
    }

    impl DelayNs for RecordingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.total_ns += u64::from(ns);
        }
    }

    #[test]
    fn test_reset_controller() {
        let mut mock = MockSystemController::default();
        let mut delay = RecordingDelay::default();

        let result = I2cSystemSetup::reset_controller(&mut mock, ResetId::RstI2c2, &mut delay);

        assert!(result.is_ok());
        assert_eq!(mock.reset_states.get(&ResetId::RstI2c2), Some(&false));
        assert_eq!(mock.count("reset_assert"), 1);
        assert_eq!(mock.count("reset_deassert"), 1);
        assert!(delay.total_ns >= 1_002_000);
    }

    #[test]
    fn test_reset_controller_stops_on_assert_failure() {
        let mut mock = MockSystemController {
            fail_reset: true,
            ..Default::default()
        };
        let mut delay = RecordingDelay::default();

        let result = I2cSystemSetup::reset_controller(&mut mock, ResetId::RstI2c1, &mut delay);

        assert_eq!(result, Err(()));
        assert_eq!(mock.count("reset_deassert"), 0);
    }

    #[test]
    fn test_program_bus_clock() {
        let mut mock = MockSystemController::default();

        let result =
            I2cSystemSetup::program_bus_clock(&mut mock, ClockId::ClkDvc, HertzU32::from_raw(400_000));

        assert_eq!(result, Ok(HertzU32::from_raw(3_200_000)));
        assert_eq!(mock.frequencies, vec![3_200_000]);
        assert_eq!(mock.get_frequency(&ClockId::ClkDvc), Ok(3_200_000));
    }

    #[test]
    fn test_switch_pinmux() {
        let mut mock = MockSystemController::default();

        I2cSystemSetup::switch_pinmux(&mut mock, None, Some(PinmuxId(1))).unwrap();
        I2cSystemSetup::switch_pinmux(&mut mock, Some(PinmuxId(1)), Some(PinmuxId(2))).unwrap();
        I2cSystemSetup::switch_pinmux(&mut mock, Some(PinmuxId(2)), None).unwrap();

        assert_eq!(
            mock.pinmux_log,
            vec![
                ("apply", PinmuxId(1)),
                ("safe", PinmuxId(1)),
                ("apply", PinmuxId(2)),
                ("safe", PinmuxId(2)),
            ]
        );
    }
}
