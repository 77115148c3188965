// Licensed under the Apache-2.0 license

//! Clock and reset identifiers used with the `OpenProt` `SystemControl`
//! traits.
//!
//! Values are the controller's bit positions in the clock-and-reset block.

/// Peripheral clocks of the I2C controllers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ClockId {
    ClkI2c1 = 12,
    ClkDvc = 47,
    ClkI2c2 = 54,
    ClkI2c3 = 67,
}

/// Reset lines of the I2C controllers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResetId {
    RstI2c1 = 12,
    RstDvc = 47,
    RstI2c2 = 54,
    RstI2c3 = 67,
}

/// Source clock settings for one peripheral clock.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ClockConfig {
    pub rate_hz: u64,
    pub enabled: bool,
}
