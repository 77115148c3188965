// Licensed under the Apache-2.0 license

//! Common types for the packet-mode I2C driver modules.
//!
//! This module provides the controller and bus configuration builders, the
//! logical message type submitted by clients, and the protocol limits shared
//! by the packet builder and the transfer engine.

use crate::i2c::hardware_instantiation::ControllerInstance;
use bitflags::bitflags;
use fugit::{HertzU32, MillisDurationU32};

/// Largest payload a single packet can carry (12-bit zero-based size field).
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Deadline for one message when the bus does not override it.
pub const DEFAULT_TRANSFER_TIMEOUT: MillisDurationU32 = MillisDurationU32::millis(1000);

/// Batch retries performed by [`crate::i2c::i2c_controller::I2cBus`] when a bus
/// does not override it.
pub const DEFAULT_RETRIES: u8 = 3;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum I2cSpeed {
    Standard = 100_000,
    Fast = 400_000,
    FastPlus = 1_000_000,
    HighSpeed = 3_400_000,
}

impl I2cSpeed {
    #[must_use]
    pub const fn rate(self) -> HertzU32 {
        HertzU32::from_raw(self as u32)
    }
}

/// Opaque handle to a pin-configuration table owned by the platform.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PinmuxId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConfigurationError {
    /// High-speed master codes are three bits wide.
    InvalidMasterCode(u8),
    /// Bus clock rates must be non-zero.
    InvalidBusRate,
    /// Slave addresses are at most ten bits wide.
    InvalidSlaveAddress(u16),
    /// A slave address was given for a master-only controller.
    SlaveNotSupported,
    /// No controller instance carries this id.
    UnknownController(u8),
}

/// Per-controller settings shared by every bus multiplexed onto it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Controller id placed in every generic packet header.
    pub cont_id: u8,
    pub slave_capable: bool,
    pub slave_address: Option<u16>,
    /// Enables high-speed mode with the given 3-bit master code.
    pub high_speed_master_code: Option<u8>,
    /// Keep the controller clock running between transfers.
    pub clock_always_on: bool,
    /// Rate programmed at attach time, before any bus is selected.
    pub default_bus_rate: HertzU32,
}

pub struct ControllerConfigBuilder {
    cont_id: u8,
    slave_capable: bool,
    slave_address: Option<u16>,
    high_speed_master_code: Option<u8>,
    clock_always_on: bool,
    default_bus_rate: HertzU32,
}

impl Default for ControllerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cont_id: 0,
            slave_capable: false,
            slave_address: None,
            high_speed_master_code: None,
            clock_always_on: false,
            default_bus_rate: I2cSpeed::Standard.rate(),
        }
    }
    #[must_use]
    pub fn cont_id(mut self, id: u8) -> Self {
        self.cont_id = id;
        self
    }
    #[must_use]
    pub fn slave_capable(mut self, capable: bool) -> Self {
        self.slave_capable = capable;
        self
    }
    #[must_use]
    pub fn slave_address(mut self, address: u16) -> Self {
        self.slave_address = Some(address);
        self
    }
    #[must_use]
    pub fn high_speed(mut self, master_code: u8) -> Self {
        self.high_speed_master_code = Some(master_code);
        self
    }
    #[must_use]
    pub fn clock_always_on(mut self, enabled: bool) -> Self {
        self.clock_always_on = enabled;
        self
    }
    #[must_use]
    pub fn default_bus_rate(mut self, rate: HertzU32) -> Self {
        self.default_bus_rate = rate;
        self
    }

    /// Validate and produce the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] for an unknown controller id, a
    /// master code wider than three bits, a zero bus rate, a slave address
    /// wider than ten bits, or a slave address on a controller that is not
    /// slave capable.
    pub fn build(self) -> Result<ControllerConfig, ConfigurationError> {
        if ControllerInstance::from_cont_id(self.cont_id).is_none() {
            return Err(ConfigurationError::UnknownController(self.cont_id));
        }
        if let Some(code) = self.high_speed_master_code {
            if code > 0x7 {
                return Err(ConfigurationError::InvalidMasterCode(code));
            }
        }
        if self.default_bus_rate.raw() == 0 {
            return Err(ConfigurationError::InvalidBusRate);
        }
        if let Some(address) = self.slave_address {
            if !self.slave_capable {
                return Err(ConfigurationError::SlaveNotSupported);
            }
            if address > 0x3ff {
                return Err(ConfigurationError::InvalidSlaveAddress(address));
            }
        }
        Ok(ControllerConfig {
            cont_id: self.cont_id,
            slave_capable: self.slave_capable,
            slave_address: self.slave_address,
            high_speed_master_code: self.high_speed_master_code,
            clock_always_on: self.clock_always_on,
            default_bus_rate: self.default_bus_rate,
        })
    }
}

/// One logical bus on a shared controller.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BusConfig {
    pub rate: HertzU32,
    pub pinmux: Option<PinmuxId>,
    /// Line identifiers handed to the bus-recovery strategy.
    pub scl_gpio: u32,
    pub sda_gpio: u32,
    pub retries: u8,
    /// Per-message deadline; `None` uses [`DEFAULT_TRANSFER_TIMEOUT`].
    pub timeout: Option<MillisDurationU32>,
}

impl BusConfig {
    #[must_use]
    pub fn timeout(&self) -> MillisDurationU32 {
        self.timeout.unwrap_or(DEFAULT_TRANSFER_TIMEOUT)
    }
}

pub struct BusConfigBuilder {
    rate: HertzU32,
    pinmux: Option<PinmuxId>,
    scl_gpio: u32,
    sda_gpio: u32,
    retries: u8,
    timeout: Option<MillisDurationU32>,
}

impl Default for BusConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BusConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rate: I2cSpeed::Standard.rate(),
            pinmux: None,
            scl_gpio: 0,
            sda_gpio: 0,
            retries: DEFAULT_RETRIES,
            timeout: None,
        }
    }
    #[must_use]
    pub fn speed(mut self, speed: I2cSpeed) -> Self {
        self.rate = speed.rate();
        self
    }
    #[must_use]
    pub fn rate(mut self, rate: HertzU32) -> Self {
        self.rate = rate;
        self
    }
    #[must_use]
    pub fn pinmux(mut self, pinmux: PinmuxId) -> Self {
        self.pinmux = Some(pinmux);
        self
    }
    #[must_use]
    pub fn recovery_lines(mut self, scl_gpio: u32, sda_gpio: u32) -> Self {
        self.scl_gpio = scl_gpio;
        self.sda_gpio = sda_gpio;
        self
    }
    #[must_use]
    pub fn retries(mut self, retries: u8) -> Self {
        self.retries = retries;
        self
    }
    #[must_use]
    pub fn timeout(mut self, timeout: MillisDurationU32) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidBusRate`] for a zero rate.
    pub fn build(self) -> Result<BusConfig, ConfigurationError> {
        if self.rate.raw() == 0 {
            return Err(ConfigurationError::InvalidBusRate);
        }
        Ok(BusConfig {
            rate: self.rate,
            pinmux: self.pinmux,
            scl_gpio: self.scl_gpio,
            sda_gpio: self.sda_gpio,
            retries: self.retries,
            timeout: self.timeout,
        })
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct MessageFlags: u16 {
        /// The address is a 10-bit address.
        const TEN_BIT = 1 << 0;
        /// A missing acknowledge does not fail the message.
        const IGNORE_NACK = 1 << 1;
    }
}

#[derive(Debug)]
pub enum Payload<'a> {
    Read(&'a mut [u8]),
    Write(&'a [u8]),
}

/// One logical read or write submitted to the controller.
#[derive(Debug)]
pub struct Message<'a> {
    pub address: u16,
    pub flags: MessageFlags,
    pub payload: Payload<'a>,
}

impl<'a> Message<'a> {
    #[must_use]
    pub fn write(address: u16, bytes: &'a [u8]) -> Self {
        Self {
            address,
            flags: MessageFlags::empty(),
            payload: Payload::Write(bytes),
        }
    }

    #[must_use]
    pub fn read(address: u16, buffer: &'a mut [u8]) -> Self {
        Self {
            address,
            flags: MessageFlags::empty(),
            payload: Payload::Read(buffer),
        }
    }

    #[must_use]
    pub fn ten_bit(mut self) -> Self {
        self.flags |= MessageFlags::TEN_BIT;
        self
    }

    #[must_use]
    pub fn ignore_nack(mut self) -> Self {
        self.flags |= MessageFlags::IGNORE_NACK;
        self
    }

    #[must_use]
    pub fn is_read(&self) -> bool {
        matches!(self.payload, Payload::Read(_))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match &self.payload {
            Payload::Read(buf) => buf.len(),
            Payload::Write(bytes) => bytes.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First payload byte, used in diagnostics.
    #[must_use]
    pub fn first_byte(&self) -> Option<u8> {
        match &self.payload {
            Payload::Read(buf) => buf.first().copied(),
            Payload::Write(bytes) => bytes.first().copied(),
        }
    }
}
