// Licensed under the Apache-2.0 license

//! Packet-mode I2C master driver.
//!
//! This module provides the controller driver for Tegra-class `SoCs`, designed
//! for bare-metal and `no_std` environments. A [`ControllerRegion`] is shared
//! between the interrupt vector and the [`I2cController`] that runs batches on
//! it; each logical bus is described by a [`BusConfig`] and exposed to client
//! drivers through [`I2cBus`].

pub mod common;
pub mod completion;
pub mod error;
pub mod fifo;
pub mod hardware_instantiation;
pub mod i2c_controller;
mod isr;
mod lifecycle;
pub mod packet;
pub mod region;
pub mod registers;
pub mod system_setup;
pub mod traits;

#[cfg(test)]
pub(crate) mod sim;

pub use common::{
    BusConfig, BusConfigBuilder, ControllerConfig, ControllerConfigBuilder, I2cSpeed, Message,
    MessageFlags, PinmuxId,
};
pub use completion::SpinCompletion;
#[cfg(any(test, feature = "std"))]
pub use completion::{CondvarCompletion, StdDelay};
pub use error::{BatchError, InitError, TransferError};
pub use hardware_instantiation::ControllerInstance;
pub use i2c_controller::{Functionality, I2cBus, I2cController};
pub use region::ControllerRegion;
pub use registers::{MmioBus, RegisterBus};
pub use system_setup::I2cSystemSetup;
pub use traits::{
    BusRecovery, Completion, I2cMaster, IrqControl, NoRecovery, PinmuxControl, SystemControl,
    WaitOutcome,
};
