// Licensed under the Apache-2.0 license

//! # Controller instance table
//!
//! The SoC carries three general-purpose I2C controllers and a fourth that
//! lives inside the DVC (voltage controller) block. The DVC instance is
//! master-only and needs register translation; [`ControllerInstance`]
//! records those differences so board code does not repeat them.
//!
//! ```rust,ignore
//! use tegra_ddk::i2c::hardware_instantiation::{ControllerInstance, NvicLine};
//!
//! static REGION: ControllerRegion<MmioBus, NvicLine, SpinCompletion> =
//!     ControllerInstance::Dvc.new_region(
//!         unsafe { ControllerInstance::Dvc.mmio() },
//!         NvicLine::new(ControllerInstance::Dvc.irq()),
//!         SpinCompletion::new(4_000),
//!         NoOpLogger,
//!     );
//! ```

use crate::common::Logger;
use crate::i2c::common::{ControllerConfig, I2cSpeed};
use crate::i2c::region::ControllerRegion;
use crate::i2c::registers::{MmioBus, RegisterBus};
use crate::i2c::traits::{Completion, IrqControl};
use crate::syscon::{ClockId, ResetId};
use core::ptr::NonNull;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ControllerInstance {
    I2c1,
    I2c2,
    I2c3,
    /// The controller inside the DVC block.
    Dvc,
}

impl ControllerInstance {
    pub const ALL: [ControllerInstance; 4] = [
        ControllerInstance::I2c1,
        ControllerInstance::I2c2,
        ControllerInstance::I2c3,
        ControllerInstance::Dvc,
    ];

    /// Physical base of the instance's register block.
    #[must_use]
    pub const fn base_address(self) -> usize {
        match self {
            ControllerInstance::I2c1 => 0x7000_c000,
            ControllerInstance::I2c2 => 0x7000_c400,
            ControllerInstance::I2c3 => 0x7000_c500,
            ControllerInstance::Dvc => 0x7000_d000,
        }
    }

    /// Shared peripheral interrupt number.
    #[must_use]
    pub const fn irq(self) -> u16 {
        match self {
            ControllerInstance::I2c1 => 70,
            ControllerInstance::I2c2 => 116,
            ControllerInstance::I2c3 => 124,
            ControllerInstance::Dvc => 79,
        }
    }

    /// Controller id carried in packet headers.
    #[must_use]
    pub const fn cont_id(self) -> u8 {
        match self {
            ControllerInstance::I2c1 => 0,
            ControllerInstance::I2c2 => 1,
            ControllerInstance::I2c3 => 2,
            ControllerInstance::Dvc => 3,
        }
    }

    /// Peripheral clock feeding the controller.
    #[must_use]
    pub const fn clock_id(self) -> ClockId {
        match self {
            ControllerInstance::I2c1 => ClockId::ClkI2c1,
            ControllerInstance::I2c2 => ClockId::ClkI2c2,
            ControllerInstance::I2c3 => ClockId::ClkI2c3,
            ControllerInstance::Dvc => ClockId::ClkDvc,
        }
    }

    #[must_use]
    pub const fn reset_id(self) -> ResetId {
        match self {
            ControllerInstance::I2c1 => ResetId::RstI2c1,
            ControllerInstance::I2c2 => ResetId::RstI2c2,
            ControllerInstance::I2c3 => ResetId::RstI2c3,
            ControllerInstance::Dvc => ResetId::RstDvc,
        }
    }

    #[must_use]
    pub const fn is_embedded(self) -> bool {
        matches!(self, ControllerInstance::Dvc)
    }

    #[must_use]
    pub const fn slave_capable(self) -> bool {
        !self.is_embedded()
    }

    #[must_use]
    pub fn from_cont_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|instance| instance.cont_id() == id)
    }

    /// Standard-mode configuration for this instance, clock gated when idle.
    #[must_use]
    pub const fn default_config(self) -> ControllerConfig {
        ControllerConfig {
            cont_id: self.cont_id(),
            slave_capable: self.slave_capable(),
            slave_address: None,
            high_speed_master_code: None,
            clock_always_on: false,
            default_bus_rate: I2cSpeed::Standard.rate(),
        }
    }

    /// Register window for this instance.
    ///
    /// # Safety
    ///
    /// The block must be mapped at [`ControllerInstance::base_address`] and
    /// no other `MmioBus` for the same instance may be in use.
    #[must_use]
    pub const unsafe fn mmio(self) -> MmioBus {
        // SAFETY: every base address in the table is non-zero and word aligned.
        let base = unsafe { NonNull::new_unchecked(self.base_address() as *mut u32) };
        // SAFETY: forwarded from the caller.
        unsafe { MmioBus::new(base) }
    }

    /// Controller region for this instance with the embedded flag filled in.
    pub const fn new_region<B, Q, C, L>(
        self,
        bus: B,
        irq: Q,
        completion: C,
        logger: L,
    ) -> ControllerRegion<B, Q, C, L>
    where
        B: RegisterBus,
        Q: IrqControl,
        C: Completion,
        L: Logger,
    {
        ControllerRegion::new(bus, self.is_embedded(), irq, completion, logger)
    }
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use nvic::NvicLine;

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod nvic {
    use crate::i2c::traits::IrqControl;
    use cortex_m::interrupt::InterruptNumber;
    use cortex_m::peripheral::NVIC;

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    struct Line(u16);

    // SAFETY: the number is supplied by the instance table and names a
    // single interrupt source.
    unsafe impl InterruptNumber for Line {
        fn number(self) -> u16 {
            self.0
        }
    }

    /// Interrupt line on the core's NVIC.
    pub struct NvicLine {
        line: Line,
    }

    impl NvicLine {
        #[must_use]
        pub const fn new(irq: u16) -> Self {
            Self { line: Line(irq) }
        }
    }

    impl IrqControl for NvicLine {
        fn enable_irq(&self) {
            // SAFETY: the region's handler is installed before the
            // controller is attached.
            unsafe { NVIC::unmask(self.line) };
        }

        fn disable_irq(&self) {
            NVIC::mask(self.line);
        }
    }
}
