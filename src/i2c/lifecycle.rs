// Licensed under the Apache-2.0 license

//! Register-level bring-up of the controller.
//!
//! The sequencing with reset and clocks lives in
//! [`crate::i2c::i2c_controller::I2cController::init`]; the steps here only
//! touch the register window.

use crate::common::Logger;
use crate::i2c::error::InitError;
use crate::i2c::region::ControllerRegion;
use crate::i2c::registers::{
    DvcReg, Reg, RegisterBus, CNFG_DEBOUNCE_CNT_SHIFT, CNFG_NEW_MASTER_FSM, CNFG_PACKET_MODE_EN,
    DVC_CTRL_REG1_INTR_EN, DVC_CTRL_REG3_SW_PROG, FIFO_CONTROL_RX_FLUSH,
    FIFO_CONTROL_RX_TRIG_SHIFT, FIFO_CONTROL_TX_FLUSH, FIFO_CONTROL_TX_TRIG_SHIFT, SL_CNFG_NACK,
    SL_CNFG_NEWSL,
};
use crate::i2c::traits::{Completion, IrqControl};
use core::convert::Infallible;
use embedded_hal::delay::DelayNs;

const DEBOUNCE_COUNT: u32 = 2;
const TX_TRIGGER: u32 = 7;
const RX_TRIGGER: u32 = 0;

/// Flush polls before giving up, one millisecond apart.
pub const FLUSH_POLLS: u32 = 1000;

/// Configuration register value written by every init.
pub const CNFG_INIT: u32 =
    CNFG_NEW_MASTER_FSM | CNFG_PACKET_MODE_EN | (DEBOUNCE_COUNT << CNFG_DEBOUNCE_CNT_SHIFT);

/// FIFO control value written by every init.
pub const FIFO_CONTROL_INIT: u32 =
    (TX_TRIGGER << FIFO_CONTROL_TX_TRIG_SHIFT) | (RX_TRIGGER << FIFO_CONTROL_RX_TRIG_SHIFT);

impl<B, Q, C, L> ControllerRegion<B, Q, C, L>
where
    B: RegisterBus,
    Q: IrqControl,
    C: Completion,
    L: Logger,
{
    /// Put the DVC block into software-programmed I2C mode.
    pub(crate) fn dvc_init(&self) {
        let ctrl3 = self.regs.dvc_read(DvcReg::CtrlReg3) | DVC_CTRL_REG3_SW_PROG;
        self.regs.dvc_write(DvcReg::CtrlReg3, ctrl3);
        let ctrl1 = self.regs.dvc_read(DvcReg::CtrlReg1) | DVC_CTRL_REG1_INTR_EN;
        self.regs.dvc_write(DvcReg::CtrlReg1, ctrl1);
    }

    pub(crate) fn configure_packet_mode(&self) {
        self.regs.write(Reg::Cnfg, CNFG_INIT);
        self.regs.write(Reg::IntMask, 0);
    }

    pub(crate) fn configure_fifo_triggers(&self) {
        self.regs.write(Reg::FifoControl, FIFO_CONTROL_INIT);
    }

    /// Answer slave accesses with NACK, at `address` when one is set.
    pub(crate) fn slave_init(&self, address: Option<u16>) {
        self.regs.write(Reg::SlCnfg, SL_CNFG_NEWSL | SL_CNFG_NACK);
        if let Some(address) = address {
            self.regs.write(Reg::SlAddr1, u32::from(address & 0xff));
            self.regs.write(Reg::SlAddr2, u32::from((address >> 8) & 0xff));
        }
    }

    fn poll_flush(&self) -> nb::Result<(), Infallible> {
        let pending = FIFO_CONTROL_TX_FLUSH | FIFO_CONTROL_RX_FLUSH;
        if self.regs.read(Reg::FifoControl) & pending == 0 {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    /// Flush both FIFOs and wait for the hardware to finish.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::FlushTimeout`] if the flush bits are still set
    /// after [`FLUSH_POLLS`] milliseconds.
    pub fn flush_fifos<D: DelayNs>(&self, delay: &mut D) -> Result<(), InitError> {
        let control = self.regs.read(Reg::FifoControl) | FIFO_CONTROL_TX_FLUSH | FIFO_CONTROL_RX_FLUSH;
        self.regs.write(Reg::FifoControl, control);
        for _ in 0..FLUSH_POLLS {
            match self.poll_flush() {
                Ok(()) => return Ok(()),
                Err(nb::Error::WouldBlock) => delay.delay_ms(1),
                Err(nb::Error::Other(never)) => match never {},
            }
        }
        self.logger.warn(format_args!("timeout waiting for fifo flush"));
        Err(InitError::FlushTimeout)
    }
}
