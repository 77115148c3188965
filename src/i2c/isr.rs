// Licensed under the Apache-2.0 license

//! Interrupt half of the transfer state machine.

use crate::common::Logger;
use crate::i2c::error::ErrorFlags;
use crate::i2c::region::{ControllerRegion, Transfer};
use crate::i2c::registers::{
    DvcReg, IntStatus, Reg, RegisterBus, DVC_CTRL_REG3_I2C_DONE_INTR_EN, DVC_STATUS_I2C_DONE_INTR,
    STATUS_BUSY,
};
use crate::i2c::traits::{Completion, IrqControl};

const FAULTS: [(IntStatus, ErrorFlags); 4] = [
    (IntStatus::NO_ACK, ErrorFlags::NO_ACK),
    (IntStatus::ARBITRATION_LOST, ErrorFlags::ARBITRATION_LOST),
    (IntStatus::TX_FIFO_OVERFLOW, ErrorFlags::TX_FIFO_OVERFLOW),
    (IntStatus::RX_FIFO_UNDERFLOW, ErrorFlags::RX_FIFO_UNDERFLOW),
];

impl<B, Q, C, L> ControllerRegion<B, Q, C, L>
where
    B: RegisterBus,
    Q: IrqControl,
    C: Completion,
    L: Logger,
{
    /// Service one controller interrupt.
    ///
    /// Call from the controller's interrupt vector. Moves FIFO data for the
    /// message in flight, records faults, acknowledges the status bits and
    /// wakes the waiting caller once the packet is done or has failed.
    pub fn handle_interrupt(&self) {
        let status = self.regs.int_status();
        let wake = critical_section::with(|cs| {
            let mut xfer = self.xfer.borrow_ref_mut(cs);
            self.service(&mut xfer, status)
        });
        if wake {
            self.completion.complete();
        }
    }

    fn service(&self, xfer: &mut Transfer, status: IntStatus) -> bool {
        if status.is_empty() {
            self.logger.warn(format_args!(
                "unknown interrupt, addr {:#06x}",
                xfer.address
            ));
            xfer.errors |= ErrorFlags::UNKNOWN_INTERRUPT;
            self.disable_line();
            return self.abort(status);
        }

        let faults = status & IntStatus::ERRORS;
        if !faults.is_empty() {
            let packet_status = self.regs.read(Reg::PacketTransferStatus);
            for (bit, flag) in FAULTS {
                if faults.contains(bit) {
                    xfer.errors |= flag;
                }
            }
            self.logger.warn(format_args!(
                "transfer fault {:?}, addr {:#06x}, packet status {:#010x}",
                faults, xfer.address, packet_status
            ));
            return self.abort(status);
        }

        let busy = self.regs.read(Reg::Status) & STATUS_BUSY != 0;
        if busy
            && status == IntStatus::TX_FIFO_DATA_REQ
            && xfer.read
            && xfer.remaining() > 0
        {
            self.logger.warn(format_args!(
                "unexpected status {:#010x}, addr {:#06x}",
                status.bits(),
                xfer.address
            ));
            xfer.errors |= ErrorFlags::UNEXPECTED_STATUS;
            self.disable_line();
            return self.abort(status);
        }

        if xfer.read && status.contains(IntStatus::RX_FIFO_DATA_REQ) {
            if xfer.remaining() == 0 {
                self.logger.warn(format_args!(
                    "receive request with nothing left to read, addr {:#06x}",
                    xfer.address
                ));
                xfer.errors |= ErrorFlags::UNEXPECTED_STATUS;
                return self.abort(status);
            }
            xfer.drain(&self.regs);
        }

        if !xfer.read && status.contains(IntStatus::TX_FIFO_DATA_REQ) {
            if xfer.remaining() > 0 {
                xfer.fill(&self.regs);
            } else {
                self.regs.mask_irq(IntStatus::TX_FIFO_DATA_REQ);
            }
        }

        self.acknowledge(status);
        status.contains(IntStatus::PACKET_XFER_COMPLETE) && xfer.remaining() == 0
    }

    /// Error path: silence every transfer source, acknowledge and wake.
    fn abort(&self, status: IntStatus) -> bool {
        self.regs.mask_irq(IntStatus::TRANSFER);
        if self.regs.is_embedded() {
            self.regs.dvc_mask_irq(DVC_CTRL_REG3_I2C_DONE_INTR_EN);
        }
        self.acknowledge(status);
        true
    }

    fn acknowledge(&self, status: IntStatus) {
        self.regs.write(Reg::IntStatus, status.bits());
        if self.regs.is_embedded() {
            self.regs.dvc_write(DvcReg::Status, DVC_STATUS_I2C_DONE_INTR);
        }
    }
}
