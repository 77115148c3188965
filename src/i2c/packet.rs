// Licensed under the Apache-2.0 license

//! Packet header construction.
//!
//! Every message is preceded in the transmit FIFO by three words: the generic
//! packet header, the zero-based payload size, and the I2C-specific header.

use crate::i2c::common::{Message, MessageFlags};

const HEADER0_HEADER_SIZE_SHIFT: u32 = 28;
const HEADER0_PACKET_ID_SHIFT: u32 = 16;
const HEADER0_CONT_ID_SHIFT: u32 = 12;
const HEADER0_CONT_ID_MASK: u32 = 0xf;
const HEADER0_PROTOCOL_I2C: u32 = 1 << 4;

pub const I2C_HEADER_HIGHSPEED_MODE: u32 = 1 << 22;
pub const I2C_HEADER_CONT_ON_NAK: u32 = 1 << 21;
pub const I2C_HEADER_READ: u32 = 1 << 19;
pub const I2C_HEADER_10BIT_ADDR: u32 = 1 << 18;
pub const I2C_HEADER_IE_ENABLE: u32 = 1 << 17;
pub const I2C_HEADER_REPEAT_START: u32 = 1 << 16;
pub const I2C_HEADER_MASTER_ADDR_SHIFT: u32 = 12;
pub const I2C_HEADER_SLAVE_ADDR_SHIFT: u32 = 1;

/// The three header words for one message.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PacketHeader {
    pub generic: u32,
    pub payload_size: u32,
    pub io: u32,
}

impl PacketHeader {
    /// Build the header for `message`.
    ///
    /// `is_last` drops the repeat-start so the controller issues a stop after
    /// the payload. `high_speed_master_code` enables high-speed mode.
    #[must_use]
    pub fn build(
        message: &Message<'_>,
        is_last: bool,
        cont_id: u8,
        high_speed_master_code: Option<u8>,
    ) -> Self {
        let generic = (0 << HEADER0_HEADER_SIZE_SHIFT)
            | HEADER0_PROTOCOL_I2C
            | ((u32::from(cont_id) & HEADER0_CONT_ID_MASK) << HEADER0_CONT_ID_SHIFT)
            | (1 << HEADER0_PACKET_ID_SHIFT);

        let payload_size = u32::try_from(message.len().saturating_sub(1)).unwrap_or(u32::MAX);

        let mut io = I2C_HEADER_IE_ENABLE;
        if !is_last {
            io |= I2C_HEADER_REPEAT_START;
        }
        if message.flags.contains(MessageFlags::TEN_BIT) {
            io |= I2C_HEADER_10BIT_ADDR | (u32::from(message.address) & 0x3ff);
        } else {
            io |= (u32::from(message.address) & 0x7f) << I2C_HEADER_SLAVE_ADDR_SHIFT;
        }
        if message.flags.contains(MessageFlags::IGNORE_NACK) {
            io |= I2C_HEADER_CONT_ON_NAK;
        }
        if message.is_read() {
            io |= I2C_HEADER_READ;
        }
        if let Some(code) = high_speed_master_code {
            io |= I2C_HEADER_HIGHSPEED_MODE | ((u32::from(code) & 0x7) << I2C_HEADER_MASTER_ADDR_SHIFT);
        }

        Self {
            generic,
            payload_size,
            io,
        }
    }

    #[must_use]
    pub fn words(&self) -> [u32; 3] {
        [self.generic, self.payload_size, self.io]
    }
}
