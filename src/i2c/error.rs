// Licensed under the Apache-2.0 license

//! Error taxonomy for transfers and controller initialisation.

use crate::i2c::common::{ConfigurationError, MessageFlags};
use bitflags::bitflags;
use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};

/// Why a message, and with it the rest of its batch, failed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransferError {
    /// The target did not acknowledge.
    NoAcknowledge,
    /// Another master won the bus. `recovered` is set when the recovery
    /// strategy freed the bus and the batch may be resubmitted.
    ArbitrationLost { recovered: bool },
    FifoOverflow,
    FifoUnderflow,
    /// The controller reported an internally inconsistent status.
    UnexpectedStatus,
    /// An interrupt fired with no status bit set.
    UnknownInterrupt,
    Timeout,
    /// Zero-length or oversized message.
    InvalidArgument,
    /// The controller is suspended.
    Suspended,
    /// Re-initialisation failed repeatedly; the controller needs an explicit
    /// `init()` or `resume()`.
    ControllerFault,
}

impl TransferError {
    /// Whether resubmitting the whole batch may succeed.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            TransferError::ArbitrationLost { recovered: true } | TransferError::UnexpectedStatus
        )
    }
}

impl embedded_hal::i2c::Error for TransferError {
    fn kind(&self) -> ErrorKind {
        match *self {
            TransferError::NoAcknowledge => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown),
            TransferError::ArbitrationLost { .. } => ErrorKind::ArbitrationLoss,
            TransferError::FifoOverflow | TransferError::FifoUnderflow => ErrorKind::Overrun,
            _ => ErrorKind::Other,
        }
    }
}

/// A failed batch: the error plus the number of messages that completed
/// before it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BatchError {
    pub completed: usize,
    pub error: TransferError,
}

impl BatchError {
    #[must_use]
    pub const fn new(completed: usize, error: TransferError) -> Self {
        Self { completed, error }
    }
}

impl From<BatchError> for TransferError {
    fn from(err: BatchError) -> Self {
        err.error
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InitError {
    Reset,
    Clock,
    /// Both FIFOs did not drain in time. Every other init step completed.
    FlushTimeout,
    Configuration(ConfigurationError),
}

impl InitError {
    /// Failures that leave the controller unprogrammed.
    #[must_use]
    pub fn is_hard(self) -> bool {
        !matches!(self, InitError::FlushTimeout)
    }
}

impl From<ConfigurationError> for InitError {
    fn from(err: ConfigurationError) -> Self {
        InitError::Configuration(err)
    }
}

bitflags! {
    /// Conditions accumulated by the interrupt handler for one message.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct ErrorFlags: u8 {
        const NO_ACK = 1 << 0;
        const ARBITRATION_LOST = 1 << 1;
        const TX_FIFO_OVERFLOW = 1 << 2;
        const RX_FIFO_UNDERFLOW = 1 << 3;
        const UNKNOWN_INTERRUPT = 1 << 4;
        const UNEXPECTED_STATUS = 1 << 5;
    }
}

impl ErrorFlags {
    /// Map the accumulated flags of a finished message to its result.
    ///
    /// A lone arbitration loss is handled by the caller before this point,
    /// because it involves the recovery strategy.
    ///
    /// # Errors
    ///
    /// Returns the most specific [`TransferError`] for a non-empty set, except
    /// a lone NACK on a message that tolerates it.
    pub fn classify(self, flags: MessageFlags) -> Result<(), TransferError> {
        if self.is_empty() {
            return Ok(());
        }
        if self == ErrorFlags::NO_ACK {
            if flags.contains(MessageFlags::IGNORE_NACK) {
                return Ok(());
            }
            return Err(TransferError::NoAcknowledge);
        }
        if self.contains(ErrorFlags::UNEXPECTED_STATUS) {
            return Err(TransferError::UnexpectedStatus);
        }
        let error = if self.contains(ErrorFlags::ARBITRATION_LOST) {
            TransferError::ArbitrationLost { recovered: false }
        } else if self.contains(ErrorFlags::TX_FIFO_OVERFLOW) {
            TransferError::FifoOverflow
        } else if self.contains(ErrorFlags::RX_FIFO_UNDERFLOW) {
            TransferError::FifoUnderflow
        } else if self.contains(ErrorFlags::UNKNOWN_INTERRUPT) {
            TransferError::UnknownInterrupt
        } else {
            TransferError::NoAcknowledge
        };
        Err(error)
    }
}
