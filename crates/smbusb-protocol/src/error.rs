//! Failure taxonomy shared by the bus engine and its clients.

use thiserror::Error;

/// Reasons a device command fails.
///
/// Every variant is recoverable at the session level: the engine aborts the
/// in-progress bus transaction with a best-effort stop and is ready for the
/// next command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum BusError {
    #[error("Bus busy or bus error: start condition not asserted")]
    BusBusyOrError,

    #[error("Byte not acknowledged")]
    Nack,

    #[error("Bus did not reach the expected state within the tick budget")]
    Timeout,

    #[error("PEC mismatch: computed {expected:#04x}, received {received:#04x}")]
    PecMismatch { expected: u8, received: u8 },

    #[error("Unknown command code {0:#04x}")]
    UnknownCommand(u8),

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: &'static str },
}

pub type BusResult<T> = Result<T, BusError>;

impl BusError {
    pub fn pec_mismatch(expected: u8, received: u8) -> Self {
        BusError::PecMismatch { expected, received }
    }

    pub fn invalid_request(reason: &'static str) -> Self {
        BusError::InvalidRequest { reason }
    }

    pub fn is_pec_failure(&self) -> bool {
        matches!(self, BusError::PecMismatch { .. })
    }

    /// A retry of the same command might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BusError::BusBusyOrError | BusError::Timeout | BusError::PecMismatch { .. }
        )
    }
}
