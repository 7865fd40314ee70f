//! Client error types.

use smbusb_protocol::Command;
use thiserror::Error;

/// Failure of one control transfer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The device stalled the request: it reported the command as failed.
    #[error("Request stalled by device")]
    Stall,

    #[error("Transfer timed out")]
    Timeout,

    #[error("Device disconnected")]
    Disconnected,

    #[error("No matching device found")]
    NotFound,

    #[error("Access denied: {0}")]
    Access(String),

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Device unplugged or unreachable; no retry can succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::Disconnected | TransportError::NotFound | TransportError::Access(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    /// A command failed on the device or in transit. The two are
    /// indistinguishable to the host.
    #[error("{command} failed: {source}")]
    Transport {
        command: Command,
        #[source]
        source: TransportError,
    },

    /// The identification command did not return the protocol magic; the
    /// device needs its firmware loaded.
    #[error("Device is not running the bus engine firmware (identification {magic:02x?})")]
    NotProgrammed { magic: Vec<u8> },

    #[error("{command} returned {actual} bytes, expected {expected}")]
    InvalidResponse {
        command: Command,
        expected: usize,
        actual: usize,
    },

    #[error("Block of {len} bytes exceeds the 255-byte SMBus limit")]
    BlockTooLarge { len: usize },

    #[error("Buffer of {available} bytes cannot hold {needed} bytes")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Invalid client configuration: {0}")]
    InvalidConfiguration(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    pub fn transport(command: Command, source: TransportError) -> Self {
        ClientError::Transport { command, source }
    }

    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        ClientError::InvalidConfiguration(msg.into())
    }

    /// True when the device stalled the command (bus failure, NACK, PEC mismatch).
    pub fn is_device_failure(&self) -> bool {
        matches!(
            self,
            ClientError::Transport {
                source: TransportError::Stall,
                ..
            }
        )
    }

    /// A retry of the same operation might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport { source, .. } => !source.is_fatal(),
            ClientError::InvalidResponse { .. } => true,
            _ => false,
        }
    }
}
