//! Engine configuration errors.
//!
//! Bus-level failures use [`smbusb_protocol::BusError`], shared with the host.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid engine configuration: {field} {reason}")]
    OutOfRange {
        field: &'static str,
        reason: &'static str,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    pub fn out_of_range(field: &'static str, reason: &'static str) -> Self {
        ConfigError::OutOfRange { field, reason }
    }
}
