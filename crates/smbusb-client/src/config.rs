//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// VID of the unprogrammed EZ-USB FX2 the bridge enumerates as.
pub const DEFAULT_VENDOR_ID: u16 = 0x04b4;
/// PID of the unprogrammed EZ-USB FX2 the bridge enumerates as.
pub const DEFAULT_PRODUCT_ID: u16 = 0x8613;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Per-request timeout for ordinary commands.
    pub timeout_ms: u32,
    /// Per-request timeout for the address probe, which may wait on a stuck bus.
    pub probe_timeout_ms: u32,
    /// Check the identification magic and read the version on open.
    pub verify_identity: bool,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl ClientConfig {
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfiguration`] for zero or excessive timeouts.
    pub fn validate(&self) -> ClientResult<()> {
        if !(1..=60_000).contains(&self.timeout_ms) {
            return Err(ClientError::invalid_configuration(
                "timeout_ms must be between 1 and 60000",
            ));
        }
        if !(1..=60_000).contains(&self.probe_timeout_ms) {
            return Err(ClientError::invalid_configuration(
                "probe_timeout_ms must be between 1 and 60000",
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.timeout_ms))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.probe_timeout_ms))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 100,
            probe_timeout_ms: 200,
            verify_identity: true,
            vendor_id: DEFAULT_VENDOR_ID,
            product_id: DEFAULT_PRODUCT_ID,
        }
    }
}

#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    #[must_use]
    pub fn timeout_ms(mut self, ms: u32) -> Self {
        self.config.timeout_ms = ms;
        self
    }

    #[must_use]
    pub fn probe_timeout_ms(mut self, ms: u32) -> Self {
        self.config.probe_timeout_ms = ms;
        self
    }

    #[must_use]
    pub fn verify_identity(mut self, verify: bool) -> Self {
        self.config.verify_identity = verify;
        self
    }

    #[must_use]
    pub fn vendor_id(mut self, vid: u16) -> Self {
        self.config.vendor_id = vid;
        self
    }

    #[must_use]
    pub fn product_id(mut self, pid: u16) -> Self {
        self.config.product_id = pid;
        self
    }

    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> ClientResult<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
