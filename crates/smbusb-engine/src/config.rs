//! Bus engine configuration.

use serde::{Deserialize, Serialize};
use smbusb_protocol::FirmwareVersion;

use crate::error::{ConfigError, ConfigResult};

/// Tunables of the bus engine.
///
/// All timeouts are in device timer ticks, not wall time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Start attempts before reporting the bus busy.
    pub start_retries: u8,

    /// Delay between start attempts in milliseconds.
    pub start_retry_delay_ms: u32,

    /// Upper bound on every bus wait (byte completion, stop completion).
    pub bus_timeout_ticks: u32,

    /// Maximum gap between successive block continuation calls before the
    /// buffered sequence is discarded.
    pub block_sequence_timeout_ticks: u32,

    /// PEC state after initialisation and after reset.
    pub pec_enabled: bool,

    /// Reported by the version query.
    pub firmware_version: FirmwareVersion,
}

impl EngineConfig {
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] naming the first invalid field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.start_retries == 0 {
            return Err(ConfigError::out_of_range(
                "start_retries",
                "must be at least 1",
            ));
        }
        if self.start_retry_delay_ms > 1000 {
            return Err(ConfigError::out_of_range(
                "start_retry_delay_ms",
                "must not exceed 1000",
            ));
        }
        if self.bus_timeout_ticks == 0 {
            return Err(ConfigError::out_of_range(
                "bus_timeout_ticks",
                "must be at least 1",
            ));
        }
        if self.block_sequence_timeout_ticks == 0 {
            return Err(ConfigError::out_of_range(
                "block_sequence_timeout_ticks",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            start_retries: 5,
            start_retry_delay_ms: 10,
            bus_timeout_ticks: 10,
            block_sequence_timeout_ticks: 5,
            pec_enabled: true,
            firmware_version: FirmwareVersion::new(1, 0, 0),
        }
    }
}

#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    #[must_use]
    pub fn start_retries(mut self, retries: u8) -> Self {
        self.config.start_retries = retries;
        self
    }

    #[must_use]
    pub fn start_retry_delay_ms(mut self, ms: u32) -> Self {
        self.config.start_retry_delay_ms = ms;
        self
    }

    #[must_use]
    pub fn bus_timeout_ticks(mut self, ticks: u32) -> Self {
        self.config.bus_timeout_ticks = ticks;
        self
    }

    #[must_use]
    pub fn block_sequence_timeout_ticks(mut self, ticks: u32) -> Self {
        self.config.block_sequence_timeout_ticks = ticks;
        self
    }

    #[must_use]
    pub fn pec_enabled(mut self, enabled: bool) -> Self {
        self.config.pec_enabled = enabled;
        self
    }

    #[must_use]
    pub fn firmware_version(mut self, version: FirmwareVersion) -> Self {
        self.config.firmware_version = version;
        self
    }

    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> ConfigResult<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.start_retries, 5);
        assert_eq!(config.start_retry_delay_ms, 10);
        assert_eq!(config.bus_timeout_ticks, 10);
        assert_eq!(config.block_sequence_timeout_ticks, 5);
        assert!(config.pec_enabled);
        assert_eq!(config.firmware_version.to_string(), "1.0.0");
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_builder() {
        let result = EngineConfig::builder()
            .start_retries(2)
            .bus_timeout_ticks(3)
            .pec_enabled(false)
            .build();
        assert!(matches!(
            result,
            Ok(EngineConfig {
                start_retries: 2,
                bus_timeout_ticks: 3,
                pec_enabled: false,
                ..
            })
        ));
    }

    #[test]
    fn test_validation_rejects_zero_budgets() {
        assert!(EngineConfig::builder().start_retries(0).build().is_err());
        assert!(EngineConfig::builder().bus_timeout_ticks(0).build().is_err());
        assert!(
            EngineConfig::builder()
                .block_sequence_timeout_ticks(0)
                .build()
                .is_err()
        );
        assert!(
            EngineConfig::builder()
                .start_retry_delay_ms(5000)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() -> Result<(), serde_json::Error> {
        let config: EngineConfig =
            serde_json::from_str(r#"{"pec_enabled": false, "bus_timeout_ticks": 20}"#)?;
        assert!(!config.pec_enabled);
        assert_eq!(config.bus_timeout_ticks, 20);
        assert_eq!(config.start_retries, 5);
        Ok(())
    }
}
