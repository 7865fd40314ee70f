//! Test logging.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "smbusb_engine=debug,smbusb_client=debug";

/// Install a `tracing` subscriber writing through the test harness.
///
/// Safe to call from every test; only the first call installs anything.
/// `RUST_LOG` overrides [`DEFAULT_FILTER`].
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        // Another harness may already have installed a global subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_test_logging();
        init_test_logging();
        assert!(INIT.is_completed());
    }
}
