//! Shared test utilities for the SMBus bridge crates.
//!
//! - [`mod@must`]: `must_err` for expected failures, with `#[track_caller]`
//! - [`logging`]: one-shot `tracing` subscriber for tests
//!
//! ```toml
//! [dev-dependencies]
//! smbusb-test-helpers = { workspace = true }
//! ```

#![allow(clippy::panic, reason = "test helpers panic with context by contract")]

pub mod logging;
pub mod must;

pub use logging::init_test_logging;
pub use must::*;
