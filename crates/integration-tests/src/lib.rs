//! End-to-end test support for the SMBus-over-USB bridge.
//!
//! The full stack runs in-process: the host [`SmbusClient`] talks through a
//! [`LoopbackTransport`] to a [`BusEngine`], whose I2C controller is the
//! simulated bus from `smbusb-engine` with register-file SMBus targets.
//!
//! [`SmbusClient`]: smbusb_client::SmbusClient
//! [`LoopbackTransport`]: smbusb_client::LoopbackTransport
//! [`BusEngine`]: smbusb_engine::BusEngine

#![deny(rust_2018_idioms)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::print_stdout)]

pub mod bridge_virtual;

pub use bridge_virtual::{BridgeScenario, SCENARIO_ADDR};
