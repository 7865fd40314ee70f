//! # smbusb-client
//!
//! Host-side client for the SMBus-over-USB bus engine.
//!
//! Every SMBus verb becomes one or more vendor control transfers of at most
//! 64 bytes. [`SmbusClient`] hides that ceiling: block reads and writes of up
//! to 255 bytes, and raw bus transactions of any length, are chunked and
//! reassembled transparently.
//!
//! Transfers go through the [`ControlTransport`] trait:
//! - `UsbTransport` (feature `usb`): a real device over `nusb`
//! - `LoopbackTransport` (feature `loopback`): an in-process bus engine
//! - [`transport::mock::MockTransport`]: scripted replies for tests
//!
//! ## Example
//!
//! ```rust
//! use smbusb_client::{ClientConfig, SmbusClient};
//! use smbusb_client::transport::mock::MockTransport;
//!
//! let mock = MockTransport::new();
//! mock.queue_reply(&[0x55, 0x53, 0x4D]);
//! mock.queue_reply(&[1, 0, 0]);
//! mock.queue_reply(&[0x34, 0x12]);
//!
//! let mut client = SmbusClient::open(mock, ClientConfig::default())?;
//! assert_eq!(client.read_word(0x16, 0x09)?, 0x1234);
//! # Ok::<(), smbusb_client::ClientError>(())
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod chunk;
pub mod client;
pub mod config;
pub mod error;
#[cfg(feature = "loopback")]
#[cfg_attr(docsrs, doc(cfg(feature = "loopback")))]
pub mod loopback;
pub mod transport;
#[cfg(feature = "usb")]
#[cfg_attr(docsrs, doc(cfg(feature = "usb")))]
pub mod usb;

pub use chunk::{BlockAssembler, Chunk, block_frame, plan, plan_raw_read};
pub use client::SmbusClient;
pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_PRODUCT_ID, DEFAULT_VENDOR_ID};
pub use error::{ClientError, ClientResult, TransportError};
#[cfg(feature = "loopback")]
pub use loopback::LoopbackTransport;
pub use transport::{ControlTransport, VendorRequest};
#[cfg(feature = "usb")]
pub use usb::UsbTransport;

pub use smbusb_protocol::{FirmwareVersion, PecPair, ReadFlags, WriteDepth, WriteFlags};
