//! # smbusb-engine
//!
//! Device-side bus engine of the SMBus-over-USB bridge.
//!
//! - [`hal`]: the register-level [`I2cController`] boundary, plus the tick
//!   counter and command-pending signal shared with interrupt context
//! - [`bus`]: start/restart/stop and byte transfers with bounded waits
//! - [`continuation`]: buffer for block transfers longer than one transaction
//! - [`engine`]: [`BusEngine`], the command dispatcher owning all session state
//! - [`service`]: the polled main loop and the [`ControlPipe`] boundary
//! - [`sim`]: a simulated controller with register-file SMBus targets
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use smbusb_engine::{BusEngine, EngineConfig, Request, Response, TickCounter};
//! use smbusb_engine::sim::{SimTarget, SimulatedController};
//! use smbusb_protocol::Command;
//!
//! let ticks = Arc::new(TickCounter::new());
//! let controller = SimulatedController::new(Arc::clone(&ticks))
//!     .with_target(SimTarget::new(0x16).with_register(0x0D, &[0x42]));
//! let mut engine = BusEngine::new(EngineConfig::default(), controller, ticks);
//!
//! let mut response = Response::new();
//! let request = Request::new(Command::ReadByte.code(), 0x16, 0x0D, 1, &[]);
//! assert!(engine.handle(&request, &mut response).is_ok());
//! assert_eq!(response.as_slice(), &[0x42]);
//! ```

pub mod bus;
pub mod config;
pub mod continuation;
pub mod engine;
pub mod error;
pub mod hal;
pub mod service;
pub mod sim;

pub use bus::{Acknowledge, I2cBus, ReadStep, SessionState};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use continuation::{
    BLOCK_BUFFER_LEN, BlockContinuation, CONTINUATION_CAPACITY, ContinuationMode,
};
pub use engine::{BusEngine, EngineStats, PecState, Request, Response};
pub use error::{ConfigError, ConfigResult};
pub use hal::{CommandSignal, I2cController, TickCounter};
pub use service::{ControlPipe, MemoryPipe, PipeStatus, PollOutcome, SetupPacket, poll};
pub use smbusb_protocol::{BusError, BusResult};
