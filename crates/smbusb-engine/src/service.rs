//! Polled main loop.
//!
//! The setup-packet interrupt raises a [`CommandSignal`]; the main loop calls
//! [`poll`] to drain it. `poll` runs exactly one command to completion and
//! then either completes the control transfer's data stage or stalls the
//! pipe, which is how a failed command is reported to the host.

use smbusb_protocol::BusError;
use tracing::trace;

use crate::engine::{BusEngine, Request, Response};
use crate::hal::{CommandSignal, I2cController};

/// Setup stage of a vendor control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupPacket {
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

/// Boundary to the external USB stack's control endpoint.
pub trait ControlPipe {
    /// Setup packet of the pending request, if any.
    fn setup(&mut self) -> Option<SetupPacket>;

    /// Host-to-device data stage of the pending request.
    fn data_out(&self) -> &[u8];

    /// Finish the request successfully, sending `data` for device-to-host requests.
    fn complete(&mut self, data: &[u8]);

    /// Finish the request with a protocol stall.
    fn stall(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No command was pending.
    Idle,
    Completed,
    Stalled(BusError),
}

/// Drain one pending command, if any.
pub fn poll<C, P>(engine: &mut BusEngine<C>, signal: &CommandSignal, pipe: &mut P) -> PollOutcome
where
    C: I2cController,
    P: ControlPipe + ?Sized,
{
    if !signal.take() {
        return PollOutcome::Idle;
    }
    let Some(setup) = pipe.setup() else {
        trace!("signal raised without a setup packet");
        return PollOutcome::Idle;
    };

    let mut response = Response::new();
    let result = {
        let request = Request::new(
            setup.request,
            setup.value,
            setup.index,
            setup.length,
            pipe.data_out(),
        );
        engine.handle(&request, &mut response)
    };

    match result {
        Ok(()) => {
            let len = response.len().min(usize::from(setup.length));
            pipe.complete(response.as_slice().get(..len).unwrap_or(&[]));
            PollOutcome::Completed
        }
        Err(err) => {
            pipe.stall();
            PollOutcome::Stalled(err)
        }
    }
}

/// Outcome of a request submitted to a [`MemoryPipe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipeStatus {
    Pending,
    Completed(Vec<u8>),
    Stalled,
}

/// In-memory control pipe holding at most one request.
#[derive(Debug)]
pub struct MemoryPipe {
    setup: Option<SetupPacket>,
    data: Vec<u8>,
    status: PipeStatus,
}

impl Default for MemoryPipe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPipe {
    pub fn new() -> Self {
        Self {
            setup: None,
            data: Vec::new(),
            status: PipeStatus::Pending,
        }
    }

    /// Queue a request and raise the command signal, as the setup interrupt would.
    pub fn submit(&mut self, setup: SetupPacket, data: &[u8], signal: &CommandSignal) {
        self.setup = Some(setup);
        self.data = data.to_vec();
        self.status = PipeStatus::Pending;
        signal.raise();
    }

    pub fn status(&self) -> &PipeStatus {
        &self.status
    }

    /// Take the outcome, leaving the pipe pending.
    pub fn take_status(&mut self) -> PipeStatus {
        std::mem::replace(&mut self.status, PipeStatus::Pending)
    }
}

impl ControlPipe for MemoryPipe {
    fn setup(&mut self) -> Option<SetupPacket> {
        self.setup.take()
    }

    fn data_out(&self) -> &[u8] {
        &self.data
    }

    fn complete(&mut self, data: &[u8]) {
        self.status = PipeStatus::Completed(data.to_vec());
    }

    fn stall(&mut self) {
        self.status = PipeStatus::Stalled;
    }
}
