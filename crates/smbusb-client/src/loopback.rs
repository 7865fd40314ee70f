//! In-process transport driving a [`BusEngine`] directly.
//!
//! Each transfer is submitted to a [`MemoryPipe`], the command signal is
//! raised, and the engine's main-loop [`poll`] services it. A stalled pipe
//! surfaces as [`TransportError::Stall`], exactly as the USB stack reports it.

use std::time::Duration;

use smbusb_engine::{
    BusEngine, BusError, CommandSignal, I2cController, MemoryPipe, PipeStatus, PollOutcome,
    SetupPacket, poll,
};
use tracing::trace;

use crate::error::TransportError;
use crate::transport::{ControlTransport, VendorRequest};

#[derive(Debug)]
pub struct LoopbackTransport<C> {
    engine: BusEngine<C>,
    signal: CommandSignal,
    pipe: MemoryPipe,
    last_error: Option<BusError>,
}

impl<C: I2cController> LoopbackTransport<C> {
    pub fn new(engine: BusEngine<C>) -> Self {
        Self {
            engine,
            signal: CommandSignal::new(),
            pipe: MemoryPipe::new(),
            last_error: None,
        }
    }

    pub fn engine(&self) -> &BusEngine<C> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut BusEngine<C> {
        &mut self.engine
    }

    pub fn into_engine(self) -> BusEngine<C> {
        self.engine
    }

    /// Failure behind the most recent stall. The USB encoding drops it.
    pub fn last_error(&self) -> Option<BusError> {
        self.last_error
    }

    fn transact(&mut self, setup: SetupPacket, data: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.pipe.submit(setup, data, &self.signal);
        let outcome = poll(&mut self.engine, &self.signal, &mut self.pipe);
        trace!(?outcome, "loopback request serviced");
        self.last_error = match outcome {
            PollOutcome::Stalled(err) => Some(err),
            PollOutcome::Completed | PollOutcome::Idle => None,
        };
        match self.pipe.take_status() {
            PipeStatus::Completed(response) => Ok(response),
            PipeStatus::Stalled => Err(TransportError::Stall),
            PipeStatus::Pending => Err(TransportError::Other("request was not serviced".into())),
        }
    }
}

impl<C: I2cController> ControlTransport for LoopbackTransport<C> {
    fn control_in(
        &mut self,
        request: VendorRequest,
        length: u16,
        _timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let setup = SetupPacket {
            request: request.command.code(),
            value: request.value,
            index: request.index,
            length,
        };
        self.transact(setup, &[])
    }

    fn control_out(
        &mut self,
        request: VendorRequest,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        let setup = SetupPacket {
            request: request.command.code(),
            value: request.value,
            index: request.index,
            length: u16::try_from(data.len()).unwrap_or(u16::MAX),
        };
        self.transact(setup, data)?;
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use smbusb_engine::sim::{SimTarget, SimulatedController};
    use smbusb_engine::{EngineConfig, TickCounter};
    use smbusb_protocol::Command;

    use super::*;

    fn loopback() -> LoopbackTransport<SimulatedController> {
        let ticks = Arc::new(TickCounter::new());
        let controller = SimulatedController::new(Arc::clone(&ticks))
            .with_target(SimTarget::new(0x16).with_register(0x0D, &[0x42]));
        LoopbackTransport::new(BusEngine::new(EngineConfig::default(), controller, ticks))
    }

    #[test]
    fn test_in_transfer_returns_response() -> Result<(), TransportError> {
        let mut transport = loopback();
        let data = transport.control_in(
            VendorRequest::new(Command::InterfaceId, 0, 0),
            3,
            Duration::from_millis(100),
        )?;
        assert_eq!(data, vec![0x55, 0x53, 0x4D]);
        assert_eq!(transport.last_error(), None);
        Ok(())
    }

    #[test]
    fn test_failure_is_a_stall() {
        let mut transport = loopback();
        let result = transport.control_out(
            VendorRequest::new(Command::SendByte, 0x40, 0x01),
            &[],
            Duration::from_millis(100),
        );
        assert_eq!(result, Err(TransportError::Stall));
        assert_eq!(transport.last_error(), Some(BusError::Nack));
    }
}
