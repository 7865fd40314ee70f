//! Virtual bridge for integration and e2e testing.
//!
//! `BridgeScenario` wires a protocol client to a bus engine over the loopback
//! transport. Tests drive the client and inspect the engine, the simulated
//! controller's bus trace and the targets' registers through it.

use std::sync::Arc;

use smbusb_client::{ClientConfig, ClientResult, LoopbackTransport, SmbusClient};
use smbusb_engine::sim::{BusEvent, SimTarget, SimulatedController};
use smbusb_engine::{BusEngine, BusError, EngineConfig, TickCounter};
use smbusb_test_helpers::init_test_logging;
use tracing::debug;

/// Address of the default scenario target (8-bit write form).
pub const SCENARIO_ADDR: u8 = 0x16;

pub type Transport = LoopbackTransport<SimulatedController>;

/// Client, engine and simulated bus sharing one tick counter.
pub struct BridgeScenario {
    pub client: SmbusClient<Transport>,
    ticks: Arc<TickCounter>,
}

impl BridgeScenario {
    /// PEC-checking target at [`SCENARIO_ADDR`], PEC enabled on the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the identification handshake fails.
    pub fn new() -> ClientResult<Self> {
        Self::build(
            EngineConfig::default(),
            vec![SimTarget::new(SCENARIO_ADDR).with_pec(true)],
        )
    }

    /// Same target, engine and target both without PEC.
    ///
    /// # Errors
    ///
    /// Returns an error if the identification handshake fails.
    pub fn without_pec() -> ClientResult<Self> {
        let config = EngineConfig {
            pec_enabled: false,
            ..EngineConfig::default()
        };
        let mut scenario = Self::build(config, vec![SimTarget::new(SCENARIO_ADDR)])?;
        scenario.client.set_pec(false)?;
        Ok(scenario)
    }

    /// Arbitrary engine configuration and bus population.
    ///
    /// # Errors
    ///
    /// Returns an error if the identification handshake fails.
    pub fn build(config: EngineConfig, targets: Vec<SimTarget>) -> ClientResult<Self> {
        init_test_logging();
        let ticks = Arc::new(TickCounter::new());
        let mut controller = SimulatedController::new(Arc::clone(&ticks));
        for target in targets {
            controller.add_target(target);
        }
        let engine = BusEngine::new(config, controller, Arc::clone(&ticks));
        let client = SmbusClient::open(LoopbackTransport::new(engine), ClientConfig::default())?;
        debug!(version = ?client.version(), "bridge scenario ready");
        Ok(Self { client, ticks })
    }

    pub fn engine(&self) -> &BusEngine<SimulatedController> {
        self.client.transport().engine()
    }

    pub fn engine_mut(&mut self) -> &mut BusEngine<SimulatedController> {
        self.client.transport_mut().engine_mut()
    }

    pub fn bus(&self) -> &SimulatedController {
        self.engine().controller()
    }

    pub fn bus_mut(&mut self) -> &mut SimulatedController {
        self.engine_mut().controller_mut()
    }

    pub fn target(&self, address: u8) -> Option<&SimTarget> {
        self.bus().target(address)
    }

    pub fn target_mut(&mut self, address: u8) -> Option<&mut SimTarget> {
        self.bus_mut().target_mut(address)
    }

    /// Device-side failure behind the last stalled request.
    pub fn last_device_error(&self) -> Option<BusError> {
        self.client.transport().last_error()
    }

    /// Let `n` timer ticks pass.
    pub fn advance_ticks(&self, n: u32) {
        self.ticks.advance(n);
    }

    /// Bus trace since creation or the last [`Self::clear_trace`].
    pub fn trace(&self) -> &[BusEvent] {
        self.bus().events()
    }

    pub fn clear_trace(&mut self) {
        self.bus_mut().clear_events();
    }

    pub fn count(&self, event: BusEvent) -> usize {
        self.bus().count_events(event)
    }

    /// Bytes written on the bus, in order, including addresses and PEC.
    pub fn written(&self) -> Vec<u8> {
        self.bus().written_bytes()
    }
}

/// Deterministic test block of `len` bytes.
pub fn test_block(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| u8::try_from(i % 251).unwrap_or(0).wrapping_mul(7).wrapping_add(3))
        .collect()
}
