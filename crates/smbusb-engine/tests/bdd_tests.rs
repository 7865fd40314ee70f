//! BDD scenarios for the bus engine, driven at the command level.
//!
//! The host side is played by hand here: each test issues the same
//! sequence of commands the protocol client would.

use std::sync::Arc;

use smbusb_engine::sim::{BusEvent, SimTarget, SimulatedController};
use smbusb_engine::{
    BusEngine, BusError, ContinuationMode, EngineConfig, Request, Response, SessionState,
    TickCounter,
};
use smbusb_protocol::{Command, FLAG_CLEAR, FLAG_SET, crc8};
use smbusb_test_helpers::init_test_logging;

type TestResult = Result<(), Box<dyn std::error::Error>>;

const ADDR: u8 = 0x16;
const BLOCK_CMD: u8 = 0x40;

struct Device {
    ticks: Arc<TickCounter>,
    engine: BusEngine<SimulatedController>,
}

impl Device {
    fn new(pec: bool) -> Self {
        init_test_logging();
        let ticks = Arc::new(TickCounter::new());
        let controller = SimulatedController::new(Arc::clone(&ticks))
            .with_target(SimTarget::new(ADDR).with_pec(pec));
        let config = EngineConfig {
            pec_enabled: pec,
            ..EngineConfig::default()
        };
        let engine = BusEngine::new(config, controller, Arc::clone(&ticks));
        Self { ticks, engine }
    }

    fn call(&mut self, command: Command, value: u16, index: u16, data: &[u8]) -> Result<Vec<u8>, BusError> {
        let mut response = Response::new();
        let request = Request::new(command.code(), value, index, 64, data);
        self.engine.handle(&request, &mut response)?;
        Ok(response.as_slice().to_vec())
    }

    fn block_frame(len: usize) -> Vec<u8> {
        let mut frame = vec![u8::try_from(len).unwrap_or(u8::MAX)];
        frame.extend((0..len).map(|i| (i as u8).wrapping_mul(7).wrapping_add(1)));
        frame
    }

    fn write_block(&mut self, frame: &[u8]) -> Result<(), BusError> {
        for chunk in frame.chunks(64) {
            self.call(Command::WriteBlock, u16::from(ADDR), u16::from(BLOCK_CMD), chunk)?;
        }
        Ok(())
    }

    /// First response starts with the count byte; drain until the count is satisfied.
    fn read_block(&mut self) -> Result<Vec<u8>, BusError> {
        let first = self.call(Command::ReadBlock, u16::from(ADDR), u16::from(BLOCK_CMD), &[])?;
        let total = usize::from(first.first().copied().unwrap_or(0));
        let mut data: Vec<u8> = first.into_iter().skip(1).collect();
        while data.len() < total {
            let more = self.call(Command::ReadBlock, u16::from(ADDR), u16::from(BLOCK_CMD), &[])?;
            if more.is_empty() {
                break;
            }
            data.extend(more);
        }
        Ok(data)
    }
}

mod block_continuation_scenarios {
    use super::*;

    /// Scenario: blocks around the transaction boundary round-trip
    #[test]
    fn scenario_boundary_blocks_round_trip() -> TestResult {
        for len in [1usize, 32, 62, 63, 64, 65, 127, 128, 191, 192, 255] {
            // Given: a PEC-checking target
            let mut dev = Device::new(true);
            let frame = Device::block_frame(len);

            // When: the block is written and read back
            dev.write_block(&frame)?;
            let data = dev.read_block()?;

            // Then: the same bytes come back and all state is idle
            assert_eq!(data.as_slice(), frame.get(1..).unwrap_or(&[]), "len {len}");
            assert!(dev.engine.continuation().is_idle(), "len {len}");
            assert_eq!(dev.engine.session(), SessionState::Idle);
            assert_eq!(dev.engine.controller().read_ahead_violations(), 0);
            assert!(!dev.engine.pec_state().failed);
        }
        Ok(())
    }

    /// Scenario: a 63-byte block completes in one transaction each way
    #[test]
    fn scenario_63_data_bytes_fit_one_transaction() -> TestResult {
        let mut dev = Device::new(true);
        let frame = Device::block_frame(63);
        assert_eq!(frame.len(), 64);

        dev.call(Command::WriteBlock, u16::from(ADDR), u16::from(BLOCK_CMD), &frame)?;
        assert!(dev.engine.continuation().is_idle());
        assert_eq!(dev.engine.controller().count_events(BusEvent::Stop), 1);

        let first = dev.call(Command::ReadBlock, u16::from(ADDR), u16::from(BLOCK_CMD), &[])?;
        assert_eq!(first, frame);
        assert!(dev.engine.continuation().is_idle());
        Ok(())
    }

    /// Scenario: a 64-byte block write is buffered until its last byte arrives
    #[test]
    fn scenario_64_data_bytes_need_one_continuation_byte() -> TestResult {
        let mut dev = Device::new(true);
        let frame = Device::block_frame(64);
        let (head, tail) = frame.split_at(64);

        // When: the first transaction arrives
        dev.call(Command::WriteBlock, u16::from(ADDR), u16::from(BLOCK_CMD), head)?;

        // Then: nothing is on the bus yet
        assert!(dev.engine.controller().events().is_empty());
        assert_eq!(
            dev.engine.continuation().mode(),
            ContinuationMode::WriteFill {
                address: ADDR,
                command: BLOCK_CMD
            }
        );

        // When: the final byte arrives
        dev.call(Command::WriteBlock, u16::from(ADDR), u16::from(BLOCK_CMD), tail)?;

        // Then: one bus transaction carries count, data and PEC
        let mut expected = vec![ADDR, BLOCK_CMD];
        expected.extend_from_slice(&frame);
        expected.push(crc8(&expected));
        assert_eq!(dev.engine.controller().written_bytes(), expected);
        assert!(dev.engine.continuation().is_idle());

        // And: reading back spills exactly one byte
        let first = dev.call(Command::ReadBlock, u16::from(ADDR), u16::from(BLOCK_CMD), &[])?;
        assert_eq!(first.len(), 64);
        assert_eq!(dev.engine.continuation().remaining(), 1);
        let rest = dev.call(Command::ReadBlock, u16::from(ADDR), u16::from(BLOCK_CMD), &[])?;
        assert_eq!(rest.as_slice(), tail);
        assert!(dev.engine.continuation().is_idle());
        Ok(())
    }

    /// Scenario: draining ignores the request parameters and does not touch the bus
    #[test]
    fn scenario_drain_does_not_touch_bus() -> TestResult {
        let mut dev = Device::new(false);
        dev.write_block(&Device::block_frame(200))?;
        dev.call(Command::ReadBlock, u16::from(ADDR), u16::from(BLOCK_CMD), &[])?;
        dev.engine.controller_mut().clear_events();

        let more = dev.call(Command::ReadBlock, 0x00, 0x00, &[])?;
        assert_eq!(more.len(), 64);
        assert!(dev.engine.controller().events().is_empty());
        Ok(())
    }
}

mod staleness_scenarios {
    use super::*;

    /// Scenario: a stale block write is discarded and the next call starts fresh
    #[test]
    fn scenario_stale_write_sequence_is_discarded() -> TestResult {
        // Given: the first chunk of a 100-byte block write
        let mut dev = Device::new(true);
        let frame = Device::block_frame(100);
        let (head, _tail) = frame.split_at(64);
        dev.call(Command::WriteBlock, u16::from(ADDR), u16::from(BLOCK_CMD), head)?;
        assert!(!dev.engine.continuation().is_idle());

        // When: more than the budget elapses and a new complete block arrives
        dev.ticks.advance(6);
        let fresh = [3u8, 0xA1, 0xA2, 0xA3];
        dev.call(Command::WriteBlock, u16::from(ADDR), u16::from(BLOCK_CMD), &fresh)?;

        // Then: the stale data was dropped and the fresh block went straight to the bus
        assert_eq!(dev.engine.stats().stale_continuations, 1);
        assert!(dev.engine.continuation().is_idle());
        let mut expected = vec![ADDR, BLOCK_CMD, 3, 0xA1, 0xA2, 0xA3];
        expected.push(crc8(&expected));
        assert_eq!(dev.engine.controller().written_bytes(), expected);
        Ok(())
    }

    /// Scenario: a sequence resumed within the budget continues
    #[test]
    fn scenario_write_sequence_within_budget_continues() -> TestResult {
        let mut dev = Device::new(true);
        let frame = Device::block_frame(100);
        let (head, tail) = frame.split_at(64);
        dev.call(Command::WriteBlock, u16::from(ADDR), u16::from(BLOCK_CMD), head)?;
        dev.ticks.advance(5);
        dev.call(Command::WriteBlock, u16::from(ADDR), u16::from(BLOCK_CMD), tail)?;
        assert_eq!(dev.engine.stats().stale_continuations, 0);
        assert_eq!(
            dev.engine.controller().target(ADDR).and_then(|t| t.register(BLOCK_CMD)),
            Some(frame.as_slice())
        );
        Ok(())
    }

    /// Scenario: an abandoned block read drain is discarded
    #[test]
    fn scenario_stale_read_drain_starts_fresh_transaction() -> TestResult {
        let mut dev = Device::new(false);
        dev.write_block(&Device::block_frame(150))?;
        dev.call(Command::ReadBlock, u16::from(ADDR), u16::from(BLOCK_CMD), &[])?;
        assert_eq!(dev.engine.continuation().mode(), ContinuationMode::ReadDrain);

        dev.ticks.advance(10);
        dev.engine.controller_mut().clear_events();
        let first = dev.call(Command::ReadBlock, u16::from(ADDR), u16::from(BLOCK_CMD), &[])?;

        assert_eq!(first.first().copied(), Some(150));
        assert_eq!(dev.engine.controller().count_events(BusEvent::Start), 1);
        assert_eq!(dev.engine.stats().stale_continuations, 1);
        Ok(())
    }
}

mod pec_scenarios {
    use super::*;

    /// Scenario: a wrong PEC on read-word sets the sticky flag exactly once
    #[test]
    fn scenario_injected_pec_error_is_sticky_until_cleared() -> TestResult {
        // Given: PEC enabled and a target that will corrupt its next PEC
        let mut dev = Device::new(true);
        dev.call(Command::WriteWord, u16::from(ADDR), 0x08, &[0x10, 0x0E])?;
        if let Some(target) = dev.engine.controller_mut().target_mut(ADDR) {
            target.corrupt_next_pec();
        }

        // When: read-word is issued
        let result = dev.call(Command::ReadWord, u16::from(ADDR), 0x08, &[]);

        // Then: PecMismatch, no data, sticky flag set
        assert!(matches!(result, Err(BusError::PecMismatch { .. })));
        assert!(dev.engine.pec_state().failed);

        // Then: clear-and-query reports the failure once, then never again
        assert_eq!(dev.call(Command::GetClearPecFail, 0, 0, &[])?, vec![FLAG_SET]);
        assert_eq!(dev.call(Command::GetClearPecFail, 0, 0, &[])?, vec![FLAG_CLEAR]);
        assert_eq!(dev.call(Command::GetClearPecFail, 0, 0, &[])?, vec![FLAG_CLEAR]);

        // Then: the next read succeeds
        assert_eq!(dev.call(Command::ReadWord, u16::from(ADDR), 0x08, &[])?, vec![0x10, 0x0E]);
        Ok(())
    }

    /// Scenario: querying the sticky flag without a mismatch never toggles it
    #[test]
    fn scenario_sticky_query_is_idempotent() -> TestResult {
        let mut dev = Device::new(true);
        for _ in 0..2 {
            assert_eq!(dev.call(Command::GetClearPecFail, 0, 0, &[])?, vec![FLAG_CLEAR]);
            assert!(!dev.engine.pec_state().failed);
        }
        Ok(())
    }

    /// Scenario: a PEC mismatch on a long block read discards the spill
    #[test]
    fn scenario_block_pec_mismatch_discards_spill() -> TestResult {
        let mut dev = Device::new(true);
        dev.write_block(&Device::block_frame(120))?;
        if let Some(target) = dev.engine.controller_mut().target_mut(ADDR) {
            target.corrupt_next_pec();
        }

        let result = dev.call(Command::ReadBlock, u16::from(ADDR), u16::from(BLOCK_CMD), &[]);

        assert!(matches!(result, Err(BusError::PecMismatch { .. })));
        assert!(dev.engine.continuation().is_idle());
        assert_eq!(dev.engine.session(), SessionState::Idle);
        Ok(())
    }

    /// Scenario: reset-interface clears the sticky flag
    #[test]
    fn scenario_reset_clears_sticky_flag() -> TestResult {
        let mut dev = Device::new(true);
        dev.call(Command::WriteByte, u16::from(ADDR), 0x0D, &[0x22])?;
        if let Some(target) = dev.engine.controller_mut().target_mut(ADDR) {
            target.corrupt_next_pec();
        }
        assert!(dev.call(Command::ReadByte, u16::from(ADDR), 0x0D, &[]).is_err());
        dev.call(Command::ResetInterface, 0, 0, &[])?;
        assert_eq!(dev.call(Command::GetClearPecFail, 0, 0, &[])?, vec![FLAG_CLEAR]);
        Ok(())
    }
}

mod direction_change_scenarios {
    use super::*;

    /// Scenario: a block write arriving during a read drain abandons the drain
    #[test]
    fn scenario_write_during_drain_abandons_drain() -> TestResult {
        let mut dev = Device::new(false);
        dev.write_block(&Device::block_frame(100))?;
        dev.call(Command::ReadBlock, u16::from(ADDR), u16::from(BLOCK_CMD), &[])?;
        assert_eq!(dev.engine.continuation().mode(), ContinuationMode::ReadDrain);

        dev.call(Command::WriteBlock, u16::from(ADDR), 0x41, &[2, 0xB0, 0xB1])?;

        assert!(dev.engine.continuation().is_idle());
        assert_eq!(
            dev.engine.controller().target(ADDR).and_then(|t| t.register(0x41)),
            Some(&[2u8, 0xB0, 0xB1][..])
        );
        Ok(())
    }
}
