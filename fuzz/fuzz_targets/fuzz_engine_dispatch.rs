//! Fuzzes the bus engine's command dispatcher with arbitrary request streams.
//!
//! Input is split into records of `[code, value_lo, value_hi, index_lo,
//! index_hi, len, data...]`. Every command must complete without panicking,
//! a failed bus command must release the bus, and no response may exceed one
//! transaction.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_engine_dispatch
#![no_main]
use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use smbusb_engine::sim::{SimTarget, SimulatedController};
use smbusb_engine::{BusEngine, EngineConfig, Request, Response, SessionState, TickCounter};
use smbusb_protocol::{Command, MAX_TRANSFER_LEN};

fuzz_target!(|data: &[u8]| {
    let ticks = Arc::new(TickCounter::new());
    let controller = SimulatedController::new(Arc::clone(&ticks))
        .with_target(SimTarget::new(0x16).with_pec(true))
        .with_target(SimTarget::new(0x20).with_write_limit(2));
    let mut engine = BusEngine::new(EngineConfig::default(), controller, Arc::clone(&ticks));
    let mut response = Response::new();

    let mut rest = data;
    while let [code, v0, v1, i0, i1, len, tail @ ..] = rest {
        let take = usize::from(*len).min(MAX_TRANSFER_LEN).min(tail.len());
        let (payload, next) = tail.split_at(take);
        let value = u16::from_le_bytes([*v0, *v1]);
        let index = u16::from_le_bytes([*i0, *i1]);
        let request = Request::new(*code, value, index, u16::from(*len), payload);

        if engine.handle(&request, &mut response).is_err() {
            assert!(response.is_empty());
            if Command::from_u8(*code).is_some_and(Command::touches_bus) {
                assert_eq!(engine.session(), SessionState::Idle);
            }
        }
        assert!(response.len() <= MAX_TRANSFER_LEN);

        ticks.advance(u32::from(*len & 0x07));
        rest = next;
    }
});
