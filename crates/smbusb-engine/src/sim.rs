//! Simulated I2C controller and SMBus targets.
//!
//! [`SimulatedController`] implements [`I2cController`] with the same
//! pipelined data register as the hardware: the first read after addressing
//! returns a dummy byte, each read returns the previously clocked byte and
//! clocks the next one, and an armed last-read signal NACKs the byte being
//! clocked. It records every bus condition and byte as a [`BusEvent`] and
//! counts read-ahead violations (a stop issued after a byte that was ACKed).
//!
//! [`SimTarget`] is a register-file SMBus device: a write transaction stores
//! the bytes after the command byte under that command; a read transaction
//! returns the stored bytes followed by a PEC over the whole transaction.
//!
//! Fault injection: failed starts, a stalled bus (no completion, ticks keep
//! running), a latched bus error on the next write, and a corrupted PEC.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use smbusb_protocol::crc8;

use crate::hal::{I2cController, TickCounter};

/// Value driven by an idle bus or an unaddressed read.
const IDLE_BYTE: u8 = 0xFF;

/// One observable bus condition or byte transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    Start,
    RepeatedStart,
    Stop,
    Write { byte: u8, ack: bool },
    Read { byte: u8, nacked: bool },
}

/// A simulated SMBus device with a register file.
#[derive(Debug, Clone)]
pub struct SimTarget {
    address: u8,
    pec: bool,
    write_limit: Option<usize>,
    registers: HashMap<u8, Vec<u8>>,
    corrupt_next_pec: bool,
    pec_errors: u32,
    last_command: Option<u8>,
}

impl SimTarget {
    /// Target answering to the 8-bit write address `address` (bit 0 ignored).
    pub fn new(address: u8) -> Self {
        Self {
            address: address & 0xFE,
            pec: false,
            write_limit: None,
            registers: HashMap::new(),
            corrupt_next_pec: false,
            pec_errors: 0,
            last_command: None,
        }
    }

    /// Treat the final byte of every write carrying data as a PEC and verify it.
    #[must_use]
    pub fn with_pec(mut self, pec: bool) -> Self {
        self.pec = pec;
        self
    }

    /// NACK data bytes beyond `limit` after the command byte.
    #[must_use]
    pub fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_register(mut self, command: u8, bytes: &[u8]) -> Self {
        self.registers.insert(command, bytes.to_vec());
        self
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn register(&self, command: u8) -> Option<&[u8]> {
        self.registers.get(&command).map(Vec::as_slice)
    }

    pub fn set_register(&mut self, command: u8, bytes: &[u8]) {
        self.registers.insert(command, bytes.to_vec());
    }

    /// Send a wrong PEC byte on the next read transaction.
    pub fn corrupt_next_pec(&mut self) {
        self.corrupt_next_pec = true;
    }

    /// Writes rejected because their PEC byte did not match.
    pub fn pec_errors(&self) -> u32 {
        self.pec_errors
    }

    /// Command byte of the most recent write or command-select.
    pub fn last_command(&self) -> Option<u8> {
        self.last_command
    }

    fn accepts_data_byte(&self, data_len: usize) -> bool {
        self.write_limit.is_none_or(|limit| data_len < limit)
    }

    /// Bytes sent for a read transaction, PEC last.
    fn read_response(&mut self, transaction: &[u8]) -> VecDeque<u8> {
        let data = self
            .last_command
            .and_then(|cmd| self.registers.get(&cmd))
            .cloned()
            .unwrap_or_default();
        let mut covered = transaction.to_vec();
        covered.extend_from_slice(&data);
        let mut pec = crc8(&covered);
        if self.corrupt_next_pec {
            pec = !pec;
            self.corrupt_next_pec = false;
        }
        let mut out: VecDeque<u8> = data.into();
        out.push_back(pec);
        out
    }

    /// Apply a completed write transaction (`written` starts with the address byte).
    fn commit_write(&mut self, written: &[u8]) {
        let Some((&command, payload)) = written.get(1..).and_then(<[u8]>::split_first) else {
            return;
        };
        self.last_command = Some(command);
        if payload.is_empty() {
            return;
        }
        let data = if self.pec {
            let Some((&received, data)) = payload.split_last() else {
                return;
            };
            let covered_len = written.len().saturating_sub(1);
            let expected = crc8(written.get(..covered_len).unwrap_or(&[]));
            if expected != received {
                self.pec_errors = self.pec_errors.saturating_add(1);
                return;
            }
            data
        } else {
            payload
        };
        self.registers.insert(command, data.to_vec());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Released,
    Addressing,
    Writing(u8),
    Reading(u8),
    Unaddressed,
}

/// Simulated register-level I2C master with attached targets.
#[derive(Debug)]
pub struct SimulatedController {
    ticks: Arc<TickCounter>,
    targets: HashMap<u8, SimTarget>,
    events: Vec<BusEvent>,
    phase: Phase,
    transaction: Vec<u8>,
    written: Vec<u8>,
    read_queue: VecDeque<u8>,
    latched: u8,
    last_clock_nacked: bool,
    last_read_armed: bool,
    stop_requested: bool,
    done: bool,
    ack: bool,
    bus_error: bool,
    failing_starts: u32,
    bus_error_on_write: bool,
    stalled: bool,
    read_ahead_violations: u32,
    delay_ms_total: u64,
}

impl SimulatedController {
    pub fn new(ticks: Arc<TickCounter>) -> Self {
        Self {
            ticks,
            targets: HashMap::new(),
            events: Vec::new(),
            phase: Phase::Released,
            transaction: Vec::new(),
            written: Vec::new(),
            read_queue: VecDeque::new(),
            latched: IDLE_BYTE,
            last_clock_nacked: false,
            last_read_armed: false,
            stop_requested: false,
            done: false,
            ack: false,
            bus_error: false,
            failing_starts: 0,
            bus_error_on_write: false,
            stalled: false,
            read_ahead_violations: 0,
            delay_ms_total: 0,
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: SimTarget) -> Self {
        self.add_target(target);
        self
    }

    pub fn add_target(&mut self, target: SimTarget) {
        self.targets.insert(target.address(), target);
    }

    pub fn target(&self, address: u8) -> Option<&SimTarget> {
        self.targets.get(&(address & 0xFE))
    }

    pub fn target_mut(&mut self, address: u8) -> Option<&mut SimTarget> {
        self.targets.get_mut(&(address & 0xFE))
    }

    pub fn events(&self) -> &[BusEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Bytes written on the bus since the last [`clear_events`](Self::clear_events).
    pub fn written_bytes(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match e {
                BusEvent::Write { byte, .. } => Some(*byte),
                _ => None,
            })
            .collect()
    }

    pub fn count_events(&self, wanted: BusEvent) -> usize {
        self.events.iter().filter(|e| **e == wanted).count()
    }

    /// Latch a bus error on the next `count` start attempts.
    pub fn fail_next_starts(&mut self, count: u32) {
        self.failing_starts = count;
    }

    /// Latch a bus error after the next byte written.
    pub fn latch_bus_error_on_next_write(&mut self) {
        self.bus_error_on_write = true;
    }

    /// Stop completing transfers. Every unsuccessful poll advances the tick counter.
    pub fn stall(&mut self) {
        self.stalled = true;
    }

    pub fn release(&mut self) {
        self.stalled = false;
        self.done = true;
    }

    pub fn read_ahead_violations(&self) -> u32 {
        self.read_ahead_violations
    }

    pub fn total_delay_ms(&self) -> u64 {
        self.delay_ms_total
    }

    /// True when no transaction is open on the bus.
    pub fn is_released(&self) -> bool {
        self.phase == Phase::Released
    }

    fn complete_stop(&mut self) {
        if let Phase::Writing(address) = self.phase {
            let written = std::mem::take(&mut self.written);
            if let Some(target) = self.targets.get_mut(&address) {
                target.commit_write(&written);
            }
        }
        // A stop on a released bus is not observable.
        if self.phase != Phase::Released {
            self.events.push(BusEvent::Stop);
        }
        self.phase = Phase::Released;
        self.transaction.clear();
        self.written.clear();
        self.read_queue.clear();
        self.stop_requested = false;
        self.last_read_armed = false;
    }

    fn select_command(&mut self) {
        if let Phase::Writing(address) = self.phase
            && let Some(&command) = self.written.get(1)
            && let Some(target) = self.targets.get_mut(&address)
        {
            target.last_command = Some(command);
        }
        self.written.clear();
    }

    fn clock_in(&mut self) {
        let nacked = std::mem::take(&mut self.last_read_armed);
        let byte = match self.phase {
            Phase::Reading(_) => self.read_queue.pop_front().unwrap_or(IDLE_BYTE),
            _ => IDLE_BYTE,
        };
        self.latched = byte;
        self.last_clock_nacked = nacked;
        self.events.push(BusEvent::Read { byte, nacked });
        self.done = !self.stalled;
    }

    fn address_byte(&mut self, byte: u8) -> bool {
        let address = byte & 0xFE;
        let Some(target) = self.targets.get_mut(&address) else {
            self.phase = Phase::Unaddressed;
            return false;
        };
        self.transaction.push(byte);
        if byte & 0x01 != 0 {
            self.read_queue = target.read_response(&self.transaction);
            self.phase = Phase::Reading(address);
            self.last_clock_nacked = false;
        } else {
            self.written = vec![byte];
            self.phase = Phase::Writing(address);
        }
        true
    }

    fn data_byte(&mut self, address: u8, byte: u8) -> bool {
        let Some(target) = self.targets.get(&address) else {
            return false;
        };
        let data_len = self.written.len().saturating_sub(2);
        if self.written.len() >= 2 && !target.accepts_data_byte(data_len) {
            return false;
        }
        self.written.push(byte);
        self.transaction.push(byte);
        true
    }
}

impl I2cController for SimulatedController {
    fn issue_start(&mut self) {
        if self.failing_starts > 0 {
            self.failing_starts = self.failing_starts.saturating_sub(1);
            self.bus_error = true;
            return;
        }
        self.bus_error = false;
        if self.phase == Phase::Released {
            self.events.push(BusEvent::Start);
        } else {
            self.select_command();
            self.events.push(BusEvent::RepeatedStart);
        }
        self.phase = Phase::Addressing;
        self.last_read_armed = false;
    }

    fn issue_stop(&mut self) {
        if matches!(self.phase, Phase::Reading(_)) {
            // Completes after the byte in flight, on the next data read or status poll.
            self.stop_requested = true;
        } else if !self.stalled {
            self.complete_stop();
        } else {
            self.stop_requested = true;
        }
    }

    fn stop_pending(&mut self) -> bool {
        if !self.stop_requested {
            return false;
        }
        if self.stalled {
            self.ticks.tick();
            return true;
        }
        self.complete_stop();
        false
    }

    fn write_data(&mut self, byte: u8) {
        let ack = match self.phase {
            Phase::Addressing => self.address_byte(byte),
            Phase::Writing(address) => self.data_byte(address, byte),
            Phase::Reading(_) | Phase::Unaddressed | Phase::Released => false,
        };
        self.ack = ack;
        self.events.push(BusEvent::Write { byte, ack });
        if std::mem::take(&mut self.bus_error_on_write) {
            self.bus_error = true;
        }
        self.done = !self.stalled;
    }

    fn read_data(&mut self) -> u8 {
        let out = self.latched;
        if self.stop_requested {
            if !self.last_clock_nacked {
                self.read_ahead_violations = self.read_ahead_violations.saturating_add(1);
            }
            if !self.stalled {
                self.complete_stop();
            }
        } else {
            self.clock_in();
        }
        out
    }

    fn is_done(&mut self) -> bool {
        if self.stalled {
            self.ticks.tick();
            return false;
        }
        self.done
    }

    fn acked(&self) -> bool {
        self.ack
    }

    fn bus_error(&self) -> bool {
        self.bus_error
    }

    fn arm_last_read(&mut self) {
        self.last_read_armed = true;
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay_ms_total = self.delay_ms_total.saturating_add(u64::from(ms));
    }
}
