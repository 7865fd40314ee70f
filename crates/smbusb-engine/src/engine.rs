//! Command dispatcher.
//!
//! [`BusEngine`] owns all device-side session state: the bus, the PEC flags
//! and accumulators, and the block continuation buffer. Each call to
//! [`BusEngine::handle`] runs one command to completion. Bus transactions are
//! sequences of fallible steps; any failure funnels through a single abort
//! path that issues a best-effort stop and discards the partial response.

use std::sync::Arc;

use serde::Serialize;
use smbusb_protocol::{
    BusError, BusResult, Command, FLAG_CLEAR, FLAG_SET, INTERFACE_MAGIC, MAX_BLOCK_LEN,
    MAX_TRANSFER_LEN, Pec, ReadFlags, WriteFlags, read_address,
};
use tracing::{debug, warn};

use crate::bus::{Acknowledge, BusTiming, I2cBus, ReadStep, SessionState};
use crate::config::EngineConfig;
use crate::continuation::{
    BLOCK_BUFFER_LEN, BlockContinuation, CONTINUATION_CAPACITY, ContinuationMode,
};
use crate::hal::{I2cController, TickCounter};

/// Payload byte sequence of the command-writability probe after the command byte.
/// The fourth byte is written but not counted.
const WRITABILITY_PROBE: [(u8, bool); 5] = [
    (0x03, true),
    (0x00, true),
    (0x00, false),
    (0x00, true),
    (0x00, true),
];

/// One decoded vendor request.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub code: u8,
    /// "Address" field.
    pub value: u16,
    /// "Command" field.
    pub index: u16,
    /// Requested data-stage length.
    pub length: u16,
    /// Host-to-device data stage.
    pub data: &'a [u8],
}

impl<'a> Request<'a> {
    pub fn new(code: u8, value: u16, index: u16, length: u16, data: &'a [u8]) -> Self {
        Self {
            code,
            value,
            index,
            length,
            data,
        }
    }

    /// Low byte of `value`, the SMBus address for bus commands.
    #[allow(clippy::cast_possible_truncation, reason = "SMBus fields are one byte on the wire")]
    fn address(&self) -> u8 {
        (self.value & 0xFF) as u8
    }

    /// Low byte of `index`, the SMBus command byte for bus commands.
    #[allow(clippy::cast_possible_truncation, reason = "SMBus fields are one byte on the wire")]
    fn command(&self) -> u8 {
        (self.index & 0xFF) as u8
    }
}

/// Device-to-host data stage, at most one transaction long.
#[derive(Debug, Clone)]
pub struct Response {
    buf: [u8; MAX_TRANSFER_LEN],
    len: usize,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_TRANSFER_LEN],
            len: 0,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        self.buf.get(..self.len).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Append one byte. Bytes beyond the transaction size are dropped.
    pub fn push(&mut self, byte: u8) {
        if let Some(slot) = self.buf.get_mut(self.len) {
            *slot = byte;
            self.len = self.len.saturating_add(1);
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.push(b);
        }
    }

    fn spare_mut(&mut self) -> &mut [u8] {
        self.buf.get_mut(self.len..).unwrap_or(&mut [])
    }

    fn commit(&mut self, n: usize) {
        self.len = self.len.saturating_add(n).min(MAX_TRANSFER_LEN);
    }
}

/// PEC configuration and the raw-primitive accumulators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PecState {
    pub enabled: bool,
    /// Sticky: set on any mismatch, cleared only by the host.
    pub failed: bool,
    /// Accumulated over the bytes of a chained raw transaction.
    pub mrq: Pec,
    /// PEC byte captured by the last raw read that carried the last-read flag.
    pub rcv: u8,
}

/// Engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub commands: u64,
    pub failures: u64,
    pub pec_mismatches: u64,
    pub bus_timeouts: u64,
    pub stale_continuations: u64,
}

/// Device-side SMBus engine.
#[derive(Debug)]
pub struct BusEngine<C> {
    config: EngineConfig,
    bus: I2cBus<C>,
    pec: PecState,
    continuation: BlockContinuation,
    stats: EngineStats,
}

impl<C: I2cController> BusEngine<C> {
    pub fn new(config: EngineConfig, controller: C, ticks: Arc<TickCounter>) -> Self {
        let timing = BusTiming {
            start_retries: config.start_retries,
            start_retry_delay_ms: config.start_retry_delay_ms,
            timeout_ticks: config.bus_timeout_ticks,
        };
        Self {
            config,
            bus: I2cBus::new(controller, ticks, timing),
            pec: PecState {
                enabled: config.pec_enabled,
                ..PecState::default()
            },
            continuation: BlockContinuation::new(),
            stats: EngineStats::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn controller(&self) -> &C {
        self.bus.controller()
    }

    pub fn controller_mut(&mut self) -> &mut C {
        self.bus.controller_mut()
    }

    pub fn pec_state(&self) -> PecState {
        self.pec
    }

    pub fn continuation(&self) -> &BlockContinuation {
        &self.continuation
    }

    pub fn session(&self) -> SessionState {
        self.bus.session()
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Run one command to completion.
    ///
    /// On success `response` holds the data stage for device-to-host commands.
    /// On failure `response` is empty and any open bus transaction has been
    /// closed with a best-effort stop.
    ///
    /// # Errors
    ///
    /// Any [`BusError`]. A [`BusError::PecMismatch`] also sets the sticky
    /// PEC-failure flag.
    pub fn handle(&mut self, request: &Request<'_>, response: &mut Response) -> BusResult<()> {
        response.clear();
        self.stats.commands = self.stats.commands.saturating_add(1);

        let Some(command) = Command::from_u8(request.code) else {
            warn!(code = format_args!("{:#04x}", request.code), "unknown command");
            self.stats.failures = self.stats.failures.saturating_add(1);
            return Err(BusError::UnknownCommand(request.code));
        };
        debug!(
            %command,
            value = format_args!("{:#06x}", request.value),
            index = format_args!("{:#06x}", request.index),
            length = request.length,
            "command"
        );

        let result = self.dispatch(command, request, response);
        if let Err(err) = result {
            self.abort(command, err, response);
        }
        result
    }

    fn dispatch(
        &mut self,
        command: Command,
        request: &Request<'_>,
        response: &mut Response,
    ) -> BusResult<()> {
        match command {
            Command::EnablePec => {
                self.set_pec(request.value > 0);
                Ok(())
            }
            Command::InterfaceId => {
                response.extend(&INTERFACE_MAGIC);
                Ok(())
            }
            Command::FirmwareVersion => {
                response.extend(&self.config.firmware_version.to_bytes());
                Ok(())
            }
            Command::SendByte => self.send_byte(request.address(), request.command()),
            Command::ReadByte => self.read_data(request.address(), request.command(), 1, response),
            Command::ReadWord => self.read_data(request.address(), request.command(), 2, response),
            Command::WriteByte => {
                let data = request
                    .data
                    .get(..1)
                    .ok_or(BusError::invalid_request("write-byte needs one data byte"))?;
                self.write_data(request.address(), request.command(), data)
            }
            Command::WriteWord => {
                let data = request
                    .data
                    .get(..2)
                    .ok_or(BusError::invalid_request("write-word needs two data bytes"))?;
                self.write_data(request.address(), request.command(), data)
            }
            Command::ReadBlock => self.read_block(request.address(), request.command(), response),
            Command::WriteBlock => {
                self.write_block(request.address(), request.command(), request.data)
            }
            Command::Write => self.raw_write(request),
            Command::Read => self.raw_read(request, response),
            Command::GetClearPecFail => {
                response.push(if self.take_pec_failure() {
                    FLAG_SET
                } else {
                    FLAG_CLEAR
                });
                Ok(())
            }
            Command::GetRawPecs => {
                response.extend(&[self.pec.mrq.value(), self.pec.rcv]);
                Ok(())
            }
            Command::ResetInterface => {
                self.reset_interface();
                Ok(())
            }
            Command::TestAddressAck => {
                let ack = self.probe_address(request.address())?;
                response.push(if ack { FLAG_SET } else { FLAG_CLEAR });
                Ok(())
            }
            Command::TestCommandAck => {
                let ack = self.probe_command(request.address(), request.command())?;
                response.push(if ack { FLAG_SET } else { FLAG_CLEAR });
                Ok(())
            }
            Command::TestCommandWrite => {
                let depth = self.probe_writability(request.address(), request.command())?;
                response.push(depth);
                Ok(())
            }
        }
    }

    fn abort(&mut self, command: Command, err: BusError, response: &mut Response) {
        response.clear();
        self.stats.failures = self.stats.failures.saturating_add(1);
        match err {
            BusError::Timeout => self.stats.bus_timeouts = self.stats.bus_timeouts.saturating_add(1),
            BusError::PecMismatch { .. } => {
                self.stats.pec_mismatches = self.stats.pec_mismatches.saturating_add(1);
            }
            _ => {}
        }
        if command.touches_bus() {
            self.bus.stop();
        }
        warn!(%command, error = %err, "command failed");
    }

    /// Enable or disable PEC. Disabling clears both raw accumulators.
    pub fn set_pec(&mut self, enabled: bool) {
        self.pec.enabled = enabled;
        if !enabled {
            self.pec.mrq.reset();
            self.pec.rcv = 0;
        }
    }

    /// Read and clear the sticky PEC-failure flag.
    pub fn take_pec_failure(&mut self) -> bool {
        std::mem::take(&mut self.pec.failed)
    }

    /// Clear all sticky state, idle the continuation buffer and release the bus.
    pub fn reset_interface(&mut self) {
        self.pec.mrq.reset();
        self.pec.rcv = 0;
        self.pec.failed = false;
        self.continuation.reset();
        self.bus.stop();
        debug!("interface reset");
    }

    fn record_pec_mismatch(&mut self, expected: u8, received: u8) -> BusError {
        self.pec.failed = true;
        warn!(
            expected = format_args!("{expected:#04x}"),
            received = format_args!("{received:#04x}"),
            "PEC mismatch"
        );
        BusError::pec_mismatch(expected, received)
    }

    /// `start, address, command`, the common prefix of every SMBus verb.
    fn open(&mut self, address: u8, command: u8) -> BusResult<()> {
        self.bus.start()?;
        self.bus.write_acked(address)?;
        self.bus.write_acked(command)
    }

    /// `start, address, command, restart, address|1`, with the PEC seeded accordingly.
    fn open_read(&mut self, address: u8, command: u8) -> BusResult<Pec> {
        self.open(address, command)?;
        self.bus.restart();
        self.bus.write_acked(read_address(address))?;
        Ok(Pec::new()
            .with(address)
            .with(command)
            .with(read_address(address)))
    }

    fn send_byte(&mut self, address: u8, command: u8) -> BusResult<()> {
        self.open(address, command)?;
        self.bus.stop();
        Ok(())
    }

    /// Read-byte and read-word: `count` data bytes, then the PEC byte if enabled.
    fn read_data(
        &mut self,
        address: u8,
        command: u8,
        count: usize,
        response: &mut Response,
    ) -> BusResult<()> {
        let mut pec = self.open_read(address, command)?;
        let total = if self.pec.enabled { count.saturating_add(1) } else { count };
        let mut received = 0;
        for i in 0..total {
            let byte = self.bus.read_byte(ReadStep::in_sequence(i, total))?;
            if i < count {
                response.push(byte);
                pec.update(byte);
            } else {
                received = byte;
            }
        }
        if self.pec.enabled && !pec.matches(received) {
            return Err(self.record_pec_mismatch(pec.value(), received));
        }
        Ok(())
    }

    /// Write-byte and write-word: data bytes, then the PEC byte if enabled.
    fn write_data(&mut self, address: u8, command: u8, data: &[u8]) -> BusResult<()> {
        self.open(address, command)?;
        let mut pec = Pec::new().with(address).with(command);
        for &b in data {
            self.bus.write_acked(b)?;
            pec.update(b);
        }
        if self.pec.enabled {
            self.bus.write_acked(pec.value())?;
        }
        self.bus.stop();
        Ok(())
    }

    /// Discard a live continuation whose last call is older than the budget.
    fn expire_continuation(&mut self) {
        let now = self.bus.ticks().now();
        if self
            .continuation
            .expire(now, self.config.block_sequence_timeout_ticks)
        {
            self.stats.stale_continuations = self.stats.stale_continuations.saturating_add(1);
            warn!("stale block continuation discarded");
        }
    }

    fn read_block(&mut self, address: u8, command: u8, response: &mut Response) -> BusResult<()> {
        self.expire_continuation();
        let now = self.bus.ticks().now();
        match self.continuation.mode() {
            ContinuationMode::ReadDrain => {
                // Parameters are ignored while spilled bytes are pending.
                let n = self.continuation.drain_into(response.spare_mut(), now);
                response.commit(n);
                debug!(bytes = n, remaining = self.continuation.remaining(), "block read drained");
                return Ok(());
            }
            ContinuationMode::WriteFill { .. } => {
                warn!("block write sequence abandoned by block read");
                self.continuation.reset();
            }
            ContinuationMode::Idle => {}
        }

        let mut pec = self.open_read(address, command)?;

        // The read-ahead signal must be armed before the length is known:
        // assume the longest block and correct the total once the count byte
        // arrives. The PEC byte is always clocked so the correction is never
        // too late.
        let mut spill = [0u8; CONTINUATION_CAPACITY];
        let mut spilled = 0;
        let mut total = MAX_BLOCK_LEN;
        let mut received = 0;
        let mut i = 0;
        while i < total {
            let step = ReadStep {
                first: i == 0,
                single: false,
                second_to_last: i.saturating_add(2) == total,
                last: i.saturating_add(1) == total,
            };
            let byte = self.bus.read_byte(step)?;
            if i == 0 {
                total = usize::from(byte).saturating_add(2);
            }
            if i.saturating_add(1) < total {
                pec.update(byte);
                if i < MAX_TRANSFER_LEN {
                    response.push(byte);
                } else if let Some(slot) = spill.get_mut(spilled) {
                    *slot = byte;
                    spilled = spilled.saturating_add(1);
                }
            } else {
                received = byte;
            }
            i = i.saturating_add(1);
        }

        if self.pec.enabled && !pec.matches(received) {
            return Err(self.record_pec_mismatch(pec.value(), received));
        }
        if spilled > 0 {
            let pending = spill.get(..spilled).unwrap_or(&[]);
            self.continuation.begin_read(pending, self.bus.ticks().now())?;
            debug!(spilled, "block read continues");
        }
        Ok(())
    }

    fn write_block(&mut self, address: u8, command: u8, data: &[u8]) -> BusResult<()> {
        self.expire_continuation();
        let now = self.bus.ticks().now();
        match self.continuation.mode() {
            ContinuationMode::WriteFill { address, command } => {
                let taken = match self.continuation.append(data, now) {
                    Ok(taken) => taken,
                    Err(err) => {
                        self.continuation.reset();
                        return Err(err);
                    }
                };
                if !self.continuation.write_complete() {
                    debug!(taken, remaining = self.continuation.remaining(), "block write buffered");
                    return Ok(());
                }
                let mut payload = [0u8; BLOCK_BUFFER_LEN];
                let filled = self.continuation.filled();
                let n = filled.len();
                if let Some(dst) = payload.get_mut(..n) {
                    dst.copy_from_slice(filled);
                }
                self.continuation.reset();
                return self.write_block_transaction(address, command, payload.get(..n).unwrap_or(&[]));
            }
            ContinuationMode::ReadDrain => {
                warn!("block read drain abandoned by block write");
                self.continuation.reset();
            }
            ContinuationMode::Idle => {}
        }

        let Some((&declared, rest)) = data.split_first() else {
            return Err(BusError::invalid_request("write-block needs a count byte"));
        };
        let len = usize::from(declared);
        if len >= MAX_TRANSFER_LEN {
            // Framed block exceeds one transaction: buffer until complete.
            self.continuation.begin_write(address, command, declared, rest, now)?;
            debug!(declared, buffered = self.continuation.position(), "block write continues");
            return Ok(());
        }
        let payload = rest
            .get(..len)
            .ok_or(BusError::invalid_request("write-block payload shorter than its count"))?;
        self.write_block_transaction(address, command, payload)
    }

    fn write_block_transaction(&mut self, address: u8, command: u8, payload: &[u8]) -> BusResult<()> {
        let count = u8::try_from(payload.len())
            .map_err(|_| BusError::invalid_request("block longer than 255 bytes"))?;
        self.open(address, command)?;
        self.bus.write_acked(count)?;
        let mut pec = Pec::new().with(address).with(command).with(count);
        for &b in payload {
            self.bus.write_acked(b)?;
            pec.update(b);
        }
        if self.pec.enabled {
            self.bus.write_acked(pec.value())?;
        }
        self.bus.stop();
        Ok(())
    }

    /// Raw write: `value` = payload length, `index` = [`WriteFlags`].
    fn raw_write(&mut self, request: &Request<'_>) -> BusResult<()> {
        let len = usize::from(request.value);
        if len > MAX_TRANSFER_LEN {
            return Err(BusError::invalid_request("raw write longer than one transaction"));
        }
        let payload = request
            .data
            .get(..len)
            .ok_or(BusError::invalid_request("raw write payload shorter than its length"))?;
        let flags = WriteFlags::from_bits_truncate(request.index);

        if flags.contains(WriteFlags::START) {
            if self.pec.enabled {
                self.pec.mrq.reset();
            }
            self.bus.start()?;
        }
        if flags.contains(WriteFlags::RESTART) {
            self.bus.restart();
        }
        for &b in payload {
            self.bus.write_acked(b)?;
            if self.pec.enabled {
                self.pec.mrq.update(b);
            }
        }
        if flags.contains(WriteFlags::STOP) {
            if self.pec.enabled {
                self.bus.write_acked(self.pec.mrq.value())?;
            }
            self.bus.stop();
        }
        Ok(())
    }

    /// Raw read: `value` = length, `index` = [`ReadFlags`].
    ///
    /// With PEC enabled and the last-read flag set, one extra byte is clocked
    /// and captured as the received PEC; it is never verified here.
    fn raw_read(&mut self, request: &Request<'_>, response: &mut Response) -> BusResult<()> {
        let len = usize::from(request.value);
        if len > MAX_TRANSFER_LEN {
            return Err(BusError::invalid_request("raw read longer than one transaction"));
        }
        let flags = ReadFlags::from_bits_truncate(request.index);
        let first = flags.contains(ReadFlags::FIRST);
        let last = flags.contains(ReadFlags::LAST);
        let capture_pec = self.pec.enabled && last;
        let total = if capture_pec { len.saturating_add(1) } else { len };

        for i in 0..total {
            let step = ReadStep {
                first: first && i == 0,
                single: first && i == 0 && total == 1,
                second_to_last: last && i.saturating_add(2) == total,
                last: last && i.saturating_add(1) == total,
            };
            let byte = self.bus.read_byte(step)?;
            if capture_pec && step.last {
                self.pec.rcv = byte;
            } else {
                response.push(byte);
                if self.pec.enabled {
                    self.pec.mrq.update(byte);
                }
            }
        }
        Ok(())
    }

    fn probe_address(&mut self, address: u8) -> BusResult<bool> {
        self.bus.start()?;
        let ack = self.bus.write_byte(address)?;
        self.bus.stop();
        Ok(ack.is_ack())
    }

    fn probe_command(&mut self, address: u8, command: u8) -> BusResult<bool> {
        self.bus.start()?;
        let mut ack = self.bus.write_byte(address)?;
        if ack.is_ack() {
            ack = self.bus.write_byte(command)?;
        }
        self.bus.stop();
        Ok(ack.is_ack())
    }

    /// Count how far writes after the command byte are accepted.
    fn probe_writability(&mut self, address: u8, command: u8) -> BusResult<u8> {
        self.bus.start()?;
        let mut depth = 0u8;
        if self.bus.write_byte(address)? == Acknowledge::Ack
            && self.bus.write_byte(command)? == Acknowledge::Ack
        {
            depth = 1;
            for (byte, counted) in WRITABILITY_PROBE {
                if !self.bus.write_byte(byte)?.is_ack() {
                    break;
                }
                if counted {
                    depth = depth.saturating_add(1);
                }
            }
        }
        self.bus.stop();
        Ok(depth)
    }
}
