//! Host-side protocol client.
//!
//! [`SmbusClient`] turns SMBus verbs into vendor requests and hides the
//! 64-byte transfer ceiling: block and raw operations of any supported
//! length are split with [`crate::chunk`] and reassembled here. Calls are
//! blocking and strictly sequential; one request is in flight at a time.

use std::time::Duration;

use smbusb_protocol::{
    Command, FLAG_CLEAR, FirmwareVersion, INTERFACE_MAGIC, MAX_TRANSFER_LEN, PecPair, ReadFlags,
    WriteDepth, WriteFlags,
};
use tracing::{debug, info, trace, warn};

use crate::chunk::{BlockAssembler, block_frame, plan, plan_raw_read};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult, TransportError};
use crate::transport::{ControlTransport, VendorRequest};

/// Protocol client over any [`ControlTransport`].
#[derive(Debug)]
pub struct SmbusClient<T> {
    transport: T,
    config: ClientConfig,
    /// Device PEC setting as last set through this client. The engine boots
    /// with PEC enabled.
    pec_enabled: bool,
    version: Option<FirmwareVersion>,
}

impl<T: ControlTransport> SmbusClient<T> {
    /// Wrap `transport` and, if configured, run the identification handshake.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotProgrammed`] when the device does not answer the
    /// identification command with the protocol magic; it then needs its
    /// firmware loaded before this client can talk to it.
    pub fn open(transport: T, config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let mut client = Self {
            transport,
            config,
            pec_enabled: true,
            version: None,
        };
        if config.verify_identity {
            client.identify()?;
        }
        Ok(client)
    }

    fn identify(&mut self) -> ClientResult<()> {
        let magic = match self.interface_id() {
            Ok(magic) => magic,
            Err(ClientError::Transport {
                source: TransportError::Stall,
                ..
            }) => Vec::new(),
            Err(e) => return Err(e),
        };
        if magic != INTERFACE_MAGIC {
            warn!(magic = ?magic, "device did not identify as a bus engine");
            return Err(ClientError::NotProgrammed { magic });
        }
        let version = self.firmware_version()?;
        self.version = Some(version);
        info!(%version, "bus engine identified");
        Ok(())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Firmware version read during the handshake.
    pub fn version(&self) -> Option<FirmwareVersion> {
        self.version
    }

    pub fn pec_enabled(&self) -> bool {
        self.pec_enabled
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    fn read_in(
        &mut self,
        command: Command,
        value: u16,
        index: u16,
        length: u16,
        timeout: Duration,
    ) -> ClientResult<Vec<u8>> {
        trace!(%command, value, index, length, "control in");
        self.transport
            .control_in(VendorRequest::new(command, value, index), length, timeout)
            .map_err(|source| ClientError::transport(command, source))
    }

    /// IN transfer that must return exactly `N` bytes.
    fn query<const N: usize>(
        &mut self,
        command: Command,
        value: u16,
        index: u16,
        timeout: Duration,
    ) -> ClientResult<[u8; N]> {
        let length = u16::try_from(N).unwrap_or(u16::MAX);
        let data = self.read_in(command, value, index, length, timeout)?;
        <[u8; N]>::try_from(data.as_slice()).map_err(|_| ClientError::InvalidResponse {
            command,
            expected: N,
            actual: data.len(),
        })
    }

    fn write_out(&mut self, command: Command, value: u16, index: u16, data: &[u8]) -> ClientResult<()> {
        trace!(%command, value, index, len = data.len(), "control out");
        let timeout = self.config.timeout();
        let sent = self
            .transport
            .control_out(VendorRequest::new(command, value, index), data, timeout)
            .map_err(|source| ClientError::transport(command, source))?;
        if sent != data.len() {
            return Err(ClientError::InvalidResponse {
                command,
                expected: data.len(),
                actual: sent,
            });
        }
        Ok(())
    }

    /// Raw identification bytes. A bus engine answers with [`INTERFACE_MAGIC`].
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer fails.
    pub fn interface_id(&mut self) -> ClientResult<Vec<u8>> {
        let timeout = self.config.timeout();
        self.read_in(Command::InterfaceId, 0, 0, 3, timeout)
    }

    /// # Errors
    ///
    /// Returns an error if the transfer fails or is not three bytes long.
    pub fn firmware_version(&mut self) -> ClientResult<FirmwareVersion> {
        let timeout = self.config.timeout();
        let bytes = self.query::<3>(Command::FirmwareVersion, 0, 0, timeout)?;
        Ok(FirmwareVersion::from_bytes(bytes))
    }

    /// Enable or disable PEC on the device. Disabling clears the raw-primitive
    /// PEC accumulators.
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer fails.
    pub fn set_pec(&mut self, enabled: bool) -> ClientResult<()> {
        self.write_out(Command::EnablePec, u16::from(enabled), 0, &[])?;
        self.pec_enabled = enabled;
        debug!(enabled, "PEC configured");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the device reports a bus failure.
    pub fn send_byte(&mut self, address: u8, command: u8) -> ClientResult<()> {
        self.write_out(Command::SendByte, u16::from(address), u16::from(command), &[])
    }

    /// # Errors
    ///
    /// Returns an error if the device reports a bus failure or PEC mismatch.
    pub fn read_byte(&mut self, address: u8, command: u8) -> ClientResult<u8> {
        let timeout = self.config.timeout();
        let [b] = self.query::<1>(Command::ReadByte, u16::from(address), u16::from(command), timeout)?;
        Ok(b)
    }

    /// # Errors
    ///
    /// Returns an error if the device reports a bus failure.
    pub fn write_byte(&mut self, address: u8, command: u8, value: u8) -> ClientResult<()> {
        self.write_out(Command::WriteByte, u16::from(address), u16::from(command), &[value])
    }

    /// Read a little-endian word.
    ///
    /// # Errors
    ///
    /// Returns an error if the device reports a bus failure or PEC mismatch.
    pub fn read_word(&mut self, address: u8, command: u8) -> ClientResult<u16> {
        let timeout = self.config.timeout();
        let bytes = self.query::<2>(Command::ReadWord, u16::from(address), u16::from(command), timeout)?;
        Ok(u16::from_le_bytes(bytes))
    }

    /// Write a word, low byte first.
    ///
    /// # Errors
    ///
    /// Returns an error if the device reports a bus failure.
    pub fn write_word(&mut self, address: u8, command: u8, value: u16) -> ClientResult<()> {
        self.write_out(
            Command::WriteWord,
            u16::from(address),
            u16::from(command),
            &value.to_le_bytes(),
        )
    }

    /// Read a whole SMBus block, issuing continuation calls as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if any call fails or a response has an unexpected length.
    pub fn read_block(&mut self, address: u8, command: u8) -> ClientResult<Vec<u8>> {
        let timeout = self.config.timeout();
        let mut assembler = BlockAssembler::new();
        let length = u16::try_from(MAX_TRANSFER_LEN).unwrap_or(u16::MAX);
        loop {
            let response = self.read_in(
                Command::ReadBlock,
                u16::from(address),
                u16::from(command),
                length,
                timeout,
            )?;
            if assembler.push(&response)? {
                break;
            }
            trace!(received = assembler.data().len(), declared = ?assembler.declared(), "block read continues");
        }
        debug!(
            address = format_args!("{address:#04x}"),
            command = format_args!("{command:#04x}"),
            len = assembler.data().len(),
            "block read"
        );
        Ok(assembler.into_data())
    }

    /// Read a block into `buf`, returning its length.
    ///
    /// # Errors
    ///
    /// [`ClientError::BufferTooSmall`] if the block does not fit, or any
    /// error of [`Self::read_block`].
    pub fn read_block_into(&mut self, address: u8, command: u8, buf: &mut [u8]) -> ClientResult<usize> {
        let data = self.read_block(address, command)?;
        let available = buf.len();
        let dst = buf.get_mut(..data.len()).ok_or(ClientError::BufferTooSmall {
            needed: data.len(),
            available,
        })?;
        dst.copy_from_slice(&data);
        Ok(data.len())
    }

    /// Write a whole SMBus block of up to 255 bytes.
    ///
    /// # Errors
    ///
    /// [`ClientError::BlockTooLarge`] beyond 255 bytes, or the first failing call.
    pub fn write_block(&mut self, address: u8, command: u8, data: &[u8]) -> ClientResult<()> {
        let frame = block_frame(data)?;
        for chunk in plan(frame.len()) {
            let piece = frame.get(chunk.range()).unwrap_or(&[]);
            self.write_out(Command::WriteBlock, u16::from(address), u16::from(command), piece)?;
        }
        debug!(
            address = format_args!("{address:#04x}"),
            command = format_args!("{command:#04x}"),
            len = data.len(),
            "block write"
        );
        Ok(())
    }

    /// Read and clear the device's sticky PEC-failure flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer fails.
    pub fn take_pec_failure(&mut self) -> ClientResult<bool> {
        let timeout = self.config.timeout();
        let [flag] = self.query::<1>(Command::GetClearPecFail, 0, 0, timeout)?;
        Ok(flag != FLAG_CLEAR)
    }

    /// PEC values accumulated by the raw primitives since the last start.
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer fails.
    pub fn raw_pecs(&mut self) -> ClientResult<PecPair> {
        let timeout = self.config.timeout();
        let bytes = self.query::<2>(Command::GetRawPecs, 0, 0, timeout)?;
        Ok(PecPair::from_bytes(bytes))
    }

    /// Write raw bytes onto the bus, chained over as many calls as needed.
    ///
    /// `START` and `RESTART` apply before the first byte, `STOP` (preceded by
    /// the accumulated PEC when enabled) after the last.
    ///
    /// # Errors
    ///
    /// The first failing call; the rest of the payload is not sent.
    pub fn raw_write(&mut self, data: &[u8], flags: WriteFlags) -> ClientResult<()> {
        for chunk in plan(data.len()) {
            let mut call_flags = WriteFlags::empty();
            if chunk.first {
                call_flags |= flags & (WriteFlags::START | WriteFlags::RESTART);
            }
            if chunk.last {
                call_flags |= flags & WriteFlags::STOP;
            }
            let piece = data.get(chunk.range()).unwrap_or(&[]);
            self.write_out(Command::Write, chunk.len_u16(), call_flags.bits(), piece)?;
        }
        Ok(())
    }

    /// Read `len` raw bytes from the bus, chained over as many calls as needed.
    ///
    /// `FIRST` marks the first read after addressing; `LAST` ends the read
    /// with a NACK and stop, capturing the PEC byte when enabled.
    ///
    /// # Errors
    ///
    /// The first failing call, or a short response.
    pub fn raw_read(&mut self, len: usize, flags: ReadFlags) -> ClientResult<Vec<u8>> {
        let timeout = self.config.timeout();
        let pec_trailer = self.pec_enabled && flags.contains(ReadFlags::LAST);
        let mut out = Vec::with_capacity(len);
        for chunk in plan_raw_read(len, pec_trailer) {
            let mut call_flags = ReadFlags::empty();
            if chunk.first {
                call_flags |= flags & ReadFlags::FIRST;
            }
            if chunk.last {
                call_flags |= flags & ReadFlags::LAST;
            }
            let data = self.read_in(
                Command::Read,
                chunk.len_u16(),
                call_flags.bits(),
                chunk.len_u16(),
                timeout,
            )?;
            if data.len() != chunk.len {
                return Err(ClientError::InvalidResponse {
                    command: Command::Read,
                    expected: chunk.len,
                    actual: data.len(),
                });
            }
            out.extend_from_slice(&data);
        }
        Ok(out)
    }

    /// Clear all device session state and release the bus.
    ///
    /// Issue this before a new logical operation if an earlier chunked one
    /// may have been left incomplete.
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer fails.
    pub fn reset_interface(&mut self) -> ClientResult<()> {
        self.write_out(Command::ResetInterface, 0, 0, &[])?;
        debug!("interface reset");
        Ok(())
    }

    /// True if a device acknowledges `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bus is stuck or the transfer fails.
    pub fn probe_address(&mut self, address: u8) -> ClientResult<bool> {
        let timeout = self.config.probe_timeout();
        let [ack] = self.query::<1>(Command::TestAddressAck, u16::from(address), 0, timeout)?;
        Ok(ack != FLAG_CLEAR)
    }

    /// True if a device acknowledges both `address` and `command`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bus is stuck or the transfer fails.
    pub fn probe_command(&mut self, address: u8, command: u8) -> ClientResult<bool> {
        let timeout = self.config.timeout();
        let [ack] = self.query::<1>(
            Command::TestCommandAck,
            u16::from(address),
            u16::from(command),
            timeout,
        )?;
        Ok(ack != FLAG_CLEAR)
    }

    /// How many bytes after `command` the device accepts.
    ///
    /// # Errors
    ///
    /// Returns an error if the bus is stuck or the transfer fails.
    pub fn probe_writability(&mut self, address: u8, command: u8) -> ClientResult<WriteDepth> {
        let timeout = self.config.timeout();
        let [depth] = self.query::<1>(
            Command::TestCommandWrite,
            u16::from(address),
            u16::from(command),
            timeout,
        )?;
        Ok(WriteDepth::from_u8(depth))
    }

    /// Addresses in `range` that acknowledge, as 8-bit write addresses.
    ///
    /// # Errors
    ///
    /// The first probe that fails outright.
    pub fn scan(&mut self, range: impl IntoIterator<Item = u8>) -> ClientResult<Vec<u8>> {
        let mut found = Vec::new();
        for address in range.into_iter().filter(|a| a & 1 == 0) {
            if self.probe_address(address)? {
                debug!(address = format_args!("{address:#04x}"), "device found");
                found.push(address);
            }
        }
        Ok(found)
    }
}
