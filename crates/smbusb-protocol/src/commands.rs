//! Command codes and raw-primitive flag sets.
//!
//! Every command is a vendor control transfer:
//! - `request`: the command code below
//! - `value`: the "address" field (SMBus address, raw length, or PEC enable)
//! - `index`: the "command" field (SMBus command byte or raw flags)
//! - data stage: up to 64 bytes, direction given by [`Command::direction`]

use bitflags::bitflags;

/// Transfer direction of a command's data stage, seen from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Device to host (control IN).
    In,
    /// Host to device (control OUT).
    Out,
}

/// Command codes understood by the bus engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    EnablePec = 0x05,
    ReadByte = 0x10,
    WriteByte = 0x11,
    SendByte = 0x12,
    ReadWord = 0x20,
    WriteWord = 0x21,
    ReadBlock = 0x30,
    WriteBlock = 0x32,
    /// Raw write: `value` = payload length, `index` = [`WriteFlags`].
    Write = 0x50,
    /// Raw read: `value` = length, `index` = [`ReadFlags`].
    Read = 0x51,
    GetClearPecFail = 0x54,
    GetRawPecs = 0x55,
    ResetInterface = 0x61,
    TestAddressAck = 0x90,
    TestCommandAck = 0x91,
    TestCommandWrite = 0x92,
    FirmwareVersion = 0x98,
    InterfaceId = 0x99,
}

impl Command {
    pub const ALL: [Command; 18] = [
        Self::EnablePec,
        Self::ReadByte,
        Self::WriteByte,
        Self::SendByte,
        Self::ReadWord,
        Self::WriteWord,
        Self::ReadBlock,
        Self::WriteBlock,
        Self::Write,
        Self::Read,
        Self::GetClearPecFail,
        Self::GetRawPecs,
        Self::ResetInterface,
        Self::TestAddressAck,
        Self::TestCommandAck,
        Self::TestCommandWrite,
        Self::FirmwareVersion,
        Self::InterfaceId,
    ];

    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0x05 => Some(Self::EnablePec),
            0x10 => Some(Self::ReadByte),
            0x11 => Some(Self::WriteByte),
            0x12 => Some(Self::SendByte),
            0x20 => Some(Self::ReadWord),
            0x21 => Some(Self::WriteWord),
            0x30 => Some(Self::ReadBlock),
            0x32 => Some(Self::WriteBlock),
            0x50 => Some(Self::Write),
            0x51 => Some(Self::Read),
            0x54 => Some(Self::GetClearPecFail),
            0x55 => Some(Self::GetRawPecs),
            0x61 => Some(Self::ResetInterface),
            0x90 => Some(Self::TestAddressAck),
            0x91 => Some(Self::TestCommandAck),
            0x92 => Some(Self::TestCommandWrite),
            0x98 => Some(Self::FirmwareVersion),
            0x99 => Some(Self::InterfaceId),
            _ => None,
        }
    }

    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn direction(self) -> Direction {
        match self {
            Self::ReadByte
            | Self::ReadWord
            | Self::ReadBlock
            | Self::Read
            | Self::GetClearPecFail
            | Self::GetRawPecs
            | Self::TestAddressAck
            | Self::TestCommandAck
            | Self::TestCommandWrite
            | Self::FirmwareVersion
            | Self::InterfaceId => Direction::In,
            Self::EnablePec
            | Self::WriteByte
            | Self::SendByte
            | Self::WriteWord
            | Self::WriteBlock
            | Self::Write
            | Self::ResetInterface => Direction::Out,
        }
    }

    /// True for commands that drive the physical bus.
    pub fn touches_bus(self) -> bool {
        !matches!(
            self,
            Self::EnablePec
                | Self::GetClearPecFail
                | Self::GetRawPecs
                | Self::FirmwareVersion
                | Self::InterfaceId
        )
    }
}

impl core::fmt::Display for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}({:#04x})", self.code())
    }
}

bitflags! {
    /// Framing flags for the raw write primitive (carried in `index`).
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WriteFlags: u16 {
        /// Open the transaction with a start condition (resets the raw PEC accumulator).
        const START = 0x01;
        /// Open with a repeated start without releasing the bus.
        const RESTART = 0x02;
        /// Append the accumulated PEC (when enabled) and close with a stop condition.
        const STOP = 0x04;
    }
}

bitflags! {
    /// Framing flags for the raw read primitive (carried in `index`).
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ReadFlags: u16 {
        /// First read after the address byte: discards the controller's dummy cycle.
        const FIRST = 0x01;
        /// Last read of the transaction: NACKs the final byte, captures PEC, stops.
        const LAST = 0x02;
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(256))]

        #[test]
        fn prop_from_u8_matches_code(val in 0u8..=255) {
            if let Some(cmd) = Command::from_u8(val) {
                prop_assert_eq!(cmd.code(), val);
            }
        }
    }
}
