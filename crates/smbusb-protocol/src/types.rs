//! Identification values and query results.

use serde::{Deserialize, Serialize};

/// Bytes returned by the identification command ("USM").
pub const INTERFACE_MAGIC: [u8; 3] = [0x55, 0x53, 0x4D];

/// [`INTERFACE_MAGIC`] read as a little-endian integer.
pub const INTERFACE_MAGIC_VALUE: u32 = 0x004D_5355;

/// Bus engine firmware version, as returned by the version query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub revision: u8,
}

impl FirmwareVersion {
    pub const fn new(major: u8, minor: u8, revision: u8) -> Self {
        Self {
            major,
            minor,
            revision,
        }
    }

    pub fn to_bytes(self) -> [u8; 3] {
        [self.major, self.minor, self.revision]
    }

    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        let [major, minor, revision] = bytes;
        Self::new(major, minor, revision)
    }
}

impl Default for FirmwareVersion {
    fn default() -> Self {
        Self::new(1, 0, 0)
    }
}

impl core::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.revision)
    }
}

/// The two raw-primitive PEC values: what the device computed over the
/// chained bytes, and the PEC byte it captured on the final raw read.
///
/// The device never compares them; the host does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PecPair {
    pub computed: u8,
    pub received: u8,
}

impl PecPair {
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        let [computed, received] = bytes;
        Self { computed, received }
    }

    pub fn to_bytes(self) -> [u8; 2] {
        [self.computed, self.received]
    }

    pub fn matches(self) -> bool {
        self.computed == self.received
    }
}

/// How far the command-writability probe got before the target NACKed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WriteDepth {
    /// Address or command byte not acknowledged.
    None,
    /// Command byte acknowledged, no data byte accepted.
    Command,
    /// One data byte accepted.
    Byte,
    /// Two data bytes accepted.
    Word,
    /// A complete 3-byte block (count byte plus three data bytes) accepted.
    Block,
    /// More bytes than the probe block accepted.
    BeyondBlock,
}

impl WriteDepth {
    pub fn from_u8(val: u8) -> Self {
        match val {
            0 => Self::None,
            1 => Self::Command,
            2 => Self::Byte,
            3 => Self::Word,
            4 => Self::Block,
            _ => Self::BeyondBlock,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Command => 1,
            Self::Byte => 2,
            Self::Word => 3,
            Self::Block => 4,
            Self::BeyondBlock => 5,
        }
    }

    pub fn command_exists(self) -> bool {
        self >= Self::Command
    }
}
