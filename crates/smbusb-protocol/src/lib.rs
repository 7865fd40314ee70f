//! Wire vocabulary for the SMBus-over-USB bridge.
//!
//! This crate is intentionally I/O-free and allocation-free. Both endpoints of
//! the bridge depend on it: the device-side bus engine decodes command codes
//! and folds bytes into PEC accumulators with it, and the host-side client
//! encodes the same codes and flag sets.
//!
//! # Key Features
//! - Command codes and their transfer direction
//! - Raw-primitive flag sets (start/restart/stop, first/last read)
//! - SMBus Packet Error Checking (CRC-8, polynomial 0x07)
//! - The shared failure taxonomy reported by the device
//! - Identification magic, firmware version and discovery result types

#![deny(static_mut_refs)]

pub mod commands;
pub mod error;
pub mod pec;
pub mod types;

pub use commands::{Command, Direction, ReadFlags, WriteFlags};
pub use error::{BusError, BusResult};
pub use pec::{PEC_POLYNOMIAL, Pec, crc8, update_crc};
pub use types::{FirmwareVersion, INTERFACE_MAGIC, INTERFACE_MAGIC_VALUE, PecPair, WriteDepth};

/// Maximum payload carried by one control transfer, in either direction.
pub const MAX_TRANSFER_LEN: usize = 64;

/// Largest SMBus block (data bytes, excluding the length byte).
pub const MAX_BLOCK_LEN: usize = 255;

/// Response byte used by boolean queries for "true" (ACK seen, PEC failure latched).
pub const FLAG_SET: u8 = 0xFF;

/// Response byte used by boolean queries for "false".
pub const FLAG_CLEAR: u8 = 0x00;

/// Read address for a 8-bit write address (sets the R/W bit).
#[inline]
#[must_use]
pub const fn read_address(address: u8) -> u8 {
    address | 0x01
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_address_sets_rw_bit() {
        assert_eq!(read_address(0x16), 0x17);
        assert_eq!(read_address(0x17), 0x17);
        assert_eq!(read_address(0x00), 0x01);
    }
}
