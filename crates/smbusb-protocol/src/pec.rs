//! SMBus Packet Error Checking.
//!
//! PEC is CRC-8 with polynomial `x^8 + x^2 + x + 1` (0x07), MSB first, not
//! reflected, zero seed and no final XOR. Every address, command and data byte
//! on the wire is folded in transmission order; the PEC byte itself is not.

/// CRC-8 polynomial used by SMBus PEC.
pub const PEC_POLYNOMIAL: u8 = 0x07;

/// Fold one byte into a running PEC value.
#[inline]
#[must_use]
pub const fn update_crc(crc: u8, byte: u8) -> u8 {
    let mut data = crc ^ byte;
    let mut bit = 0;
    while bit < 8 {
        if data & 0x80 != 0 {
            data = (data << 1) ^ PEC_POLYNOMIAL;
        } else {
            data <<= 1;
        }
        bit += 1;
    }
    data
}

/// PEC of a complete byte sequence, zero seed.
#[must_use]
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0, |crc, &b| update_crc(crc, b))
}

/// Running PEC accumulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Pec(u8);

impl Pec {
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    #[inline]
    pub fn update(&mut self, byte: u8) {
        self.0 = update_crc(self.0, byte);
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.update(b);
        }
    }

    #[must_use]
    pub fn with(mut self, byte: u8) -> Self {
        self.update(byte);
        self
    }

    #[inline]
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }

    #[inline]
    #[must_use]
    pub const fn matches(self, received: u8) -> bool {
        self.0 == received
    }
}

impl From<Pec> for u8 {
    fn from(pec: Pec) -> Self {
        pec.0
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    /// Augmented-message long division by the 9-bit generator 0x107.
    fn reference_crc(data: &[u8]) -> u8 {
        let mut rem: u16 = 0;
        for &byte in data {
            for i in (0..8).rev() {
                rem = (rem << 1) | u16::from((byte >> i) & 1);
                if rem & 0x100 != 0 {
                    rem ^= 0x107;
                }
            }
        }
        for _ in 0..8 {
            rem <<= 1;
            if rem & 0x100 != 0 {
                rem ^= 0x107;
            }
        }
        (rem & 0xFF) as u8
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(500))]

        #[test]
        fn prop_matches_reference(data in proptest::collection::vec(any::<u8>(), 0..300)) {
            prop_assert_eq!(crc8(&data), reference_crc(&data));
        }

        #[test]
        fn prop_frame_with_pec_has_zero_remainder(data in proptest::collection::vec(any::<u8>(), 1..64)) {
            let pec = crc8(&data);
            let mut acc = Pec::new();
            acc.extend(&data);
            acc.update(pec);
            prop_assert_eq!(acc.value(), 0);
        }

        #[test]
        fn prop_single_bit_flip_detected(
            data in proptest::collection::vec(any::<u8>(), 1..64),
            idx in any::<proptest::sample::Index>(),
            bit in 0u8..8,
        ) {
            let mut corrupted = data.clone();
            let i = idx.index(corrupted.len());
            if let Some(b) = corrupted.get_mut(i) {
                *b ^= 1 << bit;
            }
            prop_assert_ne!(crc8(&data), crc8(&corrupted));
        }
    }
}
