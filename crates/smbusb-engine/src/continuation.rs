//! Block continuation buffer.
//!
//! Holds the part of a block transfer that does not fit in one 64-byte
//! transaction: the spill of a block read waiting to be drained, or the
//! partial payload of a block write waiting for its remaining chunks.
//!
//! Invariant: `position <= length`; the buffer is idle when `length == 0`.

use smbusb_protocol::{BusError, BusResult, MAX_BLOCK_LEN, MAX_TRANSFER_LEN};

/// Largest block-read spill: bytes of the largest framed block (`1 + 255`)
/// beyond the first transaction.
pub const CONTINUATION_CAPACITY: usize = 192;

/// Storage for a whole block-write payload.
pub const BLOCK_BUFFER_LEN: usize = MAX_BLOCK_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContinuationMode {
    #[default]
    Idle,
    /// Spilled block-read bytes waiting for the host to drain them.
    ReadDrain,
    /// Block-write payload being accumulated before the bus transaction.
    WriteFill { address: u8, command: u8 },
}

#[derive(Debug, Clone)]
pub struct BlockContinuation {
    buf: [u8; BLOCK_BUFFER_LEN],
    position: usize,
    length: usize,
    mode: ContinuationMode,
    last_touch: u32,
}

impl Default for BlockContinuation {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockContinuation {
    pub const fn new() -> Self {
        Self {
            buf: [0; BLOCK_BUFFER_LEN],
            position: 0,
            length: 0,
            mode: ContinuationMode::Idle,
            last_touch: 0,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.length == 0
    }

    pub fn mode(&self) -> ContinuationMode {
        self.mode
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn remaining(&self) -> usize {
        self.length.saturating_sub(self.position)
    }

    pub fn reset(&mut self) {
        self.position = 0;
        self.length = 0;
        self.mode = ContinuationMode::Idle;
    }

    /// Discard a live sequence whose last call is more than `budget` ticks ago.
    ///
    /// Returns true if something was discarded.
    pub fn expire(&mut self, now: u32, budget: u32) -> bool {
        if !self.is_idle() && now.wrapping_sub(self.last_touch) > budget {
            self.reset();
            return true;
        }
        false
    }

    /// Start draining spilled block-read bytes.
    ///
    /// # Errors
    ///
    /// [`BusError::InvalidRequest`] if `spill` is empty or longer than
    /// [`CONTINUATION_CAPACITY`]. The buffer stays idle.
    pub fn begin_read(&mut self, spill: &[u8], now: u32) -> BusResult<()> {
        if spill.is_empty() || spill.len() > CONTINUATION_CAPACITY {
            return Err(BusError::invalid_request("block read spill out of range"));
        }
        let dst = self
            .buf
            .get_mut(..spill.len())
            .ok_or(BusError::invalid_request("block read spill out of range"))?;
        dst.copy_from_slice(spill);
        self.position = 0;
        self.length = spill.len();
        self.mode = ContinuationMode::ReadDrain;
        self.last_touch = now;
        Ok(())
    }

    /// Copy up to one transaction's worth of pending read bytes into `out`.
    ///
    /// Returns the number of bytes copied. The buffer returns to idle once
    /// fully drained.
    pub fn drain_into(&mut self, out: &mut [u8], now: u32) -> usize {
        let n = self.remaining().min(MAX_TRANSFER_LEN).min(out.len());
        let end = self.position.saturating_add(n);
        if let (Some(src), Some(dst)) = (self.buf.get(self.position..end), out.get_mut(..n)) {
            dst.copy_from_slice(src);
        }
        self.position = end;
        self.last_touch = now;
        if self.remaining() == 0 {
            self.reset();
        }
        n
    }

    /// Start accumulating a block write of `declared` bytes.
    ///
    /// `first` holds the data bytes of the first chunk (without the count byte).
    ///
    /// # Errors
    ///
    /// As [`append`](Self::append). On failure the buffer is left idle.
    pub fn begin_write(
        &mut self,
        address: u8,
        command: u8,
        declared: u8,
        first: &[u8],
        now: u32,
    ) -> BusResult<()> {
        self.length = usize::from(declared);
        self.position = 0;
        self.mode = ContinuationMode::WriteFill { address, command };
        self.last_touch = now;
        if let Err(err) = self.append(first, now) {
            self.reset();
            return Err(err);
        }
        Ok(())
    }

    /// Append write payload, ignoring anything beyond the declared length.
    ///
    /// Returns the number of bytes taken.
    ///
    /// # Errors
    ///
    /// [`BusError::InvalidRequest`] if the bytes do not fit the buffer. The
    /// cursor does not move.
    pub fn append(&mut self, data: &[u8], now: u32) -> BusResult<usize> {
        let n = self.remaining().min(data.len());
        let end = self.position.saturating_add(n);
        let (Some(dst), Some(src)) = (self.buf.get_mut(self.position..end), data.get(..n)) else {
            return Err(BusError::invalid_request("block write exceeds the buffer"));
        };
        dst.copy_from_slice(src);
        self.position = end;
        self.last_touch = now;
        Ok(n)
    }

    /// True once a write sequence has accumulated its declared length.
    pub fn write_complete(&self) -> bool {
        matches!(self.mode, ContinuationMode::WriteFill { .. })
            && self.length > 0
            && self.position == self.length
    }

    /// Accumulated write payload.
    pub fn filled(&self) -> &[u8] {
        self.buf.get(..self.position).unwrap_or(&[])
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(200))]

        #[test]
        fn prop_position_never_exceeds_length(
            declared in 64u8..=255,
            chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..=64), 0..8),
        ) {
            let mut cont = BlockContinuation::new();
            cont.begin_write(0x16, 0x40, declared, &[0u8; 63], 0)
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            for chunk in &chunks {
                cont.append(chunk, 0).map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert!(cont.position() <= cont.len());
                prop_assert_eq!(cont.filled().len(), cont.position());
            }
        }

        #[test]
        fn prop_write_fill_keeps_every_byte(
            data in (64usize..=255).prop_flat_map(|n| proptest::collection::vec(any::<u8>(), n)),
            piece in 1usize..=64,
        ) {
            let declared = u8::try_from(data.len()).map_err(|e| TestCaseError::fail(e.to_string()))?;
            let (first, rest) = data.split_at(63);
            let mut cont = BlockContinuation::new();
            cont.begin_write(0x16, 0x40, declared, first, 0)
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            for chunk in rest.chunks(piece) {
                cont.append(chunk, 0).map_err(|e| TestCaseError::fail(e.to_string()))?;
            }
            prop_assert!(cont.write_complete());
            prop_assert_eq!(cont.filled(), data.as_slice());
        }

        #[test]
        fn prop_drain_reproduces_spill(spill in proptest::collection::vec(any::<u8>(), 1..=CONTINUATION_CAPACITY)) {
            let mut cont = BlockContinuation::new();
            cont.begin_read(&spill, 0).map_err(|e| TestCaseError::fail(e.to_string()))?;
            let mut out = [0u8; 64];
            let mut drained = Vec::new();
            while !cont.is_idle() {
                let n = cont.drain_into(&mut out, 0);
                prop_assert!(n > 0 && n <= 64);
                drained.extend_from_slice(out.get(..n).unwrap_or(&[]));
            }
            prop_assert_eq!(drained, spill);
        }
    }
}
