//! Splitting whole-value operations into 64-byte control transfers.

use std::fmt;
use std::ops::Range;

use smbusb_protocol::{Command, MAX_BLOCK_LEN, MAX_TRANSFER_LEN};

use crate::error::{ClientError, ClientResult};

/// One control transfer's share of a larger payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub offset: usize,
    pub len: usize,
    pub first: bool,
    pub last: bool,
}

impl Chunk {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset.saturating_add(self.len)
    }

    /// Chunk length as the 16-bit setup field.
    pub fn len_u16(&self) -> u16 {
        u16::try_from(self.len).unwrap_or(u16::MAX)
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let range = self.range();
        write!(f, "[{}..{}", range.start, range.end)?;
        if self.first {
            f.write_str(" first")?;
        }
        if self.last {
            f.write_str(" last")?;
        }
        f.write_str("]")
    }
}

/// Split `total` bytes into transfers of at most 64 bytes.
///
/// An empty payload still yields one zero-length chunk so that the flags it
/// carries reach the device.
pub fn plan(total: usize) -> Vec<Chunk> {
    let count = total.div_ceil(MAX_TRANSFER_LEN).max(1);
    (0..count)
        .map(|i| {
            let offset = i.saturating_mul(MAX_TRANSFER_LEN);
            Chunk {
                offset,
                len: total.saturating_sub(offset).min(MAX_TRANSFER_LEN),
                first: i == 0,
                last: i.saturating_add(1) == count,
            }
        })
        .collect()
}

/// Plan a chained raw read.
///
/// The device arms the last-read signal one byte ahead, inside the final
/// call. A final call of a single byte has nothing to arm it from unless the
/// PEC trailer follows, so one byte moves over from the previous chunk.
pub fn plan_raw_read(total: usize, pec_trailer: bool) -> Vec<Chunk> {
    let mut chunks = plan(total);
    if pec_trailer || chunks.len() < 2 {
        return chunks;
    }
    if let [.., prev, last] = chunks.as_mut_slice()
        && last.len == 1
    {
        prev.len = prev.len.saturating_sub(1);
        last.offset = last.offset.saturating_sub(1);
        last.len = 2;
    }
    chunks
}

/// `[length] + data`, the framing of a block write.
///
/// # Errors
///
/// [`ClientError::BlockTooLarge`] beyond 255 data bytes.
pub fn block_frame(data: &[u8]) -> ClientResult<Vec<u8>> {
    if data.len() > MAX_BLOCK_LEN {
        return Err(ClientError::BlockTooLarge { len: data.len() });
    }
    let len = u8::try_from(data.len()).map_err(|_| ClientError::BlockTooLarge { len: data.len() })?;
    let mut frame = Vec::with_capacity(data.len().saturating_add(1));
    frame.push(len);
    frame.extend_from_slice(data);
    Ok(frame)
}

/// Reassembles a block read from successive read-block responses.
///
/// The first response is `[length] + data` (at most 63 data bytes); each
/// later one carries the next piece of data. Every response must be exactly
/// as long as the device is expected to send.
#[derive(Debug, Clone, Default)]
pub struct BlockAssembler {
    declared: Option<usize>,
    data: Vec<u8>,
}

impl BlockAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declared block length, once the first response has arrived.
    pub fn declared(&self) -> Option<usize> {
        self.declared
    }

    pub fn is_complete(&self) -> bool {
        self.declared.is_some_and(|d| self.data.len() >= d)
    }

    /// Response length expected from the next read-block call.
    pub fn expected_next(&self) -> usize {
        match self.declared {
            None => MAX_TRANSFER_LEN,
            Some(d) => d.saturating_sub(self.data.len()).min(MAX_TRANSFER_LEN),
        }
    }

    /// Feed one response. Returns true once the block is complete.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidResponse`] when the response is shorter or
    /// longer than the device would send for this block.
    pub fn push(&mut self, response: &[u8]) -> ClientResult<bool> {
        let payload = match self.declared {
            None => {
                let Some((&len, rest)) = response.split_first() else {
                    return Err(invalid(1, 0));
                };
                let declared = usize::from(len);
                let expected = declared.saturating_add(1).min(MAX_TRANSFER_LEN);
                if response.len() != expected {
                    return Err(invalid(expected, response.len()));
                }
                self.declared = Some(declared);
                self.data.reserve(declared);
                rest
            }
            Some(_) => {
                let expected = self.expected_next();
                if expected == 0 || response.len() != expected {
                    return Err(invalid(expected, response.len()));
                }
                response
            }
        };
        self.data.extend_from_slice(payload);
        Ok(self.is_complete())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

fn invalid(expected: usize, actual: usize) -> ClientError {
    ClientError::InvalidResponse {
        command: Command::ReadBlock,
        expected,
        actual,
    }
}
