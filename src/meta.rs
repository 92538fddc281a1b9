//! Binary layout shared by [`StrHashBuilder`](crate::StrHashBuilder) and
//! [`StrHashTable`](crate::StrHashTable).
//!
//! ```text
//! +-----------------------------+  0
//! | header (128 bytes)          |
//! +-----------------------------+  index_offset
//! | index_count x u64 bucket    |
//! +-----------------------------+  data_offset
//! | 16 zero bytes of padding    |
//! | record | record | ...       |
//! +-----------------------------+  data_offset + data_length
//! ```
//!
//! A record is `next: u64 | hash: u64 | value: [u8; value_size] | key_size: u32 | key`.
//! Every integer uses the host's native byte order and fields are packed with
//! no padding. Offsets stored in buckets and in `next` are relative to the
//! start of the data region; `0` is the "nothing here" sentinel.

use serde::{Deserialize, Serialize};

use crate::MAGIC;

/// Total size of the serialized header, including reserved bytes.
pub const HEADER_SIZE: usize = 128;

/// Size of one bucket in the index region.
pub const BUCKET_SIZE: usize = 8;

/// Leading bytes of the data region that never hold a record, so that offset
/// `0` can act as the empty/end-of-chain sentinel.
pub const DATA_PADDING: u64 = 16;

/// Record bytes excluding the value payload and the key: `next`, `hash` and `key_size`.
pub const RECORD_FIXED_SIZE: usize = 8 + 8 + 4;

/// Bytes of the header occupied by defined fields; the rest is reserved.
const HEADER_FIELDS_SIZE: usize = 48;

/// Number of buckets allocated for `entry_count` records.
///
/// Always a power of two strictly greater than the entry count, even when the
/// entry count is itself a power of two (16 entries get 32 buckets). An empty
/// map gets 2 buckets.
pub fn index_count_for(entry_count: u64) -> u64 {
    // Intentionally not `next_power_of_two`: changing this changes the format.
    2u64 << entry_count.max(1).ilog2()
}

/// Size in bytes of a record holding a key of `key_len` bytes.
pub fn record_size(value_size: usize, key_len: usize) -> usize {
    RECORD_FIXED_SIZE + value_size + key_len
}

/// Fixed-size prologue describing where the index and data regions live.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StrHashHeader {
    /// Format tag, always [`MAGIC`] for valid buffers.
    pub magic: u32,
    /// Size in bytes of the value payload stored in every record.
    pub value_size: u32,
    /// Absolute offset of the index region.
    pub index_offset: u64,
    /// Number of buckets; a power of two.
    pub index_count: u64,
    /// Absolute offset of the data region.
    pub data_offset: u64,
    /// Length of the data region, including the leading padding.
    pub data_length: u64,
    /// Number of records in the data region.
    pub data_count: u64,
}

impl StrHashHeader {
    /// Builds the header describing `entry_count` records of `value_size`
    /// bytes whose data region spans `data_length` bytes.
    pub fn new(value_size: u32, entry_count: u64, data_length: u64) -> Self {
        let index_count = index_count_for(entry_count);
        let index_offset = HEADER_SIZE as u64;
        Self {
            magic: MAGIC,
            value_size,
            index_offset,
            index_count,
            data_offset: index_offset + index_count * BUCKET_SIZE as u64,
            data_length,
            data_count: entry_count,
        }
    }

    /// Length of the index region in bytes, or `None` on overflow.
    pub fn index_length(&self) -> Option<u64> {
        self.index_count.checked_mul(BUCKET_SIZE as u64)
    }

    /// Minimum buffer length implied by this header, or `None` on overflow.
    pub fn total_length(&self) -> Option<u64> {
        (HEADER_SIZE as u64)
            .checked_add(self.index_length()?)?
            .checked_add(self.data_length)
    }

    /// Upper bound on the record count a data region of `data_length` bytes
    /// can hold, or `None` when it is shorter than the leading padding.
    pub fn max_record_count(&self) -> Option<u64> {
        let records_length = self.data_length.checked_sub(DATA_PADDING)?;
        Some(records_length / (RECORD_FIXED_SIZE as u64 + self.value_size as u64))
    }

    /// Serializes the header; reserved bytes are zero.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.magic.to_ne_bytes());
        out[4..8].copy_from_slice(&self.value_size.to_ne_bytes());
        out[8..16].copy_from_slice(&self.index_offset.to_ne_bytes());
        out[16..24].copy_from_slice(&self.index_count.to_ne_bytes());
        out[24..32].copy_from_slice(&self.data_offset.to_ne_bytes());
        out[32..40].copy_from_slice(&self.data_length.to_ne_bytes());
        out[40..HEADER_FIELDS_SIZE].copy_from_slice(&self.data_count.to_ne_bytes());
        out
    }

    /// Parses a header from the front of `data`.
    ///
    /// Returns `None` when fewer than [`HEADER_SIZE`] bytes are available.
    /// No field is validated here; reserved bytes are ignored.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            magic: read_u32(data, 0)?,
            value_size: read_u32(data, 4)?,
            index_offset: read_u64(data, 8)?,
            index_count: read_u64(data, 16)?,
            data_offset: read_u64(data, 24)?,
            data_length: read_u64(data, 32)?,
            data_count: read_u64(data, 40)?,
        })
    }
}

/// Borrowed view of one record inside a data region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrHashRecord<'a> {
    /// Offset of the next record in the same chain, `0` at the end.
    pub next: u64,
    /// Cached hash of the key.
    pub hash: u64,
    /// Raw value payload.
    pub value: &'a [u8],
    /// Raw key bytes.
    pub key: &'a [u8],
}

impl<'a> StrHashRecord<'a> {
    /// Decodes the record starting at `offset` within `data`.
    ///
    /// Returns `None` if any part of the record falls outside `data`.
    pub fn parse(data: &'a [u8], offset: u64, value_size: usize) -> Option<Self> {
        let start = usize::try_from(offset).ok()?;
        let next = read_u64(data, start)?;
        let hash = read_u64(data, start.checked_add(8)?)?;
        let value_start = start.checked_add(16)?;
        let value_end = value_start.checked_add(value_size)?;
        let value = data.get(value_start..value_end)?;
        let key_size = read_u32(data, value_end)? as usize;
        let key_start = value_end + 4;
        let key = data.get(key_start..key_start.checked_add(key_size)?)?;
        Some(Self {
            next,
            hash,
            value,
            key,
        })
    }

    /// Bytes occupied by this record in the data region.
    pub fn total_size(&self) -> usize {
        record_size(self.value.len(), self.key.len())
    }

    /// Writes a record into the front of `out` and returns its size.
    ///
    /// `out` must hold at least [`record_size`] bytes and `key` must fit in a `u32`.
    pub fn write(out: &mut [u8], next: u64, hash: u64, value: &[u8], key: &[u8]) -> usize {
        let value_end = 16 + value.len();
        let key_start = value_end + 4;
        out[0..8].copy_from_slice(&next.to_ne_bytes());
        out[8..16].copy_from_slice(&hash.to_ne_bytes());
        out[16..value_end].copy_from_slice(value);
        out[value_end..key_start].copy_from_slice(&(key.len() as u32).to_ne_bytes());
        out[key_start..key_start + key.len()].copy_from_slice(key);
        key_start + key.len()
    }
}

pub(crate) fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    let bytes = data.get(offset..offset.checked_add(8)?)?;
    Some(u64::from_ne_bytes(bytes.try_into().ok()?))
}

pub(crate) fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_ne_bytes(bytes.try_into().ok()?))
}

/// Summary returned by [`StrHashBuilder`](crate::StrHashBuilder) builds.
#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct StrHashInfo {
    /// Final length of the buffer in bytes.
    pub total_length: u64,
    /// Number of records written.
    pub entry_count: u64,
    /// Number of buckets allocated.
    pub index_count: u64,
    /// Length of the data region, including the leading padding.
    pub data_length: u64,
    /// Size in bytes of each value payload.
    pub value_size: u32,
    /// Number of buckets whose chain is empty.
    pub empty_buckets: u64,
    /// Length of the longest chain.
    pub max_chain_length: u64,
}
