use std::hash::BuildHasher;
use std::io::{Error, ErrorKind, Result};
use std::marker::PhantomData;

use bytemuck::Pod;

use crate::meta::read_u64;
use crate::{
    BUCKET_SIZE, DATA_PADDING, HEADER_SIZE, MAGIC, StrHashHeader, StrHashRecord, StrHashState,
    hash_key,
};

/// Read-only hash table attached to a buffer produced by
/// [`StrHashBuilder`](crate::StrHashBuilder).
///
/// A table never owns or copies the buffer: it holds a view that is valid for
/// the lifetime `'a` of the borrowed bytes. A new table starts detached, where
/// every lookup reports absence. [`attach`](Self::attach) validates the header
/// and binds the view; [`reset`](Self::reset) drops it again.
///
/// Lookups take `&self` and have no side effects, so an attached table can be
/// shared across threads and searched concurrently.
///
/// # Type Parameters
/// - `V`: fixed-size value type; its size must match the one recorded in the buffer.
/// - `S`: hash state; must match the one the buffer was built with.
#[derive(Debug, Clone)]
pub struct StrHashTable<'a, V, S = StrHashState> {
    view: Option<StrHashView<'a>>,
    hasher: S,
    phantom: PhantomData<fn() -> V>,
}

#[derive(Debug, Clone, Copy)]
struct StrHashView<'a> {
    header: StrHashHeader,
    index: &'a [u8],
    data: &'a [u8],
    mask: u64,
}

impl<'a, V: Pod, S: BuildHasher + Default> Default for StrHashTable<'a, V, S> {
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<'a, V: Pod> StrHashTable<'a, V> {
    /// Creates a detached table using the default hash state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table and attaches it to `buffer` in one step.
    ///
    /// # Errors
    ///
    /// Fails under the same conditions as [`attach`](Self::attach).
    pub fn attached(buffer: &'a [u8]) -> Result<Self> {
        let mut table = Self::new();
        table.attach(buffer)?;
        Ok(table)
    }
}

impl<'a, V: Pod, S: BuildHasher> StrHashTable<'a, V, S> {
    /// Creates a detached table that hashes keys with `hasher`.
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            view: None,
            hasher,
            phantom: PhantomData,
        }
    }

    /// Binds the table to `buffer` without copying it.
    ///
    /// The table is detached first, so a failed attach never leaves a
    /// previous binding in place.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` when the buffer is shorter than the header, the
    /// magic number is wrong, the recorded value size differs from
    /// `size_of::<V>()`, the bucket count is not a power of two, the record
    /// count cannot fit in the data region, or the buffer is shorter than the
    /// layout the header declares.
    pub fn attach(&mut self, buffer: &'a [u8]) -> Result<()> {
        self.view = None;
        self.view = Some(Self::bind(buffer)?);
        Ok(())
    }

    fn bind(buffer: &'a [u8]) -> Result<StrHashView<'a>> {
        let header = StrHashHeader::decode(buffer).ok_or_else(|| {
            invalid_data(format!(
                "Buffer length {} is shorter than header size {}",
                buffer.len(),
                HEADER_SIZE
            ))
        })?;
        if header.magic != MAGIC {
            return Err(invalid_data(format!(
                "Invalid magic number: {:#x}",
                header.magic
            )));
        }
        let value_size = std::mem::size_of::<V>();
        if header.value_size as usize != value_size {
            return Err(invalid_data(format!(
                "Value size mismatch: buffer has {}, expected {}",
                header.value_size, value_size
            )));
        }
        if !header.index_count.is_power_of_two() {
            return Err(invalid_data(format!(
                "Bucket count {} is not a power of two",
                header.index_count
            )));
        }
        let total_length = header
            .total_length()
            .ok_or_else(|| invalid_data("Declared layout length overflows".to_string()))?;
        if (buffer.len() as u64) < total_length {
            return Err(invalid_data(format!(
                "Buffer length {} is shorter than declared length {}",
                buffer.len(),
                total_length
            )));
        }

        match header.max_record_count() {
            None => {
                return Err(invalid_data(format!(
                    "Data length {} is shorter than padding {}",
                    header.data_length, DATA_PADDING
                )));
            }
            Some(max) if header.data_count > max => {
                return Err(invalid_data(format!(
                    "Record count {} exceeds the {} records data length {} can hold",
                    header.data_count, max, header.data_length
                )));
            }
            Some(_) => {}
        }

        let index_length = header.index_count * BUCKET_SIZE as u64;
        let index = region(buffer, header.index_offset, index_length)
            .ok_or_else(|| invalid_data("Index region out of bounds".to_string()))?;
        let data = region(buffer, header.data_offset, header.data_length)
            .ok_or_else(|| invalid_data("Data region out of bounds".to_string()))?;

        tracing::debug!(
            entries = header.data_count,
            buckets = header.index_count,
            length = buffer.len(),
            "attached strhash buffer"
        );
        Ok(StrHashView {
            header,
            index,
            data,
            mask: header.index_count - 1,
        })
    }

    /// Returns true while the table is bound to a buffer.
    pub fn is_attached(&self) -> bool {
        self.view.is_some()
    }

    /// Detaches the table. The buffer itself is left untouched.
    pub fn reset(&mut self) {
        self.view = None;
    }

    /// Header of the attached buffer, for diagnostics.
    pub fn header(&self) -> Option<&StrHashHeader> {
        self.view.as_ref().map(|view| &view.header)
    }

    /// Number of entries in the attached buffer; `0` when detached.
    pub fn len(&self) -> u64 {
        self.header().map_or(0, |header| header.data_count)
    }

    /// Returns true when detached or when the attached buffer holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up the value stored for `key`.
    ///
    /// Only the chain of the key's bucket is walked. Records are rejected on
    /// the cached hash first and then on the full key bytes, so distinct keys
    /// sharing a hash are still told apart. Returns `None` when detached.
    pub fn search(&self, key: impl AsRef<[u8]>) -> Option<V> {
        let view = self.view.as_ref()?;
        let key = key.as_ref();
        let hash = hash_key(&self.hasher, key);
        let bucket = (hash & view.mask) as usize;
        let mut offset = read_u64(view.index, bucket * BUCKET_SIZE)?;

        // A well-formed chain never visits more records than the buffer holds.
        let mut remaining = view.header.data_count;
        while offset != 0 {
            if remaining == 0 {
                tracing::warn!(bucket, "chain exceeds record count, buffer is corrupted");
                return None;
            }
            remaining -= 1;

            let Some(record) =
                StrHashRecord::parse(view.data, offset, view.header.value_size as usize)
            else {
                tracing::warn!(bucket, offset, "record offset out of range");
                return None;
            };
            if record.hash == hash && record.key.len() == key.len() && record.key == key {
                return Some(bytemuck::pod_read_unaligned(record.value));
            }
            offset = record.next;
        }
        None
    }

    /// Returns true if `key` is present.
    pub fn contains_key(&self, key: impl AsRef<[u8]>) -> bool {
        self.search(key).is_some()
    }

    /// Performs multiple lookups; results preserve the order of `keys`.
    pub fn batch_search(
        &self,
        keys: impl IntoIterator<Item = impl AsRef<[u8]>>,
    ) -> Vec<Option<V>> {
        keys.into_iter().map(|key| self.search(key)).collect()
    }

    /// Creates an iterator over all records in storage order.
    ///
    /// The iterator borrows the buffer, not the table, so it stays valid
    /// after the table is reset. A detached table yields nothing.
    pub fn iter(&self) -> StrHashIter<'a, V> {
        match self.view {
            Some(view) => StrHashIter {
                data: view.data,
                offset: DATA_PADDING,
                remaining: view.header.data_count,
                phantom: PhantomData,
            },
            None => StrHashIter {
                data: &[],
                offset: DATA_PADDING,
                remaining: 0,
                phantom: PhantomData,
            },
        }
    }
}

/// Iterator over every `(key, value)` pair of an attached [`StrHashTable`].
///
/// Records are visited in the order they were appended by the builder.
pub struct StrHashIter<'a, V> {
    data: &'a [u8],
    offset: u64,
    remaining: u64,
    phantom: PhantomData<fn() -> V>,
}

impl<'a, V: Pod> Iterator for StrHashIter<'a, V> {
    type Item = (&'a [u8], V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let Some(record) = StrHashRecord::parse(self.data, self.offset, std::mem::size_of::<V>())
        else {
            tracing::warn!(offset = self.offset, "record offset out of range");
            self.remaining = 0;
            return None;
        };
        self.remaining -= 1;
        self.offset += record.total_size() as u64;
        Some((record.key, bytemuck::pod_read_unaligned(record.value)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, usize::try_from(self.remaining).ok())
    }
}

fn region(buffer: &[u8], offset: u64, length: u64) -> Option<&[u8]> {
    let start = usize::try_from(offset).ok()?;
    let end = start.checked_add(usize::try_from(length).ok()?)?;
    buffer.get(start..end)
}

fn invalid_data(message: String) -> Error {
    tracing::debug!(%message, "rejected strhash buffer");
    Error::new(ErrorKind::InvalidData, message)
}
