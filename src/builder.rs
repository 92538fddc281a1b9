use std::borrow::Borrow;
use std::collections::HashSet;
use std::hash::BuildHasher;
use std::io::{Error, ErrorKind, Result};

use bytemuck::Pod;

use crate::{
    BUCKET_SIZE, DATA_PADDING, HEADER_SIZE, StrHashHeader, StrHashInfo, StrHashRecord,
    StrHashState, StrHashWriter, hash_key, record_size,
};

/// Builder type for encoding a key-value mapping into a single buffer.
///
/// Keys are arbitrary byte strings (anything implementing `AsRef<[u8]>`) and
/// values are fixed-size plain data (`bytemuck::Pod`). The resulting buffer is
/// the data structure itself: attach it with
/// [`StrHashTable`](crate::StrHashTable) to perform lookups without
/// deserialization.
///
/// The hash state type parameter `S` must match the one used by the table
/// that later reads the buffer.
#[derive(Debug, Clone)]
pub struct StrHashBuilder<S: BuildHasher = StrHashState> {
    hasher: S,
    check_unique_keys: bool,
}

impl<S: BuildHasher + Default> Default for StrHashBuilder<S> {
    fn default() -> Self {
        Self {
            hasher: S::default(),
            check_unique_keys: false,
        }
    }
}

impl StrHashBuilder {
    /// Creates a new builder using the default hash state.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        <Self as Default>::default()
    }
}

impl<S: BuildHasher> StrHashBuilder<S> {
    /// Replaces the hash state used to place keys into buckets.
    ///
    /// Tables attached to the output must be created with an equivalent state.
    pub fn with_hasher<T: BuildHasher>(self, hasher: T) -> StrHashBuilder<T> {
        StrHashBuilder {
            hasher,
            check_unique_keys: self.check_unique_keys,
        }
    }

    /// Rejects inputs containing the same key twice.
    ///
    /// Off by default: callers usually feed a map, which already guarantees
    /// uniqueness, and the check costs an extra pass over all keys.
    pub fn with_unique_keys_check(mut self, value: bool) -> Self {
        self.check_unique_keys = value;
        self
    }

    /// Consumes the builder and encodes `entries` into a new buffer.
    ///
    /// # Examples
    ///
    /// ```
    /// use strhash::{StrHashBuilder, StrHashTable};
    ///
    /// # fn main() -> std::io::Result<()> {
    /// let buffer = StrHashBuilder::default().build([("it", 1u32), ("works", 2u32)].iter())?;
    /// let table = StrHashTable::<u32>::attached(&buffer)?;
    /// assert_eq!(table.search("works"), Some(2));
    /// # Ok(())
    /// # }
    /// ```
    pub fn build<K, V>(
        self,
        entries: impl IntoIterator<Item = impl Borrow<(K, V)>>,
    ) -> Result<Vec<u8>>
    where
        K: AsRef<[u8]>,
        V: Pod,
    {
        let mut buffer = Vec::new();
        self.build_into(&mut buffer, entries)?;
        Ok(buffer)
    }

    /// Consumes the builder and writes the encoded buffer at offset 0 of `writer`.
    pub fn build_to<W, K, V>(
        self,
        writer: &W,
        entries: impl IntoIterator<Item = impl Borrow<(K, V)>>,
    ) -> Result<StrHashInfo>
    where
        W: StrHashWriter,
        K: AsRef<[u8]>,
        V: Pod,
    {
        let mut buffer = Vec::new();
        let info = self.build_into(&mut buffer, entries)?;
        writer.write_at(&buffer, 0)?;
        Ok(info)
    }

    /// Consumes the builder and encodes `entries` into `buffer`.
    ///
    /// Any previous content of `buffer` is discarded. Records are appended in
    /// iteration order and each new record becomes the head of its bucket's
    /// chain. A [`StrHashInfo`] summary is returned on success.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a key is longer than `u32::MAX` bytes, if the
    /// value type is larger than `u32::MAX` bytes, if the layout does not fit
    /// in memory, or (with [`with_unique_keys_check`](Self::with_unique_keys_check))
    /// if a key appears twice.
    pub fn build_into<K, V>(
        self,
        buffer: &mut Vec<u8>,
        entries: impl IntoIterator<Item = impl Borrow<(K, V)>>,
    ) -> Result<StrHashInfo>
    where
        K: AsRef<[u8]>,
        V: Pod,
    {
        let entries: Vec<_> = entries.into_iter().collect();
        let value_size = std::mem::size_of::<V>();
        let declared_value_size = u32::try_from(value_size).map_err(|_| {
            Error::new(
                ErrorKind::InvalidInput,
                format!("Value size {} exceeds u32::MAX", value_size),
            )
        })?;

        let mut data_length = DATA_PADDING;
        for entry in &entries {
            let (key, _): &(K, V) = entry.borrow();
            let key = key.as_ref();
            if u32::try_from(key.len()).is_err() {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    format!("Key length {} exceeds u32::MAX", key.len()),
                ));
            }
            data_length += record_size(value_size, key.len()) as u64;
        }

        if self.check_unique_keys {
            let mut seen = HashSet::with_capacity(entries.len());
            for entry in &entries {
                let (key, _): &(K, V) = entry.borrow();
                if !seen.insert(key.as_ref()) {
                    return Err(Error::new(
                        ErrorKind::InvalidInput,
                        format!("Duplicate key: {:?}", String::from_utf8_lossy(key.as_ref())),
                    ));
                }
            }
        }

        let header = StrHashHeader::new(declared_value_size, entries.len() as u64, data_length);
        let total_length = header
            .total_length()
            .and_then(|length| usize::try_from(length).ok())
            .ok_or_else(|| Error::new(ErrorKind::InvalidInput, "Layout does not fit in memory"))?;

        buffer.clear();
        buffer.resize(total_length, 0);
        buffer[..HEADER_SIZE].copy_from_slice(&header.encode());

        let index_count = header.index_count as usize;
        let mask = header.index_count - 1;
        let mut heads = vec![0u64; index_count];
        let mut chain_lengths = vec![0u64; index_count];

        let (head, data) = buffer.split_at_mut(header.data_offset as usize);
        let mut cursor = DATA_PADDING as usize;
        for entry in &entries {
            let (key, value): &(K, V) = entry.borrow();
            let key = key.as_ref();
            let hash = hash_key(&self.hasher, key);
            let bucket = (hash & mask) as usize;
            let written = StrHashRecord::write(
                &mut data[cursor..],
                heads[bucket],
                hash,
                bytemuck::bytes_of(value),
                key,
            );
            heads[bucket] = cursor as u64;
            chain_lengths[bucket] += 1;
            cursor += written;
        }
        assert_eq!(
            cursor as u64, data_length,
            "records must exactly fill the data region"
        );

        let index = &mut head[header.index_offset as usize..];
        for (slot, offset) in index.chunks_exact_mut(BUCKET_SIZE).zip(&heads) {
            slot.copy_from_slice(&offset.to_ne_bytes());
        }

        let info = StrHashInfo {
            total_length: total_length as u64,
            entry_count: header.data_count,
            index_count: header.index_count,
            data_length: header.data_length,
            value_size: header.value_size,
            empty_buckets: chain_lengths.iter().filter(|&&n| n == 0).count() as u64,
            max_chain_length: chain_lengths.iter().copied().max().unwrap_or(0),
        };
        tracing::debug!(
            entries = header.data_count,
            buckets = header.index_count,
            empty_buckets = info.empty_buckets,
            max_chain_length = info.max_chain_length,
            total_length = info.total_length,
            "built strhash buffer"
        );
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::hash::{BuildHasher, Hasher};

    use crate::*;

    /// Hashes every key to the same value.
    #[derive(Default)]
    struct ConstantHasher;

    impl Hasher for ConstantHasher {
        fn finish(&self) -> u64 {
            7
        }

        fn write(&mut self, _bytes: &[u8]) {}
    }

    #[derive(Default)]
    struct ConstantState;

    impl BuildHasher for ConstantState {
        type Hasher = ConstantHasher;

        fn build_hasher(&self) -> Self::Hasher {
            ConstantHasher
        }
    }

    fn read_u64_at(buffer: &[u8], offset: usize) -> u64 {
        u64::from_ne_bytes(buffer[offset..offset + 8].try_into().unwrap())
    }

    #[test]
    fn test_build_layout() {
        let mut map = BTreeMap::new();
        map.insert("hello", 9i32);
        map.insert("1", 1);
        map.insert("abc", 100);
        map.insert("wew", 101);
        map.insert("sd\0fff", 102);

        let mut buffer = Vec::new();
        let info = StrHashBuilder::default()
            .build_into(&mut buffer, map.iter().map(|(k, v)| (*k, *v)))
            .unwrap();

        let header = StrHashHeader::decode(&buffer).unwrap();
        assert_eq!(info.entry_count, header.data_count);
        assert_eq!(info.index_count, header.index_count);
        assert_eq!(info.data_length, header.data_length);
        assert_eq!(info.value_size, header.value_size);
        assert_eq!(header.magic, MAGIC);
        assert_eq!(header.value_size, 4);
        assert_eq!(header.index_offset, HEADER_SIZE as u64);
        assert_eq!(header.index_count, 8);
        assert_eq!(header.data_offset, HEADER_SIZE as u64 + 8 * 8);
        assert_eq!(header.data_count, 5);
        let key_bytes: u64 = map.keys().map(|k| k.len() as u64).sum();
        assert_eq!(header.data_length, 16 + 5 * 24 + key_bytes);
        assert_eq!(info.total_length, buffer.len() as u64);
        assert_eq!(
            info.total_length,
            header.data_offset + header.data_length
        );

        // Reserved header bytes and the data padding are zero.
        assert!(buffer[48..HEADER_SIZE].iter().all(|&b| b == 0));
        let data_offset = header.data_offset as usize;
        assert!(buffer[data_offset..data_offset + 16].iter().all(|&b| b == 0));

        // Every non-empty bucket points past the padding.
        let mut occupied = 0;
        for i in 0..header.index_count as usize {
            let head = read_u64_at(&buffer, HEADER_SIZE + i * BUCKET_SIZE);
            if head != 0 {
                assert!(head >= DATA_PADDING);
                occupied += 1;
            }
        }
        assert_eq!(occupied, header.index_count - info.empty_buckets);
    }

    #[test]
    fn test_chain_order() {
        let entries = [("a", 1u32), ("b", 2u32), ("c", 3u32)];
        let buffer = StrHashBuilder::default()
            .with_hasher(ConstantState)
            .build(entries.iter())
            .unwrap();
        let header = StrHashHeader::decode(&buffer).unwrap();
        assert_eq!(header.index_count, 4);

        // All keys hash to 7, so they share bucket 7 & 3 = 3.
        for i in 0..3 {
            assert_eq!(read_u64_at(&buffer, HEADER_SIZE + i * BUCKET_SIZE), 0);
        }
        let data = &buffer[header.data_offset as usize..];
        let record_size = record_size(4, 1) as u64;
        let head = read_u64_at(&buffer, HEADER_SIZE + 3 * BUCKET_SIZE);
        assert_eq!(head, DATA_PADDING + 2 * record_size);

        // The most recently appended record heads the chain.
        let c = StrHashRecord::parse(data, head, 4).unwrap();
        assert_eq!(c.key, b"c");
        assert_eq!(c.hash, 7);
        assert_eq!(c.next, DATA_PADDING + record_size);
        let b = StrHashRecord::parse(data, c.next, 4).unwrap();
        assert_eq!(b.key, b"b");
        assert_eq!(b.next, DATA_PADDING);
        let a = StrHashRecord::parse(data, b.next, 4).unwrap();
        assert_eq!(a.key, b"a");
        assert_eq!(a.value, &1u32.to_ne_bytes());
        assert_eq!(a.next, 0);
    }

    #[test]
    fn test_build_empty() {
        let entries: Vec<(String, u64)> = vec![];
        let mut buffer = vec![1, 2, 3];
        let info = StrHashBuilder::default()
            .build_into(&mut buffer, entries.iter())
            .unwrap();
        assert_eq!(info.index_count, 2);
        assert_eq!(info.entry_count, 0);
        assert_eq!(info.data_length, DATA_PADDING);
        assert_eq!(info.empty_buckets, 2);
        assert_eq!(info.max_chain_length, 0);
        assert_eq!(buffer.len(), HEADER_SIZE + 2 * BUCKET_SIZE + 16);
    }

    #[test]
    fn test_bucket_sizing() {
        for (count, expected) in [(15u64, 16u64), (16, 32), (18, 32), (1, 2)] {
            let entries = (0..count).map(|i| (i.to_string(), i));
            let buffer = StrHashBuilder::default().build(entries).unwrap();
            let header = StrHashHeader::decode(&buffer).unwrap();
            assert_eq!(header.index_count, expected, "count = {}", count);
        }
    }

    #[test]
    fn test_unique_keys_check() {
        let entries = [("dup", 1u8), ("other", 2u8), ("dup", 3u8)];
        let err = StrHashBuilder::default()
            .with_unique_keys_check(true)
            .build(entries.iter())
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);

        // Without the check the input is accepted as is.
        StrHashBuilder::default().build(entries.iter()).unwrap();

        let entries = [("a", 1u8), ("b", 2u8)];
        StrHashBuilder::default()
            .with_unique_keys_check(true)
            .build(entries.iter())
            .unwrap();
    }

    #[test]
    fn test_deterministic_output() {
        let entries: Vec<(Vec<u8>, u64)> = (0..1000u64)
            .map(|i| (format!("key-{}", i).into_bytes(), i * 3))
            .collect();
        let a = StrHashBuilder::default().build(entries.iter()).unwrap();
        let b = StrHashBuilder::default().build(entries.iter()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_info_json() {
        let mut buffer = Vec::new();
        let info = StrHashBuilder::default()
            .build_into(&mut buffer, [("x", 1u16)].iter())
            .unwrap();
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["entry_count"], 1);
        assert_eq!(json["value_size"], 2);
        assert_eq!(json["index_count"], 2);
        assert_eq!(json["data_length"], DATA_PADDING + 20 + 2 + 1);
        assert_eq!(json["total_length"], buffer.len() as u64);
        assert_eq!(json["max_chain_length"], 1);
    }
}
