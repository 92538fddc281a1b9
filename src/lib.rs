//! Read-only, string-keyed hash tables serialized into a single contiguous buffer.
//!
//! The `strhash` crate encodes a key-value mapping once with [`StrHashBuilder`]
//! and lets any number of readers attach a [`StrHashTable`] to the resulting
//! bytes without deserialization: the buffer itself is the data structure.
//! Keys are arbitrary byte strings; values are fixed-size plain data types
//! implementing [`bytemuck::Pod`]. All links inside the buffer are offsets, so
//! it can be copied, persisted and memory-mapped freely.
//!
//! The value size is recorded in the header and checked on attach. Buffers use
//! the host's native byte order and are not portable across endianness.
//!
//! ```
//! use strhash::{StrHashBuilder, StrHashTable};
//!
//! # fn main() -> std::io::Result<()> {
//! let entries = [("apple", 1u32), ("banana", 2u32)];
//! let buffer = StrHashBuilder::default().build(entries.iter())?;
//!
//! let mut table = StrHashTable::<u32>::new();
//! table.attach(&buffer)?;
//! assert_eq!(table.search("banana"), Some(2));
//! assert_eq!(table.search("cherry"), None);
//! # Ok(())
//! # }
//! ```

/// Format tag stored in the first four bytes of every buffer.
pub const MAGIC: u32 = 0x1234_abcd;

/// Seed of the default hash state used by builders and tables.
pub const HASH_SEED: u64 = 0xfeef_feef;

mod hasher;
pub use hasher::{StrHashState, hash_key};

mod meta;
pub use meta::{
    BUCKET_SIZE, DATA_PADDING, HEADER_SIZE, RECORD_FIXED_SIZE, StrHashHeader, StrHashInfo,
    StrHashRecord, index_count_for, record_size,
};

mod reader;
pub use reader::{StrHashReader, load_buffer};

mod writer;
pub use writer::StrHashWriter;

mod table;
pub use table::{StrHashIter, StrHashTable};

mod builder;
pub use builder::StrHashBuilder;
