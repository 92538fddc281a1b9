use std::hash::{BuildHasher, Hasher};

use foldhash::fast::FixedState;

use crate::HASH_SEED;

/// Default hash state shared by builders and tables.
///
/// Wraps a `foldhash` [`FixedState`] seeded with [`HASH_SEED`], so every
/// instance produces identical hashes within the same build of the crate.
/// Buffers must be searched with the same state they were built with.
#[derive(Debug, Clone)]
pub struct StrHashState(FixedState);

impl StrHashState {
    /// Creates a state with a custom seed; both sides must agree on it.
    pub fn with_seed(seed: u64) -> Self {
        Self(FixedState::with_seed(seed))
    }
}

impl Default for StrHashState {
    fn default() -> Self {
        Self::with_seed(HASH_SEED)
    }
}

impl BuildHasher for StrHashState {
    type Hasher = <FixedState as BuildHasher>::Hasher;

    fn build_hasher(&self) -> Self::Hasher {
        self.0.build_hasher()
    }
}

/// Hashes raw key bytes with a fresh hasher from `state`.
///
/// Only the bytes themselves are written, no length prefix, so `&str`,
/// `String` and `Vec<u8>` keys with the same content hash identically.
pub fn hash_key<S: BuildHasher>(state: &S, key: &[u8]) -> u64 {
    let mut hasher = state.build_hasher();
    hasher.write(key);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StrHashBuilder, StrHashTable};

    #[test]
    fn test_default_state_is_deterministic() {
        let a = StrHashState::default();
        let b = StrHashState::default();
        for key in [&b""[..], b"hello", b"sd\0fff", &[0xffu8; 100]] {
            assert_eq!(hash_key(&a, key), hash_key(&b, key));
        }
        assert_ne!(hash_key(&a, b"hello"), hash_key(&a, b"hellp"));
    }

    #[test]
    fn test_cloned_state_matches() {
        let state = StrHashState::with_seed(7);
        let builder = StrHashBuilder::default().with_hasher(state.clone());
        let buffer = builder.build([("k", 3u8)].iter()).unwrap();
        let mut table = StrHashTable::<u8, _>::with_hasher(state);
        table.attach(&buffer).unwrap();
        assert_eq!(table.search("k"), Some(3));
    }

    #[test]
    fn test_seed_changes_hash() {
        let a = StrHashState::default();
        let b = StrHashState::with_seed(HASH_SEED + 1);
        assert_ne!(hash_key(&a, b"hello"), hash_key(&b, b"hello"));
        assert_eq!(
            hash_key(&StrHashState::with_seed(HASH_SEED), b"hello"),
            hash_key(&a, b"hello")
        );
    }
}
