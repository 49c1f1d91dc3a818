//! Content digests for comparing stream outputs across runs.

use blake3::Hasher;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in &self.0 {
            use std::fmt::Write as _;
            let _ = write!(&mut s, "{:02x}", b);
        }
        s
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
    let mut h = ContentHasher::new();
    h.update(bytes);
    h.finish()
}

/// Incremental digest over a sequence of chunks.
///
/// Chunk boundaries do not affect the result; only the concatenated bytes do.
#[derive(Default)]
pub struct ContentHasher {
    inner: Hasher,
    bytes: u64,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
        self.bytes += chunk.len() as u64;
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn finish(&self) -> Hash256 {
        Hash256(self.inner.finalize().into())
    }
}

/// `std::hash::Hasher` over BLAKE3.
///
/// Unlike `DefaultHasher`, the output is fixed across Rust releases, so it is
/// safe for anything persisted or compared between runs, such as shard routing.
#[derive(Default)]
pub struct StableHasher(Hasher);

impl std::hash::Hasher for StableHasher {
    fn write(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn finish(&self) -> u64 {
        let digest = self.0.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        u64::from_le_bytes(head)
    }
}

pub fn stable_hash<K: std::hash::Hash + ?Sized>(key: &K) -> u64 {
    let mut hasher = StableHasher::default();
    key.hash(&mut hasher);
    std::hash::Hasher::finish(&hasher)
}
