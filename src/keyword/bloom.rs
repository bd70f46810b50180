//! Fixed-width bloom filters over item ids
//!
//! Answers "possibly present" or "definitely absent". Bits are only ever
//! set by `insert`; callers that need to forget ids rebuild a fresh filter.

use super::{ROOT_BLOOM_BYTES, SHARD_BLOOM_BYTES};

/// Seeded 64-bit mixer (splitmix64 finalizer)
fn mix(value: u64, seed: u8) -> u64 {
    let mut hash = value ^ u64::from(seed);
    hash = hash.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    hash ^= hash >> 30;
    hash = hash.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    hash ^= hash >> 27;
    hash = hash.wrapping_mul(0x94d0_49bb_1331_11eb);
    hash ^= hash >> 31;
    hash
}

/// A `BYTES`-byte filter probed by `HASHES` seeded hashes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BloomFilter<const BYTES: usize, const HASHES: u8> {
    bits: [u8; BYTES],
}

/// Keyword-level filter: 2048 bits, 3 probes
pub type RootBloom = BloomFilter<ROOT_BLOOM_BYTES, 3>;

/// Per-shard summary: 256 bits, 2 probes
pub type ShardBloom = BloomFilter<SHARD_BLOOM_BYTES, 2>;

impl<const BYTES: usize, const HASHES: u8> BloomFilter<BYTES, HASHES> {
    pub const BITS: u64 = (BYTES as u64) * 8;

    pub fn new() -> Self {
        Self { bits: [0; BYTES] }
    }

    pub fn from_bytes(bits: [u8; BYTES]) -> Self {
        Self { bits }
    }

    pub fn as_bytes(&self) -> &[u8; BYTES] {
        &self.bits
    }

    pub fn insert(&mut self, item_id: u64) {
        for seed in 0..HASHES {
            let (byte, bit) = Self::position(item_id, seed);
            self.bits[byte] |= 1 << bit;
        }
    }

    pub fn might_contain(&self, item_id: u64) -> bool {
        (0..HASHES).all(|seed| {
            let (byte, bit) = Self::position(item_id, seed);
            self.bits[byte] & (1 << bit) != 0
        })
    }

    /// Filter over exactly `ids`
    pub fn rebuild<'a>(ids: impl IntoIterator<Item = &'a u64>) -> Self {
        let mut filter = Self::new();
        for id in ids {
            filter.insert(*id);
        }
        filter
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|b| *b == 0)
    }

    /// Fraction of bits set
    pub fn fill_rate(&self) -> f32 {
        let set: u32 = self.bits.iter().map(|b| b.count_ones()).sum();
        set as f32 / Self::BITS as f32
    }

    /// Standard cardinality estimate `-(m/k) * ln(1 - fill)`
    pub fn estimated_count(&self) -> u32 {
        let fill = self.fill_rate();
        if fill >= 1.0 {
            return u32::MAX;
        }
        let m = Self::BITS as f32;
        let k = f32::from(HASHES);
        (-(m / k) * (1.0 - fill).ln()).max(0.0) as u32
    }

    fn position(item_id: u64, seed: u8) -> (usize, u8) {
        let bit_index = mix(item_id, seed) % Self::BITS;
        ((bit_index / 8) as usize, (bit_index % 8) as u8)
    }
}

impl<const BYTES: usize, const HASHES: u8> Default for BloomFilter<BYTES, HASHES> {
    fn default() -> Self {
        Self::new()
    }
}
