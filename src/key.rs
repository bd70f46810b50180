//! Derived record keys
//!
//! Every record lives at `sha256(namespace || part_0 || part_1 || ...)`.
//! Links between records are never stored as raw addresses when the seeds
//! are known; they are re-derived from the seeds with the helpers below.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Size of a derived key in bytes
pub const KEY_SIZE: usize = 32;

// =============================================================================
// Namespace Tags
// =============================================================================

pub const NS_KEYWORD_ROOT: &str = "keyword_root";
pub const NS_KEYWORD_SHARD: &str = "keyword_shard";
pub const NS_PRICE_NODE: &str = "price_index";
pub const NS_PRICE_ROOT: &str = "price_index_root";
pub const NS_SALES_NODE: &str = "sales_index";
pub const NS_SALES_ROOT: &str = "sales_index_root";
pub const NS_ID_ROOT: &str = "global_id_root";
pub const NS_SELLER: &str = "seller_id";
pub const NS_ID_CHUNK: &str = "id_chunk";

/// A 32-byte record address
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key([u8; KEY_SIZE]);

impl Key {
    /// Hash a namespace tag and its context parts into a key
    pub fn derive(namespace: &str, parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(namespace.as_bytes());
        for part in parts {
            hasher.update(part);
        }
        Self(hasher.finalize().into())
    }

    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Short hex prefix for log lines
    pub fn short(&self) -> String {
        self.0[..4].iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({}..)", self.short())
    }
}

/// External identity of a seller (the registering party)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SellerKey(pub [u8; KEY_SIZE]);

impl SellerKey {
    /// Derive a seller key from a human-readable handle
    pub fn from_name(name: &str) -> Self {
        Self(*Key::derive("seller", &[name.as_bytes()]).as_bytes())
    }
}

impl fmt::Debug for SellerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0[..4].iter().map(|b| format!("{:02x}", b)).collect();
        write!(f, "SellerKey({}..)", prefix)
    }
}

// =============================================================================
// Key Recipes
// =============================================================================

pub fn keyword_root_key(keyword: &str) -> Key {
    Key::derive(NS_KEYWORD_ROOT, &[keyword.as_bytes()])
}

pub fn keyword_shard_key(keyword: &str, shard_index: u32) -> Key {
    Key::derive(
        NS_KEYWORD_SHARD,
        &[keyword.as_bytes(), &shard_index.to_le_bytes()],
    )
}

pub fn id_root_key() -> Key {
    Key::derive(NS_ID_ROOT, &[])
}

pub fn seller_state_key(seller: &SellerKey) -> Key {
    Key::derive(NS_SELLER, &[&seller.0])
}

pub fn id_chunk_key(seller: &SellerKey, chunk_index: u32) -> Key {
    Key::derive(NS_ID_CHUNK, &[&seller.0, &chunk_index.to_le_bytes()])
}
