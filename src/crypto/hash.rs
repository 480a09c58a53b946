//! Cryptographic hashing utilities for the ledger
//!
//! Provides SHA-256 based hashing functions used for block hashes,
//! transaction digests, and proof-of-work checks.

use sha2::{Digest, Sha256};

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes SHA-256 hash and returns it as a lowercase hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Checks if a hex-encoded hash meets the difficulty target
/// The hash must start with `difficulty` zero characters
pub fn meets_difficulty(hash_hex: &str, difficulty: u32) -> bool {
    let prefix_len = difficulty as usize;
    if hash_hex.len() < prefix_len {
        return false;
    }
    hash_hex.bytes().take(prefix_len).all(|b| b == b'0')
}
