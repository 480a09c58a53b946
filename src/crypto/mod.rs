//! Cryptographic utilities for the ledger
//!
//! This module provides:
//! - Canonical JSON serialization for deterministic digests
//! - SHA-256 hashing and proof-of-work checks
//! - Ed25519 signature handling for signed transactions

pub mod canonical;
pub mod hash;
pub mod signature;

pub use canonical::{canonical_json, digest_hex};
pub use hash::{meets_difficulty, sha256, sha256_hex};
pub use signature::{generate_keypair, sign, verify, SignatureError};
