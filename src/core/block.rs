//! Block structure and hashing
//!
//! Blocks are hash-linked: each block commits to its predecessor's hash
//! and carries a nonce whose resulting hash satisfies the proof-of-work
//! difficulty. The block hash covers the canonical serialization of
//! every field except the hash itself.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::transaction::Transaction;
use crate::crypto::{canonical_json, sha256_hex};

// =============================================================================
// Constants
// =============================================================================

/// Height of the genesis block
pub const GENESIS_INDEX: u64 = 1;

/// Previous-hash sentinel carried by the genesis block
pub const GENESIS_PREV_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

// =============================================================================
// Block
// =============================================================================

/// A block in the ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Height, starting at 1 for genesis
    pub index: u64,
    /// Creation time in Unix milliseconds
    pub timestamp: i64,
    /// Hash of the previous block (64 zeros for genesis)
    pub prev_hash: String,
    /// Proof-of-work nonce
    pub nonce: u64,
    /// Transactions committed by this block
    pub txs: Vec<Transaction>,
    /// SHA-256 hash over the canonical form of the fields above
    pub hash: String,
}

/// Computes a block hash from its constituent fields
pub fn block_hash(
    index: u64,
    timestamp: i64,
    prev_hash: &str,
    nonce: u64,
    txs: &[Transaction],
) -> String {
    let fields = json!({
        "index": index,
        "timestamp": timestamp,
        "prevHash": prev_hash,
        "nonce": nonce,
        "txs": txs,
    });
    sha256_hex(canonical_json(&fields).as_bytes())
}

impl Block {
    /// Assembles a block and computes its hash
    pub fn new(
        index: u64,
        timestamp: i64,
        prev_hash: impl Into<String>,
        nonce: u64,
        txs: Vec<Transaction>,
    ) -> Self {
        let prev_hash = prev_hash.into();
        let hash = block_hash(index, timestamp, &prev_hash, nonce, &txs);
        Block {
            index,
            timestamp,
            prev_hash,
            nonce,
            txs,
            hash,
        }
    }

    /// Recomputes the hash from the block's current fields
    pub fn compute_hash(&self) -> String {
        block_hash(
            self.index,
            self.timestamp,
            &self.prev_hash,
            self.nonce,
            &self.txs,
        )
    }

    /// Builds the genesis block; exempt from the difficulty check
    pub fn genesis(timestamp: i64) -> Self {
        let tx = Transaction {
            id: "genesis".into(),
            from: "system".into(),
            to: "system".into(),
            content: "genesis".into(),
            timestamp,
        };
        Block::new(GENESIS_INDEX, timestamp, GENESIS_PREV_HASH, 0, vec![tx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_shape() {
        let block = Block::genesis(1000);
        assert_eq!(block.index, GENESIS_INDEX);
        assert_eq!(block.prev_hash, GENESIS_PREV_HASH);
        assert_eq!(block.prev_hash.len(), 64);
        assert_eq!(block.nonce, 0);
        assert_eq!(block.txs.len(), 1);
        assert_eq!(block.txs[0].id, "genesis");
        assert_eq!(block.txs[0].from, "system");
        assert_eq!(block.hash, block.compute_hash());
    }

    #[test]
    fn test_hash_covers_nonce() {
        let block = Block::genesis(1000);
        let mut tampered = block.clone();
        tampered.nonce = 1;
        assert_ne!(block.hash, tampered.compute_hash());
    }

    #[test]
    fn test_hash_field_not_part_of_digest() {
        let block = Block::genesis(1000);
        let mut copy = block.clone();
        copy.hash = "bogus".into();
        assert_eq!(block.compute_hash(), copy.compute_hash());
    }

    #[test]
    fn test_hash_covers_transactions() {
        let txs = vec![Transaction {
            id: "t1".into(),
            from: "alice".into(),
            to: "bob".into(),
            content: "hi".into(),
            timestamp: 1,
        }];
        let a = Block::new(2, 1000, "aa", 0, txs.clone());
        let mut other_txs = txs;
        other_txs[0].content = "bye".into();
        let b = Block::new(2, 1000, "aa", 0, other_txs);
        assert_ne!(a.hash, b.hash);
    }
}
