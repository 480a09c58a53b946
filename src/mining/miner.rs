//! Proof-of-work nonce search
//!
//! The search grinds nonces from zero until the block hash satisfies the
//! difficulty. It is meant to run on a blocking thread and polls a
//! cancellation predicate every [`CANCEL_CHECK_INTERVAL`] nonces, so a
//! tip change can abandon work whose result could no longer extend the
//! chain.

use crate::core::block::{block_hash, Block};
use crate::core::transaction::Transaction;
use crate::crypto::meets_difficulty;

/// How often (in nonces) the search polls for cancellation
pub const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// A nonce satisfying the difficulty, with the hash it produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowSolution {
    pub nonce: u64,
    pub hash: String,
}

/// Result of a mining attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MineOutcome {
    /// A block was mined and committed
    Mined { block: Block },
    /// Nothing was mined; `reason` says why
    Skipped { reason: &'static str },
}

/// Searches nonces from zero for a hash meeting `difficulty`. Returns
/// `None` when `cancelled` reports true at a poll point or the nonce
/// space is exhausted.
pub fn search(
    index: u64,
    timestamp: i64,
    prev_hash: &str,
    txs: &[Transaction],
    difficulty: u32,
    cancelled: impl Fn() -> bool,
) -> Option<PowSolution> {
    let mut nonce: u64 = 0;
    loop {
        if nonce % CANCEL_CHECK_INTERVAL == 0 && cancelled() {
            return None;
        }
        let hash = block_hash(index, timestamp, prev_hash, nonce, txs);
        if meets_difficulty(&hash, difficulty) {
            return Some(PowSolution { nonce, hash });
        }
        nonce = nonce.checked_add(1)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::Ledger;
    use crate::storage::Store;
    use std::sync::Arc;

    #[test]
    fn test_search_finds_valid_solution() {
        let solution = search(2, 1000, "aa", &[], 1, || false).unwrap();
        assert!(solution.hash.starts_with('0'));
        assert_eq!(solution.hash, block_hash(2, 1000, "aa", solution.nonce, &[]));
    }

    #[test]
    fn test_search_polls_cancellation_before_hashing() {
        // Even at difficulty 0, a cancellation observed at nonce 0 wins
        assert_eq!(search(2, 1000, "aa", &[], 0, || true), None);
    }

    #[test]
    fn test_search_is_deterministic() {
        let a = search(2, 1000, "aa", &[], 1, || false).unwrap();
        let b = search(2, 1000, "aa", &[], 1, || false).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_mined_block_passes_validation() {
        let store = Arc::new(Store::temporary().unwrap());
        let ledger = Ledger::new(store, 1);
        ledger.ensure_genesis().unwrap();
        let tip = ledger.tip().unwrap();

        let txs = vec![Transaction::new("alice", "posts", "hello")];
        let timestamp = tip.timestamp + 1000;
        let solution = search(tip.index + 1, timestamp, &tip.hash, &txs, 1, || false).unwrap();

        let block = Block::new(tip.index + 1, timestamp, tip.hash.clone(), solution.nonce, txs);
        assert_eq!(block.hash, solution.hash);
        ledger.commit(&block).unwrap();
        assert_eq!(ledger.height().unwrap(), 2);
    }
}
