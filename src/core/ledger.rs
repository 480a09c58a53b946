//! Chain state and block validation
//!
//! The ledger wraps the block tree with validation and a single commit
//! path. Every new block, whether mined locally, gossiped, pushed by a
//! peer, or pulled during sync, passes the same checks against the
//! current tip and lands through a conditional append, so concurrent
//! writers race safely and exactly one block occupies each height.

use std::sync::Arc;

use thiserror::Error;

use crate::core::block::{Block, GENESIS_INDEX, GENESIS_PREV_HASH};
use crate::crypto::meets_difficulty;
use crate::storage::{Store, StoreError};

/// Reasons a block is rejected, plus storage failures
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("non-sequential index: expected {expected}, got {got}")]
    NonSequentialIndex { expected: u64, got: u64 },
    #[error("previous hash mismatch")]
    PrevHashMismatch,
    #[error("block hash does not match its contents")]
    HashMismatch,
    #[error("hash does not meet difficulty {0}")]
    InsufficientWork(u32),
    #[error("height {0} already occupied")]
    DuplicateHeight(u64),
    #[error("chain has no blocks")]
    EmptyChain,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Validated, append-only view over the block tree
pub struct Ledger {
    store: Arc<Store>,
    difficulty: u32,
}

impl Ledger {
    pub fn new(store: Arc<Store>, difficulty: u32) -> Self {
        Ledger { store, difficulty }
    }

    /// The proof-of-work difficulty used for both mining and validation
    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Creates the genesis block when the chain is empty; idempotent
    pub fn ensure_genesis(&self) -> Result<(), LedgerError> {
        if self.store.height()? == 0 {
            let genesis = Block::genesis(chrono::Utc::now().timestamp_millis());
            if self.store.insert_block(&genesis)? {
                log::info!("created genesis block {}", genesis.hash);
            }
        }
        Ok(())
    }

    /// Height of the current tip
    pub fn height(&self) -> Result<u64, LedgerError> {
        Ok(self.store.height()?)
    }

    /// The current tip block
    pub fn tip(&self) -> Result<Block, LedgerError> {
        self.store.tip()?.ok_or(LedgerError::EmptyChain)
    }

    /// The whole chain, ascending
    pub fn chain(&self) -> Result<Vec<Block>, LedgerError> {
        Ok(self.store.chain()?)
    }

    /// Blocks above the given height, ascending
    pub fn blocks_from(&self, height: u64) -> Result<Vec<Block>, LedgerError> {
        Ok(self.store.blocks_from(height)?)
    }

    /// Checks that `candidate` extends `prev`: sequential index, matching
    /// hash link, honest self-hash, and sufficient proof-of-work
    pub fn validate_new_block(&self, prev: &Block, candidate: &Block) -> Result<(), LedgerError> {
        if candidate.index != prev.index + 1 {
            return Err(LedgerError::NonSequentialIndex {
                expected: prev.index + 1,
                got: candidate.index,
            });
        }
        if candidate.prev_hash != prev.hash {
            return Err(LedgerError::PrevHashMismatch);
        }
        if candidate.compute_hash() != candidate.hash {
            return Err(LedgerError::HashMismatch);
        }
        if !meets_difficulty(&candidate.hash, self.difficulty) {
            return Err(LedgerError::InsufficientWork(self.difficulty));
        }
        Ok(())
    }

    /// Validates against the current tip and appends. The append is
    /// conditional on the height still being vacant, so a concurrent
    /// commit at the same height fails here instead of overwriting.
    pub fn commit(&self, block: &Block) -> Result<(), LedgerError> {
        let tip = self.tip()?;
        self.validate_new_block(&tip, block)?;
        if !self.store.insert_block(block)? {
            return Err(LedgerError::DuplicateHeight(block.index));
        }
        Ok(())
    }

    /// Walks the stored chain from genesis, re-checking every link.
    /// Genesis is exempt from the difficulty check. Returns the height.
    pub fn verify_chain(&self) -> Result<u64, LedgerError> {
        let chain = self.store.chain()?;
        let first = chain.first().ok_or(LedgerError::EmptyChain)?;
        if first.index != GENESIS_INDEX {
            return Err(LedgerError::NonSequentialIndex {
                expected: GENESIS_INDEX,
                got: first.index,
            });
        }
        if first.prev_hash != GENESIS_PREV_HASH {
            return Err(LedgerError::PrevHashMismatch);
        }
        if first.compute_hash() != first.hash {
            return Err(LedgerError::HashMismatch);
        }
        for pair in chain.windows(2) {
            self.validate_new_block(&pair[0], &pair[1])?;
        }
        Ok(chain.len() as u64)
    }
}
