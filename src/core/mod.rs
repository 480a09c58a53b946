//! Core ledger components
//!
//! This module contains the fundamental building blocks:
//! - Transactions (free-form envelopes with optional structured content)
//! - Blocks (hash-linked, proof of work)
//! - Ledger (validation and the single conditional-append commit path)

pub mod block;
pub mod ledger;
pub mod transaction;

pub use block::{block_hash, Block, GENESIS_INDEX, GENESIS_PREV_HASH};
pub use ledger::{Ledger, LedgerError};
pub use transaction::{
    FollowPayload, LikePayload, ParsedContent, PostPayload, RegisterPayload, Transaction, TxPayload,
};
