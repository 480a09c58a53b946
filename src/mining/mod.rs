//! Mining module for block creation and transaction pooling

pub mod mempool;
pub mod miner;

pub use mempool::Mempool;
pub use miner::{search, MineOutcome, PowSolution, CANCEL_CHECK_INTERVAL};
