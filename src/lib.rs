//! Chainfeed: a proof-of-work social ledger node
//!
//! This crate implements a small peer-to-peer ledger whose transactions
//! carry social operations, featuring:
//! - Hash-linked proof-of-work blocks over canonical JSON digests
//! - Epidemic gossip with TTL envelopes and bounded seen-caches
//! - Pull-based anti-entropy sync and periodic peer exchange
//! - A deterministic social projection: users, posts, follows, likes,
//!   and hashtag search derived purely from committed blocks
//! - Ed25519-signed transaction submission
//! - sled-backed persistence for the chain, mempool, and read model
//!
//! # Example
//!
//! ```rust
//! use chainfeed::core::Ledger;
//! use chainfeed::projection::extract_tags;
//! use chainfeed::storage::Store;
//! use std::sync::Arc;
//!
//! // Open a throwaway store and bootstrap the chain
//! let store = Arc::new(Store::temporary()?);
//! let ledger = Ledger::new(store, 4);
//! ledger.ensure_genesis()?;
//! assert_eq!(ledger.height()?, 1);
//!
//! // Hashtags are extracted the same way on every node
//! assert_eq!(extract_tags("gm #Rust"), vec!["rust"]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod api;
pub mod core;
pub mod crypto;
pub mod mining;
pub mod network;
pub mod node;
pub mod projection;
pub mod storage;

// Re-export commonly used types
pub use crate::api::create_router;
pub use crate::core::{Block, Ledger, LedgerError, Transaction};
pub use crate::mining::{search, Mempool, MineOutcome};
pub use crate::network::{HttpTransport, PeerBook, PeerTransport, SeenCache};
pub use crate::node::{GossipOutcome, Node, NodeConfig, NodeError};
pub use crate::projection::{extract_tags, Post, Projection, User};
pub use crate::storage::{Store, StoreError};
