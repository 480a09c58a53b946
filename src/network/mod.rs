//! Peer networking
//!
//! HTTP-based peer plumbing: the outbound transport client, the peer
//! book with liveness tracking, epidemic gossip with bounded seen-caches,
//! and the periodic anti-entropy and peer-exchange loops.

pub mod client;
pub mod gossip;
pub mod peers;
pub mod seen;
pub mod sync;

pub use client::{HttpTransport, PeerTransport, TransportError};
pub use gossip::{broadcast, random_subset, BroadcastOpts, Envelope, GossipKind};
pub use peers::PeerBook;
pub use seen::SeenCache;
pub use sync::{exchange_round, spawn_exchange_loop, spawn_sync_loop, sync_round};
