//! REST API module
//!
//! Provides the HTTP surface of a node: ledger and mempool reads, open and
//! signed transaction submission, mining, peer management, gossip ingestion,
//! and the social projection endpoints.
//!
//! # Endpoints
//!
//! ## Node
//! - `GET /health` - Liveness probe
//! - `GET /chain` - Full chain with length
//! - `GET /mempool` - Pending transactions
//! - `POST /tx` - Submit an open transaction
//! - `POST /tx/signed` - Submit a signed transaction
//! - `POST /mine` - Mine the mempool into a block
//!
//! ## Peers and replication
//! - `GET /peers` - Known peer URLs
//! - `POST /peers` - Add a peer
//! - `POST /peers/exchange` - Swap peer lists
//! - `GET /blocks?fromHeight=N` - Blocks above a height
//! - `POST /receive-block` - Direct block push
//! - `POST /sync` - Anti-entropy round now
//!
//! ## Gossip
//! - `POST /gossip/tx` - Transaction rumor
//! - `POST /gossip/block` - Block rumor
//!
//! ## Social
//! - `POST /users/register`, `/post`, `/reply`, `/follow`, `/like` - Mint
//!   structured operations into the mempool
//! - `GET /users/{handle}`, `/timeline/{handle}`, `/user/{handle}/posts`,
//!   `/search?q=` - Query the projected graph

pub mod handlers;
pub mod routes;

pub use routes::create_router;
