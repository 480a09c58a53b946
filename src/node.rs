//! Node runtime
//!
//! `Node` ties the ledger, mempool, projection, and gossip state together
//! behind one cheaply cloneable handle. HTTP handlers and the background
//! loops all act through it; ledger writes funnel through a single commit
//! path so every accepted block is projected and announced exactly once.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::{watch, Mutex};

use crate::core::block::Block;
use crate::core::ledger::{Ledger, LedgerError};
use crate::core::transaction::{
    FollowPayload, LikePayload, PostPayload, RegisterPayload, Transaction, TxPayload,
};
use crate::crypto::{self, SignatureError};
use crate::mining::{search, Mempool, MineOutcome, PowSolution};
use crate::network::client::PeerTransport;
use crate::network::gossip::{self, BroadcastOpts, Envelope, GossipKind};
use crate::network::peers::PeerBook;
use crate::network::seen::SeenCache;
use crate::projection::model::{Post, User};
use crate::projection::Projection;
use crate::storage::{Store, StoreError};

/// Runtime configuration, normally assembled from the CLI
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Port the HTTP server listens on
    pub port: u16,
    /// Directory holding the sled database
    pub data_dir: PathBuf,
    /// URL peers reach this node at; never admitted to its own peer book
    pub self_url: String,
    /// Seed peer URLs
    pub peers: Vec<String>,
    /// Proof-of-work difficulty in leading zero hex characters
    pub difficulty: u32,
    /// Peers targeted per gossip broadcast; 0 targets every peer
    pub gossip_fanout: usize,
    /// Hop budget stamped on outgoing gossip envelopes
    pub gossip_ttl: u32,
    /// Seconds between anti-entropy rounds
    pub sync_interval_secs: u64,
    /// Seconds between peer-exchange rounds
    pub peer_exchange_interval_secs: u64,
    /// Entries each seen-cache retains before rotating
    pub seen_cache_capacity: usize,
    /// Consecutive failures before a peer is evicted; 0 disables eviction
    pub peer_failure_threshold: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            port: 3001,
            data_dir: PathBuf::from("data"),
            self_url: "http://localhost:3001".to_string(),
            peers: Vec::new(),
            difficulty: 4,
            gossip_fanout: 2,
            gossip_ttl: 2,
            sync_interval_secs: 10,
            peer_exchange_interval_secs: 20,
            seen_cache_capacity: 8192,
            peer_failure_threshold: 5,
        }
    }
}

/// Errors surfaced by node operations; the messages double as the HTTP
/// reason strings
#[derive(Debug, Error)]
pub enum NodeError {
    /// Gossip body that does not decode as a transaction
    #[error("bad tx")]
    BadTx,
    /// Gossip body that does not decode as a block
    #[error("bad block")]
    BadBlock,
    /// A block rejected by validation against the current tip
    #[error("invalid block")]
    InvalidBlock(#[source] LedgerError),
    /// A signed submission whose signature does not verify
    #[error("invalid signature")]
    InvalidSignature(#[from] SignatureError),
    #[error("not found")]
    NotFound,
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
    #[error("mining task failed: {0}")]
    Mining(#[from] tokio::task::JoinError),
}

impl From<LedgerError> for NodeError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Store(e) => NodeError::Store(e),
            other => NodeError::InvalidBlock(other),
        }
    }
}

/// How an ingested gossip message was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GossipOutcome {
    /// First sighting; admitted and relayed when the TTL allows
    Accepted,
    /// Already seen; acknowledged without re-admission or relay
    Duplicate,
}

/// A gossip body is either a relay envelope or a bare legacy payload
enum Ingress {
    Enveloped { payload: Value, ttl: u32, mid: String },
    Bare(Value),
}

/// One running node
#[derive(Clone)]
pub struct Node {
    config: Arc<NodeConfig>,
    ledger: Arc<Ledger>,
    mempool: Arc<Mempool>,
    projection: Arc<Projection>,
    peers: Arc<PeerBook>,
    transport: Arc<dyn PeerTransport>,
    /// Transaction IDs already admitted or relayed
    seen_txs: Arc<Mutex<SeenCache>>,
    /// Block hashes already committed or relayed
    seen_blocks: Arc<Mutex<SeenCache>>,
    /// Envelope message IDs already handled
    seen_msgs: Arc<Mutex<SeenCache>>,
    /// Chain height, published on every commit; miners watch it to
    /// abandon searches the moment the tip moves
    tip_height: Arc<watch::Sender<u64>>,
}

impl Node {
    /// Opens the store and assembles a node. Failure to open the store is
    /// the one fatal startup error; everything later degrades per peer.
    pub async fn new(
        config: NodeConfig,
        transport: Arc<dyn PeerTransport>,
    ) -> Result<Self, NodeError> {
        let store = Arc::new(Store::open(&config.data_dir)?);
        Self::with_store(config, transport, store).await
    }

    /// Assembles a node over an already opened store
    pub async fn with_store(
        config: NodeConfig,
        transport: Arc<dyn PeerTransport>,
        store: Arc<Store>,
    ) -> Result<Self, NodeError> {
        let ledger = Ledger::new(store.clone(), config.difficulty);
        ledger.ensure_genesis()?;

        let projection = Projection::new(store.clone());
        let replayed = projection.backfill()?;
        log::info!("projection ready, {} blocks replayed", replayed);

        let peers = PeerBook::new(config.self_url.clone(), config.peer_failure_threshold);
        peers.merge(config.peers.iter().cloned()).await;

        let (tip_height, _rx) = watch::channel(ledger.height()?);

        Ok(Node {
            mempool: Arc::new(Mempool::new(store)),
            seen_txs: Arc::new(Mutex::new(SeenCache::new(config.seen_cache_capacity))),
            seen_blocks: Arc::new(Mutex::new(SeenCache::new(config.seen_cache_capacity))),
            seen_msgs: Arc::new(Mutex::new(SeenCache::new(config.seen_cache_capacity))),
            config: Arc::new(config),
            ledger: Arc::new(ledger),
            projection: Arc::new(projection),
            peers: Arc::new(peers),
            transport,
            tip_height: Arc::new(tip_height),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn peers(&self) -> &PeerBook {
        &self.peers
    }

    pub fn transport(&self) -> &dyn PeerTransport {
        self.transport.as_ref()
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Mints a transaction, admits it, and gossips it to the mesh.
    /// Missing fields take the open-submission defaults.
    pub async fn submit_tx(
        &self,
        from: Option<String>,
        to: Option<String>,
        content: Option<String>,
    ) -> Result<Transaction, NodeError> {
        let tx = Transaction::new(
            from.unwrap_or_else(|| "anon".to_string()),
            to.unwrap_or_default(),
            content.unwrap_or_default(),
        );
        self.admit_and_gossip(tx).await
    }

    /// Verifies a signed submission over the digest of its core fields,
    /// then admits it like any other transaction
    pub async fn submit_signed_tx(
        &self,
        tx: Transaction,
        pubkey: &str,
        signature: &str,
    ) -> Result<Transaction, NodeError> {
        crypto::verify(&tx.digest_bytes(), pubkey, signature)?;
        self.admit_and_gossip(tx).await
    }

    async fn admit_and_gossip(&self, tx: Transaction) -> Result<Transaction, NodeError> {
        self.mempool.insert(&tx)?;
        self.seen_txs.lock().await.insert(&tx.id);
        self.broadcast(GossipKind::Tx, json!(tx), self.config.gossip_ttl, tx.id.clone())
            .await;
        Ok(tx)
    }

    // =========================================================================
    // Mining
    // =========================================================================

    /// Mines the current mempool into a block. The nonce search runs on a
    /// blocking thread and aborts as soon as the tip height moves, so a
    /// search that loses a race reports a stale tip instead of committing
    /// a fork.
    pub async fn mine(&self) -> Result<MineOutcome, NodeError> {
        let txs = self.mempool.snapshot()?;
        if txs.is_empty() {
            return Ok(MineOutcome::Skipped {
                reason: "mempool empty",
            });
        }

        let prev = self.ledger.tip()?;
        let index = prev.index + 1;
        let timestamp = chrono::Utc::now().timestamp_millis();
        let prev_hash = prev.hash;
        let difficulty = self.ledger.difficulty();
        let base_height = prev.index;
        let rx = self.tip_height.subscribe();
        let started = Instant::now();

        let solution = {
            let prev_hash = prev_hash.clone();
            let txs = txs.clone();
            tokio::task::spawn_blocking(move || {
                search(index, timestamp, &prev_hash, &txs, difficulty, || {
                    *rx.borrow() != base_height
                })
            })
            .await?
        };

        let Some(PowSolution { nonce, hash }) = solution else {
            log::info!("mining aborted, tip moved past height {}", base_height);
            return Ok(MineOutcome::Skipped {
                reason: "stale tip",
            });
        };

        let block = Block {
            index,
            timestamp,
            prev_hash,
            nonce,
            txs,
            hash,
        };
        match self.commit_block(&block).await {
            Ok(()) => {}
            Err(NodeError::InvalidBlock(err)) => {
                log::info!("mined block {} lost the commit race: {}", block.index, err);
                return Ok(MineOutcome::Skipped {
                    reason: "stale tip",
                });
            }
            Err(other) => return Err(other),
        }

        // Exactly the mined snapshot leaves the mempool; anything
        // admitted since stays pending
        let ids: Vec<String> = block.txs.iter().map(|tx| tx.id.clone()).collect();
        self.mempool.remove_ids(&ids)?;

        log::info!(
            "mined block {} ({} txs, nonce {}, {} ms)",
            block.index,
            block.txs.len(),
            block.nonce,
            started.elapsed().as_millis()
        );
        self.broadcast(
            GossipKind::Block,
            json!(block),
            self.config.gossip_ttl,
            block.hash.clone(),
        )
        .await;

        Ok(MineOutcome::Mined { block })
    }

    /// Validates a block against the tip and appends it; used by the
    /// legacy push endpoint and by anti-entropy sync
    pub async fn receive_block(&self, block: Block) -> Result<(), NodeError> {
        self.commit_block(&block).await
    }

    /// The single path every accepted block takes: append, project, mark
    /// seen, publish the new height
    async fn commit_block(&self, block: &Block) -> Result<(), NodeError> {
        self.ledger.commit(block)?;
        self.projection.apply_block(block)?;
        self.seen_blocks.lock().await.insert(&block.hash);
        self.tip_height.send_replace(block.index);
        Ok(())
    }

    // =========================================================================
    // Gossip ingestion
    // =========================================================================

    /// Handles a `/gossip/tx` body, enveloped or bare
    pub async fn receive_gossip_tx(&self, body: Value) -> Result<GossipOutcome, NodeError> {
        match Self::classify(body).ok_or(NodeError::BadTx)? {
            Ingress::Enveloped { payload, ttl, mid } => {
                let tx: Transaction =
                    serde_json::from_value(payload.clone()).map_err(|_| NodeError::BadTx)?;
                if self.seen_msgs.lock().await.observe(&mid) {
                    return Ok(GossipOutcome::Duplicate);
                }
                self.mempool.insert(&tx)?;
                self.seen_txs.lock().await.insert(&tx.id);
                if ttl > 1 {
                    self.broadcast(GossipKind::Tx, payload, ttl - 1, mid).await;
                }
                Ok(GossipOutcome::Accepted)
            }
            Ingress::Bare(payload) => {
                let tx: Transaction =
                    serde_json::from_value(payload.clone()).map_err(|_| NodeError::BadTx)?;
                if self.seen_txs.lock().await.observe(&tx.id) {
                    return Ok(GossipOutcome::Duplicate);
                }
                self.mempool.insert(&tx)?;
                // Legacy senders carry no TTL; restart the rumor at full
                // budget under the transaction's own ID
                let mid = tx.id.clone();
                self.broadcast(GossipKind::Tx, payload, self.config.gossip_ttl, mid)
                    .await;
                Ok(GossipOutcome::Accepted)
            }
        }
    }

    /// Handles a `/gossip/block` body, enveloped or bare
    pub async fn receive_gossip_block(&self, body: Value) -> Result<GossipOutcome, NodeError> {
        match Self::classify(body).ok_or(NodeError::BadBlock)? {
            Ingress::Enveloped { payload, ttl, mid } => {
                let block: Block =
                    serde_json::from_value(payload.clone()).map_err(|_| NodeError::BadBlock)?;
                if self.seen_msgs.lock().await.contains(&mid) {
                    return Ok(GossipOutcome::Duplicate);
                }
                // Marked seen only after a successful commit; a block
                // bounced here can still arrive later through sync
                self.commit_block(&block).await?;
                self.seen_msgs.lock().await.insert(&mid);
                if ttl > 1 {
                    self.broadcast(GossipKind::Block, payload, ttl - 1, mid).await;
                }
                Ok(GossipOutcome::Accepted)
            }
            Ingress::Bare(payload) => {
                let block: Block =
                    serde_json::from_value(payload.clone()).map_err(|_| NodeError::BadBlock)?;
                if self.seen_blocks.lock().await.contains(&block.hash) {
                    return Ok(GossipOutcome::Duplicate);
                }
                self.commit_block(&block).await?;
                let mid = block.hash.clone();
                self.broadcast(GossipKind::Block, payload, self.config.gossip_ttl, mid)
                    .await;
                Ok(GossipOutcome::Accepted)
            }
        }
    }

    /// Splits a wire body into envelope fields or a bare payload.
    /// Returns `None` for a malformed envelope.
    fn classify(body: Value) -> Option<Ingress> {
        if !Envelope::detect(&body) {
            return Some(Ingress::Bare(body));
        }
        let envelope: Envelope = serde_json::from_value(body).ok()?;
        Some(Ingress::Enveloped {
            payload: envelope.d,
            ttl: envelope.ttl,
            mid: envelope.mid,
        })
    }

    async fn broadcast(&self, kind: GossipKind, payload: Value, ttl: u32, mid: String) -> usize {
        gossip::broadcast(
            self.transport.as_ref(),
            &self.peers,
            payload,
            BroadcastOpts {
                kind,
                fanout: self.config.gossip_fanout,
                ttl,
                mid,
            },
        )
        .await
    }

    // =========================================================================
    // Social writes
    // =========================================================================

    /// Mints a `user_register` operation into the local mempool
    pub fn register_user(
        &self,
        handle: &str,
        display_name: Option<String>,
        pubkey: Option<String>,
    ) -> Result<Transaction, NodeError> {
        let op = TxPayload::UserRegister {
            author: Some(handle.to_string()),
            payload: RegisterPayload {
                display_name,
                pubkey,
            },
        };
        self.mint_social(handle, "users", &op)
    }

    /// Mints a top-level post
    pub fn create_post(
        &self,
        author: &str,
        text: String,
        tags: Option<Vec<String>>,
    ) -> Result<Transaction, NodeError> {
        let op = TxPayload::Post {
            author: Some(author.to_string()),
            payload: PostPayload {
                text,
                tags,
                parent_id: None,
            },
        };
        self.mint_social(author, "posts", &op)
    }

    /// Mints a reply referencing its parent post
    pub fn create_reply(
        &self,
        author: &str,
        text: String,
        parent_id: String,
    ) -> Result<Transaction, NodeError> {
        let op = TxPayload::Post {
            author: Some(author.to_string()),
            payload: PostPayload {
                text,
                tags: None,
                parent_id: Some(parent_id),
            },
        };
        self.mint_social(author, "posts", &op)
    }

    /// Mints a follow edge
    pub fn follow(&self, follower: &str, followee: String) -> Result<Transaction, NodeError> {
        let op = TxPayload::Follow {
            author: Some(follower.to_string()),
            payload: FollowPayload { followee },
        };
        self.mint_social(follower, "social", &op)
    }

    /// Mints a like edge
    pub fn like(&self, liker: &str, post_id: String) -> Result<Transaction, NodeError> {
        let op = TxPayload::Like {
            author: Some(liker.to_string()),
            payload: LikePayload { post_id },
        };
        self.mint_social(liker, "social", &op)
    }

    /// Social writes stay local until a mined block carries them; block
    /// gossip is their propagation path
    fn mint_social(&self, from: &str, to: &str, op: &TxPayload) -> Result<Transaction, NodeError> {
        let tx = Transaction::new(from, to, op.to_content());
        self.mempool.insert(&tx)?;
        Ok(tx)
    }

    // =========================================================================
    // Social reads
    // =========================================================================

    pub fn user(&self, handle: &str) -> Result<User, NodeError> {
        self.projection.get_user(handle)?.ok_or(NodeError::NotFound)
    }

    pub fn timeline(
        &self,
        handle: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Post>, NodeError> {
        Ok(self.projection.timeline(handle, limit, offset)?)
    }

    pub fn user_posts(
        &self,
        handle: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Post>, NodeError> {
        Ok(self.projection.user_posts(handle, limit, offset)?)
    }

    pub fn search_posts(
        &self,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Post>, NodeError> {
        Ok(self.projection.search(query, limit, offset)?)
    }
}
