//! Peer membership for HTTP gossip
//!
//! Tracks peer base URLs together with consecutive-failure counts. A
//! peer is evicted once its failures reach the configured threshold and
//! re-admitted the next time another peer mentions it; any successful
//! exchange resets the count. The node's own URL is never admitted, so
//! merged peer lists can safely include the sender.

use std::collections::HashMap;

use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
struct PeerEntry {
    failures: u32,
}

/// Known peers, keyed by base URL
pub struct PeerBook {
    self_url: String,
    /// Consecutive failures that trigger eviction; 0 disables eviction
    failure_threshold: u32,
    peers: RwLock<HashMap<String, PeerEntry>>,
}

impl PeerBook {
    pub fn new(self_url: impl Into<String>, failure_threshold: u32) -> Self {
        Self {
            self_url: self_url.into(),
            failure_threshold,
            peers: RwLock::new(HashMap::new()),
        }
    }

    /// This node's own advertised URL
    pub fn self_url(&self) -> &str {
        &self.self_url
    }

    /// Admits a peer URL. Returns false for the node's own URL, empty
    /// strings, and peers already known.
    pub async fn add(&self, addr: &str) -> bool {
        if addr.is_empty() || addr == self.self_url {
            return false;
        }
        let mut peers = self.peers.write().await;
        if peers.contains_key(addr) {
            return false;
        }
        peers.insert(addr.to_string(), PeerEntry::default());
        log::info!("added peer {}", addr);
        true
    }

    /// Admits every new URL from `addrs`, returning how many were new
    pub async fn merge(&self, addrs: impl IntoIterator<Item = String>) -> usize {
        let mut added = 0;
        for addr in addrs {
            if self.add(&addr).await {
                added += 1;
            }
        }
        added
    }

    /// Known peer URLs, sorted for stable output
    pub async fn list(&self) -> Vec<String> {
        let peers = self.peers.read().await;
        let mut list: Vec<String> = peers.keys().cloned().collect();
        list.sort();
        list
    }

    pub async fn contains(&self, addr: &str) -> bool {
        self.peers.read().await.contains_key(addr)
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Resets the failure count after a successful interaction
    pub async fn record_success(&self, addr: &str) {
        let mut peers = self.peers.write().await;
        if let Some(entry) = peers.get_mut(addr) {
            entry.failures = 0;
        }
    }

    /// Bumps the failure count, evicting the peer at the threshold
    pub async fn record_failure(&self, addr: &str) {
        let mut peers = self.peers.write().await;
        if let Some(entry) = peers.get_mut(addr) {
            entry.failures += 1;
            if self.failure_threshold > 0 && entry.failures >= self.failure_threshold {
                peers.remove(addr);
                log::warn!(
                    "evicted peer {} after {} consecutive failures",
                    addr,
                    self.failure_threshold
                );
            }
        }
    }
}
