//! HTTP client for peer RPCs
//!
//! Outbound calls go through the [`PeerTransport`] trait so protocol
//! logic never touches HTTP directly; tests substitute a scripted
//! implementation. The real implementation shares one reqwest client
//! with connect and request timeouts, since gossip rounds fan out to
//! peers that may be unreachable.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::block::Block;
use crate::network::gossip::GossipKind;

/// Errors talking to a peer
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("peer returned status {status}: {url}")]
    Status { url: String, status: u16 },
}

/// Outbound peer RPCs used by gossip, sync, and peer exchange
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// GET `/peers`
    async fn fetch_peers(&self, addr: &str) -> Result<Vec<String>, TransportError>;

    /// POST `/peers/exchange`, returning the remote's merged list
    async fn exchange_peers(
        &self,
        addr: &str,
        peers: Vec<String>,
    ) -> Result<Vec<String>, TransportError>;

    /// GET `/blocks?fromHeight=`, returning blocks above `height`
    async fn fetch_blocks_from(
        &self,
        addr: &str,
        height: u64,
    ) -> Result<Vec<Block>, TransportError>;

    /// POST `/gossip/tx` or `/gossip/block`
    async fn send_gossip(
        &self,
        addr: &str,
        kind: GossipKind,
        body: &Value,
    ) -> Result<(), TransportError>;
}

#[derive(Deserialize)]
struct PeerListBody {
    #[serde(default)]
    peers: Vec<String>,
}

#[derive(Deserialize)]
struct BlockListBody {
    #[serde(default)]
    blocks: Vec<Block>,
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client })
    }

    fn check_status(url: String, status: reqwest::StatusCode) -> Result<(), TransportError> {
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Status {
                url,
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn fetch_peers(&self, addr: &str) -> Result<Vec<String>, TransportError> {
        let url = format!("{}/peers", addr);
        let resp = self.client.get(&url).send().await?;
        Self::check_status(url, resp.status())?;
        let body: PeerListBody = resp.json().await?;
        Ok(body.peers)
    }

    async fn exchange_peers(
        &self,
        addr: &str,
        peers: Vec<String>,
    ) -> Result<Vec<String>, TransportError> {
        let url = format!("{}/peers/exchange", addr);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "peers": peers }))
            .send()
            .await?;
        Self::check_status(url, resp.status())?;
        let body: PeerListBody = resp.json().await?;
        Ok(body.peers)
    }

    async fn fetch_blocks_from(
        &self,
        addr: &str,
        height: u64,
    ) -> Result<Vec<Block>, TransportError> {
        let url = format!("{}/blocks?fromHeight={}", addr, height);
        let resp = self.client.get(&url).send().await?;
        Self::check_status(url, resp.status())?;
        let body: BlockListBody = resp.json().await?;
        Ok(body.blocks)
    }

    async fn send_gossip(
        &self,
        addr: &str,
        kind: GossipKind,
        body: &Value,
    ) -> Result<(), TransportError> {
        let url = format!("{}/gossip/{}", addr, kind.path());
        let resp = self.client.post(&url).json(body).send().await?;
        Self::check_status(url, resp.status())
    }
}

#[cfg(test)]
pub mod testing {
    //! Scripted transport for protocol tests

    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// In-memory transport: returns scripted peer lists and chains,
    /// records every gossip send and peer exchange, and fails on demand
    #[derive(Default)]
    pub struct ScriptedTransport {
        /// Peer list served per address (both fetch and exchange)
        pub peer_lists: Mutex<HashMap<String, Vec<String>>>,
        /// Full chain served per address; `fetch_blocks_from` filters it
        pub chains: Mutex<HashMap<String, Vec<Block>>>,
        /// Addresses that fail every call
        pub unreachable: Mutex<HashSet<String>>,
        /// Recorded `send_gossip` calls
        pub gossip_log: Mutex<Vec<(String, GossipKind, Value)>>,
        /// Recorded `exchange_peers` calls
        pub exchange_log: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn serve_peers(&self, addr: &str, peers: Vec<String>) {
            self.peer_lists.lock().unwrap().insert(addr.into(), peers);
        }

        pub fn serve_chain(&self, addr: &str, chain: Vec<Block>) {
            self.chains.lock().unwrap().insert(addr.into(), chain);
        }

        pub fn mark_unreachable(&self, addr: &str) {
            self.unreachable.lock().unwrap().insert(addr.into());
        }

        pub fn sent_gossip(&self) -> Vec<(String, GossipKind, Value)> {
            self.gossip_log.lock().unwrap().clone()
        }

        fn check_reachable(&self, addr: &str) -> Result<(), TransportError> {
            if self.unreachable.lock().unwrap().contains(addr) {
                Err(TransportError::Status {
                    url: addr.to_string(),
                    status: 503,
                })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl PeerTransport for ScriptedTransport {
        async fn fetch_peers(&self, addr: &str) -> Result<Vec<String>, TransportError> {
            self.check_reachable(addr)?;
            Ok(self
                .peer_lists
                .lock()
                .unwrap()
                .get(addr)
                .cloned()
                .unwrap_or_default())
        }

        async fn exchange_peers(
            &self,
            addr: &str,
            peers: Vec<String>,
        ) -> Result<Vec<String>, TransportError> {
            self.check_reachable(addr)?;
            self.exchange_log
                .lock()
                .unwrap()
                .push((addr.to_string(), peers));
            Ok(self
                .peer_lists
                .lock()
                .unwrap()
                .get(addr)
                .cloned()
                .unwrap_or_default())
        }

        async fn fetch_blocks_from(
            &self,
            addr: &str,
            height: u64,
        ) -> Result<Vec<Block>, TransportError> {
            self.check_reachable(addr)?;
            Ok(self
                .chains
                .lock()
                .unwrap()
                .get(addr)
                .map(|chain| {
                    chain
                        .iter()
                        .filter(|b| b.index > height)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn send_gossip(
            &self,
            addr: &str,
            kind: GossipKind,
            body: &Value,
        ) -> Result<(), TransportError> {
            self.check_reachable(addr)?;
            self.gossip_log
                .lock()
                .unwrap()
                .push((addr.to_string(), kind, body.clone()));
            Ok(())
        }
    }
}
