//! Epidemic gossip primitives
//!
//! Messages travel in envelopes carrying a TTL, a stable message ID for
//! deduplication, and the sender's URL. Each hop forwards to a random
//! subset of its peers with the TTL decremented, so a rumor reaches the
//! whole mesh in a few hops without flooding every link. Bare payloads
//! (no envelope) remain accepted for peers speaking the older protocol.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::network::client::PeerTransport;
use crate::network::peers::PeerBook;

/// What a gossip message carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GossipKind {
    Tx,
    Block,
}

impl GossipKind {
    /// URL path segment under `/gossip/`
    pub fn path(&self) -> &'static str {
        match self {
            GossipKind::Tx => "tx",
            GossipKind::Block => "block",
        }
    }
}

/// Relay envelope wrapping a gossiped payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    /// Payload kind
    pub t: GossipKind,
    /// The payload itself (a transaction or block document)
    pub d: Value,
    /// Remaining hops; relayed while greater than 1
    pub ttl: u32,
    /// Message ID, stable across relays
    pub mid: String,
    /// URL of the node this copy came from
    pub sender: String,
}

impl Envelope {
    /// Whether a wire body is an envelope rather than a bare payload
    pub fn detect(value: &Value) -> bool {
        value.get("t").is_some() && value.get("d").is_some()
    }
}

/// Options for one broadcast
#[derive(Debug, Clone)]
pub struct BroadcastOpts {
    pub kind: GossipKind,
    /// Number of peers to target; 0 means every known peer
    pub fanout: usize,
    /// TTL stamped on the envelope; 0 sends the bare payload
    pub ttl: u32,
    /// Message ID; reused unchanged when relaying
    pub mid: String,
}

/// Picks a uniformly random subset of `fanout` peers. A fanout of zero
/// or at least the set size selects every peer.
pub fn random_subset(peers: &[String], fanout: usize) -> Vec<String> {
    if fanout == 0 || fanout >= peers.len() {
        return peers.to_vec();
    }
    let mut shuffled = peers.to_vec();
    shuffled.shuffle(&mut rand::thread_rng());
    shuffled.truncate(fanout);
    shuffled
}

/// Sends `payload` to a random subset of peers, enveloped when `ttl` is
/// positive. Failures are logged and counted against the peer; the
/// number of successful deliveries is returned.
pub async fn broadcast(
    transport: &dyn PeerTransport,
    peers: &PeerBook,
    payload: Value,
    opts: BroadcastOpts,
) -> usize {
    let targets = random_subset(&peers.list().await, opts.fanout);
    if targets.is_empty() {
        return 0;
    }

    let body = if opts.ttl > 0 {
        json!(Envelope {
            t: opts.kind,
            d: payload,
            ttl: opts.ttl,
            mid: opts.mid,
            sender: peers.self_url().to_string(),
        })
    } else {
        payload
    };

    let sends = targets
        .iter()
        .map(|peer| transport.send_gossip(peer, opts.kind, &body));
    let results = futures::future::join_all(sends).await;

    let mut delivered = 0;
    for (peer, result) in targets.iter().zip(results) {
        match result {
            Ok(()) => {
                peers.record_success(peer).await;
                delivered += 1;
            }
            Err(e) => {
                log::warn!("gossip {} to {} failed: {}", opts.kind.path(), peer, e);
                peers.record_failure(peer).await;
            }
        }
    }
    delivered
}
