//! Anti-entropy sync and peer exchange
//!
//! Two periodic reconciliation loops back up the gossip path: block sync
//! pulls anything a rumor missed, and peer exchange spreads membership.
//! Every tick spawns its round as a detached task, so a slow round may
//! overlap the next. Per-peer failures are logged and recorded against
//! the peer book, never fatal.

use std::time::Duration;

use crate::network::client::TransportError;
use crate::node::{Node, NodeError};

/// Pulls blocks above the local height from every peer and applies the
/// ones that validate, in order. Returns the number of blocks committed.
pub async fn sync_round(node: &Node) -> usize {
    let start_height = match node.ledger().height() {
        Ok(height) => height,
        Err(e) => {
            log::warn!("sync skipped, local height unavailable: {}", e);
            return 0;
        }
    };

    let mut applied = 0;
    for peer in node.peers().list().await {
        let blocks = match node.transport().fetch_blocks_from(&peer, start_height).await {
            Ok(blocks) => blocks,
            Err(e) => {
                log::warn!("sync fetch from {} failed: {}", peer, e);
                node.peers().record_failure(&peer).await;
                continue;
            }
        };
        node.peers().record_success(&peer).await;

        for block in blocks {
            let index = block.index;
            match node.receive_block(block).await {
                Ok(()) => applied += 1,
                // Stale and competing blocks are expected here; skip
                // them and keep walking the peer's suffix
                Err(NodeError::InvalidBlock(e)) => {
                    log::debug!("sync block {} from {} rejected: {}", index, peer, e);
                }
                Err(e) => {
                    log::warn!("sync apply from {} failed: {}", peer, e);
                    break;
                }
            }
        }
    }
    applied
}

/// One peer-exchange round: pull each peer's list, push ours (plus our
/// own URL, so the remote learns us), and merge both answers
pub async fn exchange_round(node: &Node) {
    for peer in node.peers().list().await {
        match exchange_with(node, &peer).await {
            Ok(()) => node.peers().record_success(&peer).await,
            Err(e) => {
                log::warn!("peer exchange with {} failed: {}", peer, e);
                node.peers().record_failure(&peer).await;
            }
        }
    }
}

async fn exchange_with(node: &Node, peer: &str) -> Result<(), TransportError> {
    let theirs = node.transport().fetch_peers(peer).await?;
    node.peers().merge(theirs).await;

    let mut ours = node.peers().list().await;
    ours.push(node.peers().self_url().to_string());
    let returned = node.transport().exchange_peers(peer, ours).await?;
    node.peers().merge(returned).await;
    Ok(())
}

/// Spawns the periodic anti-entropy loop
pub fn spawn_sync_loop(node: Node) -> tokio::task::JoinHandle<()> {
    let interval = Duration::from_secs(node.config().sync_interval_secs);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let node = node.clone();
            tokio::spawn(async move {
                let applied = sync_round(&node).await;
                if applied > 0 {
                    log::info!("anti-entropy applied {} blocks", applied);
                }
            });
        }
    })
}

/// Spawns the periodic peer-exchange loop
pub fn spawn_exchange_loop(node: Node) -> tokio::task::JoinHandle<()> {
    let interval = Duration::from_secs(node.config().peer_exchange_interval_secs);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let node = node.clone();
            tokio::spawn(async move {
                exchange_round(&node).await;
            });
        }
    })
}
