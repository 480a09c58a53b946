//! Chainfeed CLI application
//!
//! Runs a gossip-replicated proof-of-work social ledger node, mints
//! signing keypairs, and verifies stored chains offline.

use chainfeed::api::create_router;
use chainfeed::core::Ledger;
use chainfeed::crypto;
use chainfeed::network::{spawn_exchange_loop, spawn_sync_loop, HttpTransport};
use chainfeed::node::{Node, NodeConfig};
use chainfeed::storage::Store;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "chainfeed")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "A proof-of-work social ledger node with gossip replication", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a node: HTTP API plus the sync and peer-exchange loops
    Serve {
        /// Port for the HTTP API
        #[arg(short, long, default_value = "3001")]
        port: u16,

        /// Data directory for the sled store
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,

        /// Seed peer URLs (comma-separated)
        #[arg(long)]
        peers: Option<String>,

        /// URL peers reach this node at (default http://localhost:{port})
        #[arg(long)]
        self_url: Option<String>,

        /// Proof-of-work difficulty in leading zero hex characters
        #[arg(long, default_value = "4")]
        difficulty: u32,

        /// Peers targeted per gossip broadcast; 0 targets every peer
        #[arg(long, default_value = "2")]
        gossip_fanout: usize,

        /// Hop budget stamped on outgoing gossip envelopes
        #[arg(long, default_value = "2")]
        gossip_ttl: u32,

        /// Seconds between anti-entropy rounds
        #[arg(long, default_value = "10")]
        sync_interval_secs: u64,

        /// Seconds between peer-exchange rounds
        #[arg(long, default_value = "20")]
        peer_exchange_interval_secs: u64,

        /// Entries each seen-cache retains before rotating
        #[arg(long, default_value = "8192")]
        seen_cache_capacity: usize,

        /// Consecutive failures before a peer is evicted; 0 disables eviction
        #[arg(long, default_value = "5")]
        peer_failure_threshold: u32,
    },

    /// Mint an Ed25519 keypair for signing clients
    Keygen,

    /// Walk a stored chain offline and re-check every link
    Verify {
        /// Data directory for the sled store
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,

        /// Difficulty the chain was mined at
        #[arg(long, default_value = "4")]
        difficulty: u32,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            data_dir,
            peers,
            self_url,
            difficulty,
            gossip_fanout,
            gossip_ttl,
            sync_interval_secs,
            peer_exchange_interval_secs,
            seen_cache_capacity,
            peer_failure_threshold,
        } => {
            let peers: Vec<String> = peers
                .map(|p| {
                    p.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            let self_url = self_url.unwrap_or_else(|| format!("http://localhost:{}", port));

            run_serve(NodeConfig {
                port,
                data_dir,
                self_url,
                peers,
                difficulty,
                gossip_fanout,
                gossip_ttl,
                sync_interval_secs,
                peer_exchange_interval_secs,
                seen_cache_capacity,
                peer_failure_threshold,
            })
        }

        Commands::Keygen => {
            let (secret, pubkey) = crypto::generate_keypair();
            println!("secret: {}", secret);
            println!("pubkey: {}", pubkey);
            Ok(())
        }

        Commands::Verify {
            data_dir,
            difficulty,
        } => run_verify(&data_dir, difficulty),
    }
}

fn run_serve(config: NodeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let transport = Arc::new(HttpTransport::new()?);
        let node = Node::new(config, transport).await?;

        let port = node.config().port;
        let seeds = node.peers().list().await;

        spawn_sync_loop(node.clone());
        spawn_exchange_loop(node.clone());

        let app = create_router(node);

        println!("🚀 Node listening on http://localhost:{}", port);
        if !seeds.is_empty() {
            println!("   Seed peers: {:?}", seeds);
        }

        let addr = format!("0.0.0.0:{}", port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                tokio::signal::ctrl_c().await.ok();
                println!("\n📴 Shutting down node...");
            })
            .await?;

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;

    Ok(())
}

fn run_verify(data_dir: &PathBuf, difficulty: u32) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(Store::open(data_dir)?);
    let ledger = Ledger::new(store, difficulty);

    match ledger.verify_chain() {
        Ok(height) => {
            println!("✅ Chain valid ({} blocks verified)", height);
            Ok(())
        }
        Err(err) => {
            println!("❌ Chain invalid: {}", err);
            std::process::exit(1);
        }
    }
}
