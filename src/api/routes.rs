//! REST API routes configuration

use crate::api::handlers;
use crate::node::Node;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

/// Create the API router with all routes
pub fn create_router(node: Node) -> Router {
    // Permissive CORS so browser clients can talk to any node directly
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Node
        .route("/health", get(handlers::health))
        .route("/chain", get(handlers::get_chain))
        .route("/mempool", get(handlers::get_mempool))
        .route("/tx", post(handlers::submit_tx))
        .route("/tx/signed", post(handlers::submit_signed_tx))
        .route("/mine", post(handlers::mine_block))
        // Peers and replication
        .route("/peers", get(handlers::get_peers))
        .route("/peers", post(handlers::add_peer))
        .route("/peers/exchange", post(handlers::exchange_peers))
        .route("/blocks", get(handlers::get_blocks))
        .route("/receive-block", post(handlers::receive_block))
        .route("/sync", post(handlers::sync_now))
        // Gossip
        .route("/gossip/tx", post(handlers::gossip_tx))
        .route("/gossip/block", post(handlers::gossip_block))
        // Social writes
        .route("/users/register", post(handlers::register_user))
        .route("/post", post(handlers::create_post))
        .route("/reply", post(handlers::create_reply))
        .route("/follow", post(handlers::follow_user))
        .route("/like", post(handlers::like_post))
        // Social reads
        .route("/users/{handle}", get(handlers::get_user))
        .route("/timeline/{handle}", get(handlers::get_timeline))
        .route("/user/{handle}/posts", get(handlers::get_user_posts))
        .route("/search", get(handlers::search_posts))
        // Add state and middleware
        .with_state(node)
        .layer(cors)
}
