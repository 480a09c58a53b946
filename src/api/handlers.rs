//! REST API handlers for node and social operations
//!
//! Every handler acts through the [`Node`] facade. Error responses are
//! `{ok: false, error: <reason>}` where the reason string comes from
//! [`NodeError`]'s display form or from field validation here.

use crate::core::block::Block;
use crate::core::transaction::Transaction;
use crate::mining::MineOutcome;
use crate::network::sync;
use crate::node::{GossipOutcome, Node, NodeError};
use crate::projection::model::{Post, User};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Page size applied when a read query omits `limit`
const DEFAULT_PAGE_LIMIT: usize = 50;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub ok: bool,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct ChainResponse {
    pub length: usize,
    pub chain: Vec<Block>,
}

#[derive(Debug, Serialize)]
pub struct MempoolResponse {
    pub mempool: Vec<Transaction>,
}

#[derive(Debug, Serialize)]
pub struct TxResponse {
    pub ok: bool,
    pub tx: Transaction,
}

#[derive(Debug, Serialize)]
pub struct MineResponse {
    pub mined: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<Block>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct PeersResponse {
    pub peers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PeersUpdatedResponse {
    pub ok: bool,
    pub peers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BlocksResponse {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub ok: bool,
    pub applied: usize,
}

/// Plain `{ok}` acknowledgement; gossip replays add `duplicate: true`
#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub ok: bool,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct PostsResponse {
    pub ok: bool,
    pub posts: Vec<Post>,
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Deserialize)]
pub struct SubmitTxRequest {
    pub from: Option<String>,
    pub to: Option<String>,
    pub content: Option<String>,
}

/// Signed submissions carry all five core fields plus the key pair halves
#[derive(Deserialize)]
pub struct SignedTxRequest {
    pub id: String,
    pub from: String,
    pub to: String,
    pub content: String,
    pub timestamp: i64,
    pub pubkey: String,
    pub signature: String,
}

#[derive(Deserialize)]
pub struct AddPeerRequest {
    pub url: Option<String>,
}

#[derive(Deserialize)]
pub struct ExchangePeersRequest {
    #[serde(default)]
    pub peers: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlocksQuery {
    #[serde(default)]
    pub from_height: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub handle: Option<String>,
    pub display_name: Option<String>,
    pub pubkey: Option<String>,
}

#[derive(Deserialize)]
pub struct PostRequest {
    pub author: Option<String>,
    pub text: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRequest {
    pub author: Option<String>,
    pub text: Option<String>,
    pub parent_id: Option<String>,
}

#[derive(Deserialize)]
pub struct FollowRequest {
    pub follower: Option<String>,
    pub followee: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeRequest {
    pub liker: Option<String>,
    pub post_id: Option<String>,
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl PageQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_LIMIT)
    }

    fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

// ============================================================================
// Error Mapping
// ============================================================================

fn reject(err: NodeError) -> (StatusCode, Json<ApiError>) {
    let status = match &err {
        NodeError::BadTx
        | NodeError::BadBlock
        | NodeError::InvalidBlock(_)
        | NodeError::InvalidSignature(_) => StatusCode::BAD_REQUEST,
        NodeError::NotFound => StatusCode::NOT_FOUND,
        NodeError::Store(_) | NodeError::Mining(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ApiError {
            ok: false,
            error: err.to_string(),
        }),
    )
}

fn bad_request(reason: &str) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError {
            ok: false,
            error: reason.to_string(),
        }),
    )
}

// ============================================================================
// Node Handlers
// ============================================================================

/// GET /health - Liveness probe
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

/// GET /chain - Full chain, oldest first, with its length
pub async fn get_chain(
    State(node): State<Node>,
) -> Result<Json<ChainResponse>, (StatusCode, Json<ApiError>)> {
    let chain = node.ledger().chain().map_err(|e| reject(e.into()))?;
    Ok(Json(ChainResponse {
        length: chain.len(),
        chain,
    }))
}

/// GET /mempool - Pending transactions, admission order
pub async fn get_mempool(
    State(node): State<Node>,
) -> Result<Json<MempoolResponse>, (StatusCode, Json<ApiError>)> {
    let mempool = node.mempool().snapshot().map_err(|e| reject(e.into()))?;
    Ok(Json(MempoolResponse { mempool }))
}

/// POST /tx - Submit an open transaction; missing fields take defaults
pub async fn submit_tx(
    State(node): State<Node>,
    Json(req): Json<SubmitTxRequest>,
) -> Result<Json<TxResponse>, (StatusCode, Json<ApiError>)> {
    let tx = node
        .submit_tx(req.from, req.to, req.content)
        .await
        .map_err(reject)?;
    Ok(Json(TxResponse { ok: true, tx }))
}

/// POST /tx/signed - Submit a transaction with an Ed25519 signature over
/// its digest
pub async fn submit_signed_tx(
    State(node): State<Node>,
    Json(req): Json<SignedTxRequest>,
) -> Result<Json<TxResponse>, (StatusCode, Json<ApiError>)> {
    let tx = Transaction {
        id: req.id,
        from: req.from,
        to: req.to,
        content: req.content,
        timestamp: req.timestamp,
    };
    let tx = node
        .submit_signed_tx(tx, &req.pubkey, &req.signature)
        .await
        .map_err(reject)?;
    Ok(Json(TxResponse { ok: true, tx }))
}

/// POST /mine - Mine the current mempool into a block
pub async fn mine_block(
    State(node): State<Node>,
) -> Result<Json<MineResponse>, (StatusCode, Json<ApiError>)> {
    match node.mine().await.map_err(reject)? {
        MineOutcome::Mined { block } => Ok(Json(MineResponse {
            mined: true,
            block: Some(block),
            reason: None,
        })),
        MineOutcome::Skipped { reason } => Ok(Json(MineResponse {
            mined: false,
            block: None,
            reason: Some(reason),
        })),
    }
}

// ============================================================================
// Peer and Replication Handlers
// ============================================================================

/// GET /peers - Known peer URLs
pub async fn get_peers(State(node): State<Node>) -> Json<PeersResponse> {
    Json(PeersResponse {
        peers: node.peers().list().await,
    })
}

/// POST /peers - Add one peer URL
pub async fn add_peer(
    State(node): State<Node>,
    Json(req): Json<AddPeerRequest>,
) -> Result<Json<PeersUpdatedResponse>, (StatusCode, Json<ApiError>)> {
    let Some(url) = req.url.filter(|u| !u.is_empty()) else {
        return Err(bad_request("url required"));
    };
    node.peers().add(&url).await;
    Ok(Json(PeersUpdatedResponse {
        ok: true,
        peers: node.peers().list().await,
    }))
}

/// POST /peers/exchange - Merge a remote peer list, answer with ours
pub async fn exchange_peers(
    State(node): State<Node>,
    Json(req): Json<ExchangePeersRequest>,
) -> Json<PeersUpdatedResponse> {
    node.peers().merge(req.peers).await;
    Json(PeersUpdatedResponse {
        ok: true,
        peers: node.peers().list().await,
    })
}

/// GET /blocks?fromHeight=N - Blocks strictly above a height
pub async fn get_blocks(
    State(node): State<Node>,
    Query(query): Query<BlocksQuery>,
) -> Result<Json<BlocksResponse>, (StatusCode, Json<ApiError>)> {
    let blocks = node
        .ledger()
        .blocks_from(query.from_height)
        .map_err(|e| reject(e.into()))?;
    Ok(Json(BlocksResponse { blocks }))
}

/// POST /receive-block - Direct block push without an envelope
pub async fn receive_block(
    State(node): State<Node>,
    Json(body): Json<Value>,
) -> Result<Json<AckResponse>, (StatusCode, Json<ApiError>)> {
    let block: Block = serde_json::from_value(body).map_err(|_| bad_request("invalid block"))?;
    node.receive_block(block).await.map_err(reject)?;
    Ok(Json(AckResponse {
        ok: true,
        duplicate: None,
    }))
}

/// POST /sync - Run one anti-entropy round immediately
pub async fn sync_now(State(node): State<Node>) -> Json<SyncResponse> {
    let applied = sync::sync_round(&node).await;
    Json(SyncResponse { ok: true, applied })
}

// ============================================================================
// Gossip Handlers
// ============================================================================

fn gossip_ack(outcome: GossipOutcome) -> Json<AckResponse> {
    Json(AckResponse {
        ok: true,
        duplicate: match outcome {
            GossipOutcome::Accepted => None,
            GossipOutcome::Duplicate => Some(true),
        },
    })
}

/// POST /gossip/tx - Transaction rumor, enveloped or bare
pub async fn gossip_tx(
    State(node): State<Node>,
    Json(body): Json<Value>,
) -> Result<Json<AckResponse>, (StatusCode, Json<ApiError>)> {
    let outcome = node.receive_gossip_tx(body).await.map_err(reject)?;
    Ok(gossip_ack(outcome))
}

/// POST /gossip/block - Block rumor, enveloped or bare
pub async fn gossip_block(
    State(node): State<Node>,
    Json(body): Json<Value>,
) -> Result<Json<AckResponse>, (StatusCode, Json<ApiError>)> {
    let outcome = node.receive_gossip_block(body).await.map_err(reject)?;
    Ok(gossip_ack(outcome))
}

// ============================================================================
// Social Write Handlers
// ============================================================================

/// POST /users/register - Mint a user_register operation
pub async fn register_user(
    State(node): State<Node>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<TxResponse>, (StatusCode, Json<ApiError>)> {
    let Some(handle) = req.handle.filter(|h| !h.is_empty()) else {
        return Err(bad_request("handle required"));
    };
    let tx = node
        .register_user(&handle, req.display_name, req.pubkey)
        .map_err(reject)?;
    Ok(Json(TxResponse { ok: true, tx }))
}

/// POST /post - Mint a top-level post
pub async fn create_post(
    State(node): State<Node>,
    Json(req): Json<PostRequest>,
) -> Result<Json<TxResponse>, (StatusCode, Json<ApiError>)> {
    let (Some(author), Some(text)) = (
        req.author.filter(|s| !s.is_empty()),
        req.text.filter(|s| !s.is_empty()),
    ) else {
        return Err(bad_request("author and text required"));
    };
    let tx = node.create_post(&author, text, req.tags).map_err(reject)?;
    Ok(Json(TxResponse { ok: true, tx }))
}

/// POST /reply - Mint a reply referencing its parent post
pub async fn create_reply(
    State(node): State<Node>,
    Json(req): Json<ReplyRequest>,
) -> Result<Json<TxResponse>, (StatusCode, Json<ApiError>)> {
    let (Some(author), Some(text), Some(parent_id)) = (
        req.author.filter(|s| !s.is_empty()),
        req.text.filter(|s| !s.is_empty()),
        req.parent_id.filter(|s| !s.is_empty()),
    ) else {
        return Err(bad_request("author, text and parentId required"));
    };
    let tx = node
        .create_reply(&author, text, parent_id)
        .map_err(reject)?;
    Ok(Json(TxResponse { ok: true, tx }))
}

/// POST /follow - Mint a follow edge
pub async fn follow_user(
    State(node): State<Node>,
    Json(req): Json<FollowRequest>,
) -> Result<Json<TxResponse>, (StatusCode, Json<ApiError>)> {
    let (Some(follower), Some(followee)) = (
        req.follower.filter(|s| !s.is_empty()),
        req.followee.filter(|s| !s.is_empty()),
    ) else {
        return Err(bad_request("follower and followee required"));
    };
    let tx = node.follow(&follower, followee).map_err(reject)?;
    Ok(Json(TxResponse { ok: true, tx }))
}

/// POST /like - Mint a like edge
pub async fn like_post(
    State(node): State<Node>,
    Json(req): Json<LikeRequest>,
) -> Result<Json<TxResponse>, (StatusCode, Json<ApiError>)> {
    let (Some(liker), Some(post_id)) = (
        req.liker.filter(|s| !s.is_empty()),
        req.post_id.filter(|s| !s.is_empty()),
    ) else {
        return Err(bad_request("liker and postId required"));
    };
    let tx = node.like(&liker, post_id).map_err(reject)?;
    Ok(Json(TxResponse { ok: true, tx }))
}

// ============================================================================
// Social Read Handlers
// ============================================================================

/// GET /users/{handle} - Projected user record
pub async fn get_user(
    State(node): State<Node>,
    Path(handle): Path<String>,
) -> Result<Json<UserResponse>, (StatusCode, Json<ApiError>)> {
    let user = node.user(&handle).map_err(reject)?;
    Ok(Json(UserResponse { ok: true, user }))
}

/// GET /timeline/{handle} - Posts by the user and everyone they follow
pub async fn get_timeline(
    State(node): State<Node>,
    Path(handle): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<PostsResponse>, (StatusCode, Json<ApiError>)> {
    let posts = node
        .timeline(&handle, page.limit(), page.offset())
        .map_err(reject)?;
    Ok(Json(PostsResponse { ok: true, posts }))
}

/// GET /user/{handle}/posts - Posts authored by one user
pub async fn get_user_posts(
    State(node): State<Node>,
    Path(handle): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<PostsResponse>, (StatusCode, Json<ApiError>)> {
    let posts = node
        .user_posts(&handle, page.limit(), page.offset())
        .map_err(reject)?;
    Ok(Json(PostsResponse { ok: true, posts }))
}

/// GET /search?q= - Posts by `#hashtag` or free-text match
pub async fn search_posts(
    State(node): State<Node>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<PostsResponse>, (StatusCode, Json<ApiError>)> {
    let Some(q) = query.q.filter(|q| !q.is_empty()) else {
        return Err(bad_request("q required"));
    };
    let posts = node
        .search_posts(
            &q,
            query.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
            query.offset.unwrap_or(0),
        )
        .map_err(reject)?;
    Ok(Json(PostsResponse { ok: true, posts }))
}
