//! Read-model entities derived from committed transactions

use serde::{Deserialize, Serialize};

/// A registered or implicitly-created user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub handle: String,
    pub display_name: String,
    /// Ed25519 public key hex, once any registration supplied one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,
    pub created_at: i64,
}

/// A post or reply, keyed by its transaction ID
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub author: String,
    pub text: String,
    pub tags: Vec<String>,
    /// Parent post ID for replies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Height of the block that committed this post
    pub block_index: u64,
    pub timestamp: i64,
}

/// A follow edge, keyed by (follower, followee)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Follow {
    pub follower: String,
    pub followee: String,
    pub block_index: u64,
    pub timestamp: i64,
}

/// A like edge, keyed by (post, liker)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub post_id: String,
    pub liker: String,
    pub block_index: u64,
    pub timestamp: i64,
}
