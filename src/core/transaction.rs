//! Transaction handling for the ledger
//!
//! Transactions are free-form envelopes: `content` either carries plain
//! text (a legacy post) or a JSON document tagged with a `kind` that the
//! projection layer understands. Signed submissions are verified over
//! the digest of the five core fields; the `pubkey` and `signature`
//! companions travel outside the transaction itself.

use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::crypto::{canonical_json, sha256};

// =============================================================================
// Transaction
// =============================================================================

/// A ledger transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    /// Unique transaction ID (UUID for minted, caller-supplied for signed)
    pub id: String,
    /// Sender handle, `"anon"` when unspecified
    pub from: String,
    /// Recipient or routing hint (`"users"`, `"posts"`, `"social"`, ...)
    pub to: String,
    /// Free text or a JSON-encoded structured operation
    pub content: String,
    /// Creation time in Unix milliseconds
    pub timestamp: i64,
}

impl Transaction {
    /// Creates a transaction with a fresh UUID and the current time
    pub fn new(from: impl Into<String>, to: impl Into<String>, content: impl Into<String>) -> Self {
        Transaction {
            id: Uuid::new_v4().to_string(),
            from: from.into(),
            to: to.into(),
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Raw SHA-256 digest over the canonical serialization of the five
    /// core fields; signatures cover these bytes
    pub fn digest_bytes(&self) -> Vec<u8> {
        sha256(canonical_json(&json!(self)).as_bytes())
    }

    /// Hex form of [`digest_bytes`](Self::digest_bytes)
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest_bytes())
    }
}

// =============================================================================
// Structured Content
// =============================================================================

/// Payload of a `user_register` operation
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,
}

/// Payload of a `post` operation (top-level post or reply)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PostPayload {
    #[serde(default)]
    pub text: String,
    /// Explicit hashtags; extracted from `text` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Present on replies, referencing the parent post ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// Payload of a `follow` operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FollowPayload {
    pub followee: String,
}

/// Payload of a `like` operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LikePayload {
    pub post_id: String,
}

/// A structured operation carried in `Transaction::content`
///
/// The `kind` tag selects the variant; operations missing their required
/// payload fields fail to parse and are ignored by the projection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TxPayload {
    UserRegister {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        author: Option<String>,
        #[serde(default)]
        payload: RegisterPayload,
    },
    Post {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        author: Option<String>,
        #[serde(default)]
        payload: PostPayload,
    },
    Follow {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        author: Option<String>,
        payload: FollowPayload,
    },
    Like {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        author: Option<String>,
        payload: LikePayload,
    },
}

/// Result of inspecting a transaction's `content`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedContent {
    /// A recognized structured operation
    Structured(TxPayload),
    /// Valid JSON without a recognized shape; ignored by the projection
    Unrecognized,
    /// Not JSON; treated as free-form post text
    PlainText,
}

impl TxPayload {
    /// Classifies raw transaction content
    pub fn parse(content: &str) -> ParsedContent {
        let value: serde_json::Value = match serde_json::from_str(content) {
            Ok(v) => v,
            Err(_) => return ParsedContent::PlainText,
        };
        match serde_json::from_value::<TxPayload>(value) {
            Ok(op) => ParsedContent::Structured(op),
            Err(_) => ParsedContent::Unrecognized,
        }
    }

    /// Serializes the operation for embedding in `Transaction::content`
    pub fn to_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// The author named inside the operation, if any
    pub fn author(&self) -> Option<&str> {
        match self {
            TxPayload::UserRegister { author, .. }
            | TxPayload::Post { author, .. }
            | TxPayload::Follow { author, .. }
            | TxPayload::Like { author, .. } => author.as_deref(),
        }
    }
}
