//! Persistent storage using sled
//!
//! One database holds every relation, each in its own named tree. Block
//! heights are big-endian keys so lexicographic key order equals height
//! order; composite relations join their parts with a 0x00 separator.
//! Values are JSON documents.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use thiserror::Error;

use crate::core::block::Block;
use crate::core::transaction::Transaction;
use crate::projection::model::{Follow, Like, Post, User};

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Storage backend for the node
pub struct Store {
    db: Db,
    /// Block tree: big-endian height -> Block
    blocks: sled::Tree,
    /// Mempool tree: tx id -> Transaction
    mempool: sled::Tree,
    /// User tree: handle -> User
    users: sled::Tree,
    /// Post tree: post id -> Post
    posts: sled::Tree,
    /// Follow tree: follower 0x00 followee -> Follow
    follows: sled::Tree,
    /// Like tree: post id 0x00 liker -> Like
    likes: sled::Tree,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(serde_json::from_slice(bytes)?)
}

fn composite_key(a: &str, b: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(a.len() + b.len() + 1);
    key.extend_from_slice(a.as_bytes());
    key.push(0);
    key.extend_from_slice(b.as_bytes());
    key
}

fn decode_height(key: &[u8]) -> u64 {
    u64::from_be_bytes(key.try_into().unwrap_or([0; 8]))
}

impl Store {
    /// Opens (or creates) the database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::from_db(sled::open(path)?)
    }

    /// Opens an in-memory database that vanishes on drop
    pub fn temporary() -> Result<Self, StoreError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self, StoreError> {
        let blocks = db.open_tree("blocks")?;
        let mempool = db.open_tree("mempool")?;
        let users = db.open_tree("users")?;
        let posts = db.open_tree("posts")?;
        let follows = db.open_tree("follows")?;
        let likes = db.open_tree("likes")?;

        Ok(Self {
            db,
            blocks,
            mempool,
            users,
            posts,
            follows,
            likes,
        })
    }

    /// Flush all pending writes
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    /// Inserts a block at its height only if that height is vacant.
    /// Returns `false` when another block already occupies the height.
    pub fn insert_block(&self, block: &Block) -> Result<bool, StoreError> {
        let value = encode(block)?;
        let outcome = self.blocks.compare_and_swap(
            block.index.to_be_bytes(),
            None as Option<&[u8]>,
            Some(value),
        )?;
        Ok(outcome.is_ok())
    }

    /// Block at an exact height
    pub fn block_at(&self, height: u64) -> Result<Option<Block>, StoreError> {
        match self.blocks.get(height.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// The highest block, if any
    pub fn tip(&self) -> Result<Option<Block>, StoreError> {
        match self.blocks.last()? {
            Some((_, bytes)) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Height of the highest block, 0 when the chain is empty
    pub fn height(&self) -> Result<u64, StoreError> {
        Ok(self
            .blocks
            .last()?
            .map(|(key, _)| decode_height(&key))
            .unwrap_or(0))
    }

    /// The whole chain in ascending height order
    pub fn chain(&self) -> Result<Vec<Block>, StoreError> {
        let mut chain = Vec::new();
        for entry in self.blocks.iter() {
            let (_, bytes) = entry?;
            chain.push(decode(&bytes)?);
        }
        Ok(chain)
    }

    /// Blocks with height strictly greater than `height`, ascending
    pub fn blocks_from(&self, height: u64) -> Result<Vec<Block>, StoreError> {
        let start = height.saturating_add(1).to_be_bytes();
        let mut blocks = Vec::new();
        for entry in self.blocks.range(start..) {
            let (_, bytes) = entry?;
            blocks.push(decode(&bytes)?);
        }
        Ok(blocks)
    }

    // =========================================================================
    // Mempool
    // =========================================================================

    /// Inserts or replaces a pending transaction, keyed by ID
    pub fn upsert_mempool_tx(&self, tx: &Transaction) -> Result<(), StoreError> {
        self.mempool.insert(tx.id.as_bytes(), encode(tx)?)?;
        Ok(())
    }

    /// Pending transactions ordered by (timestamp, id)
    pub fn mempool_txs(&self) -> Result<Vec<Transaction>, StoreError> {
        let mut txs: Vec<Transaction> = Vec::new();
        for entry in self.mempool.iter() {
            let (_, bytes) = entry?;
            txs.push(decode(&bytes)?);
        }
        txs.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(txs)
    }

    /// Removes exactly the given transaction IDs
    pub fn remove_mempool_txs(&self, ids: &[String]) -> Result<(), StoreError> {
        for id in ids {
            self.mempool.remove(id.as_bytes())?;
        }
        Ok(())
    }

    /// Number of pending transactions
    pub fn mempool_len(&self) -> usize {
        self.mempool.len()
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub fn put_user(&self, user: &User) -> Result<(), StoreError> {
        self.users.insert(user.handle.as_bytes(), encode(user)?)?;
        Ok(())
    }

    pub fn get_user(&self, handle: &str) -> Result<Option<User>, StoreError> {
        match self.users.get(handle.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Posts
    // =========================================================================

    /// Inserts a post only if its ID is new; replays are no-ops
    pub fn insert_post_if_absent(&self, post: &Post) -> Result<bool, StoreError> {
        let value = encode(post)?;
        let outcome =
            self.posts
                .compare_and_swap(post.id.as_bytes(), None as Option<&[u8]>, Some(value))?;
        Ok(outcome.is_ok())
    }

    /// Every post, in key order; callers filter and sort
    pub fn posts(&self) -> Result<Vec<Post>, StoreError> {
        let mut posts = Vec::new();
        for entry in self.posts.iter() {
            let (_, bytes) = entry?;
            posts.push(decode(&bytes)?);
        }
        Ok(posts)
    }

    // =========================================================================
    // Follows
    // =========================================================================

    pub fn put_follow(&self, follow: &Follow) -> Result<(), StoreError> {
        let key = composite_key(&follow.follower, &follow.followee);
        self.follows.insert(key, encode(follow)?)?;
        Ok(())
    }

    /// The stored edge for a specific (follower, followee) pair
    pub(crate) fn follow_between(
        &self,
        follower: &str,
        followee: &str,
    ) -> Result<Option<Follow>, StoreError> {
        match self.follows.get(composite_key(follower, followee))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Handles the given user follows
    pub fn followees(&self, follower: &str) -> Result<Vec<String>, StoreError> {
        let mut prefix = follower.as_bytes().to_vec();
        prefix.push(0);
        let mut followees = Vec::new();
        for entry in self.follows.scan_prefix(prefix) {
            let (_, bytes) = entry?;
            let follow: Follow = decode(&bytes)?;
            followees.push(follow.followee);
        }
        Ok(followees)
    }

    // =========================================================================
    // Likes
    // =========================================================================

    pub fn put_like(&self, like: &Like) -> Result<(), StoreError> {
        let key = composite_key(&like.post_id, &like.liker);
        self.likes.insert(key, encode(like)?)?;
        Ok(())
    }

    /// Likes recorded against a post
    pub(crate) fn likes_for_post(&self, post_id: &str) -> Result<Vec<Like>, StoreError> {
        let mut prefix = post_id.as_bytes().to_vec();
        prefix.push(0);
        let mut likes = Vec::new();
        for entry in self.likes.scan_prefix(prefix) {
            let (_, bytes) = entry?;
            likes.push(decode(&bytes)?);
        }
        Ok(likes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tx(id: &str, timestamp: i64) -> Transaction {
        Transaction {
            id: id.into(),
            from: "alice".into(),
            to: "bob".into(),
            content: "hi".into(),
            timestamp,
        }
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.height().unwrap(), 0);
        store.flush().unwrap();
    }

    #[test]
    fn test_block_round_trip() {
        let store = Store::temporary().unwrap();
        let genesis = Block::genesis(1000);
        assert!(store.insert_block(&genesis).unwrap());

        assert_eq!(store.height().unwrap(), 1);
        assert_eq!(store.tip().unwrap().unwrap().hash, genesis.hash);
        assert_eq!(store.block_at(1).unwrap().unwrap(), genesis);
        assert_eq!(store.chain().unwrap(), vec![genesis]);
    }

    #[test]
    fn test_insert_block_is_conditional() {
        let store = Store::temporary().unwrap();
        let first = Block::new(1, 1000, Block::genesis(1000).prev_hash, 0, vec![]);
        let second = Block::new(1, 2000, "ff", 9, vec![]);

        assert!(store.insert_block(&first).unwrap());
        assert!(!store.insert_block(&second).unwrap());
        // First write wins
        assert_eq!(store.block_at(1).unwrap().unwrap().hash, first.hash);
    }

    #[test]
    fn test_blocks_from_is_exclusive() {
        let store = Store::temporary().unwrap();
        for i in 1..=4u64 {
            store
                .insert_block(&Block::new(i, 1000 + i as i64, "p", 0, vec![]))
                .unwrap();
        }
        let from_two = store.blocks_from(2).unwrap();
        assert_eq!(
            from_two.iter().map(|b| b.index).collect::<Vec<_>>(),
            vec![3, 4]
        );
        assert!(store.blocks_from(4).unwrap().is_empty());
        assert_eq!(store.blocks_from(0).unwrap().len(), 4);
    }

    #[test]
    fn test_mempool_ordering_and_removal() {
        let store = Store::temporary().unwrap();
        store.upsert_mempool_tx(&tx("b", 200)).unwrap();
        store.upsert_mempool_tx(&tx("c", 100)).unwrap();
        store.upsert_mempool_tx(&tx("a", 200)).unwrap();

        let ordered: Vec<String> = store
            .mempool_txs()
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ordered, vec!["c", "a", "b"]);

        store
            .remove_mempool_txs(&["c".to_string(), "a".to_string()])
            .unwrap();
        assert_eq!(store.mempool_len(), 1);
        assert_eq!(store.mempool_txs().unwrap()[0].id, "b");
    }

    #[test]
    fn test_mempool_upsert_replaces() {
        let store = Store::temporary().unwrap();
        store.upsert_mempool_tx(&tx("a", 100)).unwrap();
        let mut newer = tx("a", 100);
        newer.content = "edited".into();
        store.upsert_mempool_tx(&newer).unwrap();

        let txs = store.mempool_txs().unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].content, "edited");
    }

    #[test]
    fn test_user_round_trip() {
        let store = Store::temporary().unwrap();
        assert!(store.get_user("alice").unwrap().is_none());

        let user = User {
            handle: "alice".into(),
            display_name: "Alice".into(),
            pubkey: Some("ab".into()),
            created_at: 1000,
        };
        store.put_user(&user).unwrap();
        assert_eq!(store.get_user("alice").unwrap().unwrap(), user);
    }

    #[test]
    fn test_post_insert_ignores_replay() {
        let store = Store::temporary().unwrap();
        let post = Post {
            id: "p1".into(),
            author: "alice".into(),
            text: "hello".into(),
            tags: vec![],
            parent_id: None,
            block_index: 2,
            timestamp: 1000,
        };
        assert!(store.insert_post_if_absent(&post).unwrap());

        let mut replay = post.clone();
        replay.text = "changed".into();
        assert!(!store.insert_post_if_absent(&replay).unwrap());
        assert_eq!(store.posts().unwrap()[0].text, "hello");
    }

    #[test]
    fn test_follow_scan() {
        let store = Store::temporary().unwrap();
        for followee in ["bob", "carol"] {
            store
                .put_follow(&Follow {
                    follower: "alice".into(),
                    followee: followee.into(),
                    block_index: 3,
                    timestamp: 1000,
                })
                .unwrap();
        }
        store
            .put_follow(&Follow {
                follower: "bob".into(),
                followee: "alice".into(),
                block_index: 3,
                timestamp: 1000,
            })
            .unwrap();

        let mut followees = store.followees("alice").unwrap();
        followees.sort();
        assert_eq!(followees, vec!["bob", "carol"]);
        assert_eq!(store.followees("carol").unwrap().len(), 0);

        let edge = store.follow_between("alice", "bob").unwrap().unwrap();
        assert_eq!(edge.block_index, 3);
        assert!(store.follow_between("carol", "bob").unwrap().is_none());
    }

    #[test]
    fn test_like_scan() {
        let store = Store::temporary().unwrap();
        let like = Like {
            post_id: "p1".into(),
            liker: "bob".into(),
            block_index: 3,
            timestamp: 1000,
        };
        store.put_like(&like).unwrap();
        // Re-liking replaces rather than duplicating
        store.put_like(&like).unwrap();

        assert_eq!(store.likes_for_post("p1").unwrap(), vec![like]);
        assert!(store.likes_for_post("p2").unwrap().is_empty());
    }
}
