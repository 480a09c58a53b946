//! Deterministic social projection of the ledger
//!
//! Replays committed transactions into the relational read model. Every
//! write is an upsert or an insert-or-ignore keyed on content identity,
//! so applying the same block twice, or backfilling a chain that was
//! already projected, leaves the state unchanged.

use std::collections::HashSet;
use std::sync::Arc;

use crate::core::block::Block;
use crate::core::transaction::{ParsedContent, Transaction, TxPayload};
use crate::projection::model::{Follow, Like, Post, User};
use crate::projection::tags::extract_tags;
use crate::storage::{Store, StoreError};

/// Applies committed blocks to the social read model and serves queries
/// over it
#[derive(Clone)]
pub struct Projection {
    store: Arc<Store>,
}

impl Projection {
    pub fn new(store: Arc<Store>) -> Self {
        Projection { store }
    }

    // =========================================================================
    // Replay
    // =========================================================================

    /// Replays the whole chain from the first block.
    /// Returns the number of blocks applied.
    pub fn backfill(&self) -> Result<u64, StoreError> {
        let chain = self.store.chain()?;
        for block in &chain {
            self.apply_block(block)?;
        }
        Ok(chain.len() as u64)
    }

    /// Projects every transaction of a committed block, in order
    pub fn apply_block(&self, block: &Block) -> Result<(), StoreError> {
        for tx in &block.txs {
            self.apply_tx(tx, block.index)?;
        }
        Ok(())
    }

    fn apply_tx(&self, tx: &Transaction, block_index: u64) -> Result<(), StoreError> {
        match TxPayload::parse(&tx.content) {
            ParsedContent::PlainText => self.apply_legacy_post(tx, block_index),
            ParsedContent::Structured(op) => self.apply_operation(tx, &op, block_index),
            // Valid JSON without a recognized operation projects nothing
            ParsedContent::Unrecognized => Ok(()),
        }
    }

    /// Free-text content becomes a post authored by the sender
    fn apply_legacy_post(&self, tx: &Transaction, block_index: u64) -> Result<(), StoreError> {
        self.upsert_user(&tx.from, &tx.from, None, tx.timestamp)?;
        self.store.insert_post_if_absent(&Post {
            id: tx.id.clone(),
            author: tx.from.clone(),
            text: tx.content.clone(),
            tags: extract_tags(&tx.content),
            parent_id: None,
            block_index,
            timestamp: tx.timestamp,
        })?;
        Ok(())
    }

    fn apply_operation(
        &self,
        tx: &Transaction,
        op: &TxPayload,
        block_index: u64,
    ) -> Result<(), StoreError> {
        let author = match op.author().filter(|a| !a.is_empty()) {
            Some(a) => a.to_string(),
            None => tx.from.clone(),
        };
        // Without an author there is nobody to attribute the operation to
        if author.is_empty() {
            return Ok(());
        }

        match op {
            TxPayload::UserRegister { payload, .. } => {
                let display_name = payload
                    .display_name
                    .clone()
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| author.clone());
                let pubkey = payload.pubkey.clone().filter(|p| !p.is_empty());
                self.upsert_user(&author, &display_name, pubkey, tx.timestamp)
            }
            TxPayload::Post { payload, .. } => {
                let tags = match &payload.tags {
                    Some(tags) => tags.iter().map(|t| t.to_lowercase()).collect(),
                    None => extract_tags(&payload.text),
                };
                self.upsert_user(&author, &author, None, tx.timestamp)?;
                self.store.insert_post_if_absent(&Post {
                    id: tx.id.clone(),
                    author,
                    text: payload.text.clone(),
                    tags,
                    parent_id: payload.parent_id.clone().filter(|p| !p.is_empty()),
                    block_index,
                    timestamp: tx.timestamp,
                })?;
                Ok(())
            }
            TxPayload::Follow { payload, .. } => {
                if payload.followee.is_empty() {
                    return Ok(());
                }
                self.upsert_user(&author, &author, None, tx.timestamp)?;
                self.upsert_user(&payload.followee, &payload.followee, None, tx.timestamp)?;
                self.store.put_follow(&Follow {
                    follower: author,
                    followee: payload.followee.clone(),
                    block_index,
                    timestamp: tx.timestamp,
                })
            }
            TxPayload::Like { payload, .. } => {
                if payload.post_id.is_empty() {
                    return Ok(());
                }
                self.upsert_user(&author, &author, None, tx.timestamp)?;
                self.store.put_like(&Like {
                    post_id: payload.post_id.clone(),
                    liker: author,
                    block_index,
                    timestamp: tx.timestamp,
                })
            }
        }
    }

    /// Merging upsert: the display name is refreshed, a stored pubkey
    /// survives an update that carries none, and the original creation
    /// time is kept.
    fn upsert_user(
        &self,
        handle: &str,
        display_name: &str,
        pubkey: Option<String>,
        created_at: i64,
    ) -> Result<(), StoreError> {
        let merged = match self.store.get_user(handle)? {
            Some(existing) => User {
                handle: existing.handle,
                display_name: display_name.to_string(),
                pubkey: pubkey.or(existing.pubkey),
                created_at: existing.created_at,
            },
            None => User {
                handle: handle.to_string(),
                display_name: display_name.to_string(),
                pubkey,
                created_at,
            },
        };
        self.store.put_user(&merged)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn get_user(&self, handle: &str) -> Result<Option<User>, StoreError> {
        self.store.get_user(handle)
    }

    /// Posts authored by `handle`, newest first
    pub fn user_posts(
        &self,
        handle: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Post>, StoreError> {
        let posts = self
            .store
            .posts()?
            .into_iter()
            .filter(|p| p.author == handle)
            .collect();
        Ok(page(posts, limit, offset))
    }

    /// Posts authored by `handle` or anyone `handle` follows, newest first
    pub fn timeline(
        &self,
        handle: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Post>, StoreError> {
        let mut visible: HashSet<String> = self.store.followees(handle)?.into_iter().collect();
        visible.insert(handle.to_string());
        let posts = self
            .store
            .posts()?
            .into_iter()
            .filter(|p| visible.contains(&p.author))
            .collect();
        Ok(page(posts, limit, offset))
    }

    /// Posts matching a query, newest first. A query starting with `#`
    /// matches posts tagged with the (lowercased) remainder; anything
    /// else is a case-insensitive substring match on the post text.
    pub fn search(
        &self,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Post>, StoreError> {
        let posts = self.store.posts()?;
        let matched = if let Some(tag) = query.strip_prefix('#') {
            let tag = tag.to_lowercase();
            posts
                .into_iter()
                .filter(|p| p.tags.iter().any(|t| *t == tag))
                .collect()
        } else {
            let needle = query.to_lowercase();
            posts
                .into_iter()
                .filter(|p| p.text.to_lowercase().contains(&needle))
                .collect()
        };
        Ok(page(matched, limit, offset))
    }

    /// Likes recorded against a post
    pub(crate) fn post_likes(&self, post_id: &str) -> Result<Vec<Like>, StoreError> {
        self.store.likes_for_post(post_id)
    }
}

/// Newest first with a stable tie-break on ID, then the requested page
fn page(mut posts: Vec<Post>, limit: usize, offset: usize) -> Vec<Post> {
    posts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
    posts.into_iter().skip(offset).take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::{FollowPayload, LikePayload, PostPayload, RegisterPayload};

    fn setup() -> (Arc<Store>, Projection) {
        let store = Arc::new(Store::temporary().unwrap());
        let projection = Projection::new(store.clone());
        (store, projection)
    }

    fn tx(id: &str, from: &str, content: &str, timestamp: i64) -> Transaction {
        Transaction {
            id: id.into(),
            from: from.into(),
            to: "social".into(),
            content: content.into(),
            timestamp,
        }
    }

    fn block(index: u64, txs: Vec<Transaction>) -> Block {
        Block::new(index, 1_000 * index as i64, "prev", 0, txs)
    }

    fn post_tx(id: &str, author: &str, text: &str, timestamp: i64) -> Transaction {
        let op = TxPayload::Post {
            author: Some(author.into()),
            payload: PostPayload {
                text: text.into(),
                tags: None,
                parent_id: None,
            },
        };
        tx(id, author, &op.to_content(), timestamp)
    }

    #[test]
    fn test_legacy_post_projects_author_and_tags() {
        let (store, projection) = setup();
        projection
            .apply_block(&block(2, vec![tx("t1", "alice", "gm #Rust world", 100)]))
            .unwrap();

        let user = store.get_user("alice").unwrap().unwrap();
        assert_eq!(user.display_name, "alice");
        assert_eq!(user.created_at, 100);

        let posts = store.posts().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "t1");
        assert_eq!(posts[0].text, "gm #Rust world");
        assert_eq!(posts[0].tags, vec!["rust"]);
        assert_eq!(posts[0].block_index, 2);
    }

    #[test]
    fn test_structured_post_lowercases_payload_tags() {
        let (store, projection) = setup();
        let op = TxPayload::Post {
            author: Some("bob".into()),
            payload: PostPayload {
                text: "launch day".into(),
                tags: Some(vec!["Launch".into(), "DAY".into()]),
                parent_id: Some("t0".into()),
            },
        };
        projection
            .apply_block(&block(2, vec![tx("t2", "bob", &op.to_content(), 200)]))
            .unwrap();

        let posts = store.posts().unwrap();
        assert_eq!(posts[0].tags, vec!["launch", "day"]);
        assert_eq!(posts[0].parent_id.as_deref(), Some("t0"));
    }

    #[test]
    fn test_register_merge_keeps_pubkey_and_creation_time() {
        let (store, projection) = setup();
        let register = |display: Option<&str>, pubkey: Option<&str>| TxPayload::UserRegister {
            author: Some("carol".into()),
            payload: RegisterPayload {
                display_name: display.map(Into::into),
                pubkey: pubkey.map(Into::into),
            },
        };

        projection
            .apply_block(&block(
                2,
                vec![tx("r1", "carol", &register(Some("Carol"), Some("ab")).to_content(), 100)],
            ))
            .unwrap();
        projection
            .apply_block(&block(
                3,
                vec![tx("r2", "carol", &register(Some("Carol II"), None).to_content(), 500)],
            ))
            .unwrap();

        let user = store.get_user("carol").unwrap().unwrap();
        assert_eq!(user.display_name, "Carol II");
        assert_eq!(user.pubkey.as_deref(), Some("ab"));
        assert_eq!(user.created_at, 100);
    }

    #[test]
    fn test_follow_upserts_both_sides() {
        let (store, projection) = setup();
        let op = TxPayload::Follow {
            author: Some("alice".into()),
            payload: FollowPayload {
                followee: "bob".into(),
            },
        };
        projection
            .apply_block(&block(2, vec![tx("f1", "alice", &op.to_content(), 100)]))
            .unwrap();

        assert!(store.get_user("alice").unwrap().is_some());
        assert!(store.get_user("bob").unwrap().is_some());
        assert_eq!(store.followees("alice").unwrap(), vec!["bob"]);
        assert_eq!(
            store.follow_between("alice", "bob").unwrap(),
            Some(Follow {
                follower: "alice".into(),
                followee: "bob".into(),
                block_index: 2,
                timestamp: 100,
            })
        );
    }

    #[test]
    fn test_like_records_edge() {
        let (_, projection) = setup();
        let op = TxPayload::Like {
            author: Some("bob".into()),
            payload: LikePayload {
                post_id: "t1".into(),
            },
        };
        projection
            .apply_block(&block(2, vec![tx("l1", "bob", &op.to_content(), 100)]))
            .unwrap();

        let likes = projection.post_likes("t1").unwrap();
        assert_eq!(
            likes,
            vec![Like {
                post_id: "t1".into(),
                liker: "bob".into(),
                block_index: 2,
                timestamp: 100,
            }]
        );
    }

    #[test]
    fn test_unrecognized_content_is_ignored() {
        let (store, projection) = setup();
        projection
            .apply_block(&block(
                2,
                vec![
                    tx("u1", "alice", r#"{"kind":"poke","payload":{}}"#, 100),
                    tx("u2", "alice", "42", 100),
                ],
            ))
            .unwrap();

        assert!(store.posts().unwrap().is_empty());
        assert!(store.get_user("alice").unwrap().is_none());
    }

    #[test]
    fn test_author_falls_back_to_sender() {
        let (store, projection) = setup();
        let op = TxPayload::Post {
            author: None,
            payload: PostPayload {
                text: "anonymous-ish".into(),
                ..Default::default()
            },
        };
        projection
            .apply_block(&block(2, vec![tx("p1", "dave", &op.to_content(), 100)]))
            .unwrap();

        assert_eq!(store.posts().unwrap()[0].author, "dave");
    }

    #[test]
    fn test_replay_is_idempotent() {
        let (store, projection) = setup();
        let b = block(
            2,
            vec![
                post_tx("t1", "alice", "first #tag", 100),
                tx(
                    "f1",
                    "bob",
                    &TxPayload::Follow {
                        author: Some("bob".into()),
                        payload: FollowPayload {
                            followee: "alice".into(),
                        },
                    }
                    .to_content(),
                    150,
                ),
            ],
        );

        projection.apply_block(&b).unwrap();
        projection.apply_block(&b).unwrap();

        assert_eq!(store.posts().unwrap().len(), 1);
        assert_eq!(store.followees("bob").unwrap(), vec!["alice"]);
        assert_eq!(store.get_user("alice").unwrap().unwrap().created_at, 100);
    }

    #[test]
    fn test_backfill_matches_incremental_apply() {
        let incremental = setup();
        let backfilled = setup();

        let blocks = vec![
            block(1, vec![post_tx("t1", "alice", "one #x", 100)]),
            block(2, vec![post_tx("t2", "bob", "two", 200)]),
            block(
                3,
                vec![tx(
                    "f1",
                    "alice",
                    &TxPayload::Follow {
                        author: Some("alice".into()),
                        payload: FollowPayload {
                            followee: "bob".into(),
                        },
                    }
                    .to_content(),
                    300,
                )],
            ),
        ];

        for b in &blocks {
            incremental.0.insert_block(b).unwrap();
            backfilled.0.insert_block(b).unwrap();
            incremental.1.apply_block(b).unwrap();
        }
        assert_eq!(backfilled.1.backfill().unwrap(), 3);

        let ids = |store: &Store| {
            let mut ids: Vec<String> = store.posts().unwrap().into_iter().map(|p| p.id).collect();
            ids.sort();
            ids
        };
        assert_eq!(ids(&incremental.0), ids(&backfilled.0));
        assert_eq!(
            incremental.0.get_user("alice").unwrap(),
            backfilled.0.get_user("alice").unwrap()
        );
        assert_eq!(
            incremental.0.followees("alice").unwrap(),
            backfilled.0.followees("alice").unwrap()
        );
    }

    #[test]
    fn test_timeline_includes_followees_newest_first() {
        let (_, projection) = setup();
        projection
            .apply_block(&block(
                2,
                vec![
                    post_tx("t1", "alice", "mine", 100),
                    post_tx("t2", "bob", "followed", 300),
                    post_tx("t3", "carol", "stranger", 200),
                ],
            ))
            .unwrap();
        projection
            .apply_block(&block(
                3,
                vec![tx(
                    "f1",
                    "alice",
                    &TxPayload::Follow {
                        author: Some("alice".into()),
                        payload: FollowPayload {
                            followee: "bob".into(),
                        },
                    }
                    .to_content(),
                    400,
                )],
            ))
            .unwrap();

        let timeline = projection.timeline("alice", 50, 0).unwrap();
        let ids: Vec<&str> = timeline.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["t2", "t1"]);
    }

    #[test]
    fn test_search_by_tag_and_text() {
        let (_, projection) = setup();
        projection
            .apply_block(&block(
                2,
                vec![
                    post_tx("t1", "alice", "shipping #Rust today", 100),
                    post_tx("t2", "bob", "rustling leaves", 200),
                    post_tx("t3", "carol", "unrelated", 300),
                ],
            ))
            .unwrap();

        let by_tag = projection.search("#rust", 50, 0).unwrap();
        assert_eq!(by_tag.len(), 1);
        assert_eq!(by_tag[0].id, "t1");

        let by_text = projection.search("RUST", 50, 0).unwrap();
        let ids: Vec<&str> = by_text.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["t2", "t1"]);
    }

    #[test]
    fn test_pagination() {
        let (_, projection) = setup();
        let txs = (0..5)
            .map(|i| post_tx(&format!("t{}", i), "alice", "hello", 100 * i as i64))
            .collect();
        projection.apply_block(&block(2, txs)).unwrap();

        let first = projection.user_posts("alice", 2, 0).unwrap();
        assert_eq!(
            first.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
            vec!["t4", "t3"]
        );
        let second = projection.user_posts("alice", 2, 2).unwrap();
        assert_eq!(
            second.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
            vec!["t2", "t1"]
        );
        assert_eq!(projection.user_posts("alice", 50, 5).unwrap().len(), 0);
    }
}
