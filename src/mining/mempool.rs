//! Transaction pool for pending transactions
//!
//! Pending transactions live in the store's mempool tree and survive
//! restarts. Insertion is an upsert by ID (latest submission wins), and
//! the mining snapshot orders by (timestamp, id) so every node folds the
//! same pending set into a candidate block the same way.

use std::sync::Arc;

use crate::core::transaction::Transaction;
use crate::storage::{Store, StoreError};

/// Persistent pool of transactions awaiting inclusion in a block
pub struct Mempool {
    store: Arc<Store>,
}

impl Mempool {
    pub fn new(store: Arc<Store>) -> Self {
        Mempool { store }
    }

    /// Admits a transaction; a resubmitted ID replaces the earlier entry
    pub fn insert(&self, tx: &Transaction) -> Result<(), StoreError> {
        self.store.upsert_mempool_tx(tx)
    }

    /// Pending transactions ordered by (timestamp, id)
    pub fn snapshot(&self) -> Result<Vec<Transaction>, StoreError> {
        self.store.mempool_txs()
    }

    /// Removes exactly the given IDs; entries admitted after a mining
    /// snapshot was taken are untouched
    pub fn remove_ids(&self, ids: &[String]) -> Result<(), StoreError> {
        self.store.remove_mempool_txs(ids)
    }

    pub fn len(&self) -> usize {
        self.store.mempool_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mempool() -> Mempool {
        Mempool::new(Arc::new(Store::temporary().unwrap()))
    }

    fn tx(id: &str, timestamp: i64) -> Transaction {
        Transaction {
            id: id.into(),
            from: "alice".into(),
            to: "posts".into(),
            content: "hi".into(),
            timestamp,
        }
    }

    #[test]
    fn test_snapshot_orders_by_timestamp_then_id() {
        let pool = mempool();
        pool.insert(&tx("z", 100)).unwrap();
        pool.insert(&tx("a", 300)).unwrap();
        pool.insert(&tx("m", 100)).unwrap();

        let ids: Vec<String> = pool.snapshot().unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["m", "z", "a"]);
    }

    #[test]
    fn test_resubmission_replaces() {
        let pool = mempool();
        pool.insert(&tx("a", 100)).unwrap();
        let mut updated = tx("a", 100);
        updated.content = "second".into();
        pool.insert(&updated).unwrap();

        let snapshot = pool.snapshot().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].content, "second");
    }

    #[test]
    fn test_remove_ids_spares_later_arrivals() {
        let pool = mempool();
        pool.insert(&tx("a", 100)).unwrap();
        pool.insert(&tx("b", 200)).unwrap();
        let snapshot_ids: Vec<String> =
            pool.snapshot().unwrap().into_iter().map(|t| t.id).collect();

        // Arrives after the snapshot was taken
        pool.insert(&tx("c", 300)).unwrap();

        pool.remove_ids(&snapshot_ids).unwrap();
        let remaining = pool.snapshot().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "c");
    }

    #[test]
    fn test_len_and_is_empty() {
        let pool = mempool();
        assert!(pool.is_empty());
        pool.insert(&tx("a", 100)).unwrap();
        assert_eq!(pool.len(), 1);
        assert!(!pool.is_empty());
    }
}
