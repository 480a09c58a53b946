//! Storage module for ledger and read-model persistence

pub mod store;

pub use store::{Store, StoreError};
