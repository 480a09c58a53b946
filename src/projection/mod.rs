//! Social read model derived from the ledger

pub mod engine;
pub mod model;
pub mod tags;

pub use engine::Projection;
pub use model::{Follow, Like, Post, User};
pub use tags::extract_tags;
