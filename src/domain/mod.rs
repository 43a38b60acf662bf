//! Domain layer types and invariants.

pub mod entities;
pub mod error;
pub mod posts;
pub mod search;
pub mod slug;
pub mod types;
