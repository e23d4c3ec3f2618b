//! Shared types for the replica engine.

mod types;

pub use types::{EntityId, Guid, Transform};
