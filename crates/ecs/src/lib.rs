//! Minimal deterministic ECS building blocks.
//!
//! Entities live in a generation-checked arena; components are stored in one
//! BTreeMap per type keyed by `EntityId`, so iteration order is deterministic.
//! Structural changes requested while a pass is iterating are queued and
//! applied once the outermost deferred scope closes.
//!
//! # Invariants
//! - A handle is alive iff its slot is occupied and the generations match.
//! - Recycled slots always carry a strictly newer generation.
//! - Queued commands are applied in the order they were recorded.

mod command;
mod entity;
mod storage;

pub use command::CommandQueue;
pub use entity::EntityAllocator;
pub use storage::ComponentStorage;
