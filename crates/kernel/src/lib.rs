//! World Kernel: the entity store and the components replication runs over.
//!
//! # Invariants
//! - Entity handles are generation-checked; a destroyed handle never resolves.
//! - Structural changes requested inside a deferred scope are applied only
//!   when the outermost scope ends, in the order they were requested.
//! - All state mutations flow through explicit operations.

pub mod components;
pub mod policy;
pub mod world;

pub use components::{
    HeuristicMode, Name, PendingRemoval, RemovedOnGameModeReload, StreamData, Streamable,
    Streamer, TickRateRegulator, VisibilityOverride,
};
pub use policy::{
    EventContext, EventProc, NetworkPeer, OwnershipPolicy, RangeExemptCollector,
    ReplicationEvents, SpawnProc, VisibilityPolicy,
};
pub use world::{Component, ComponentKind, World, WorldCommand, WorldEvent};
