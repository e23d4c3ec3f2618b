//! Streaming: interest management and replication scheduling.
//!
//! Decides, per connected viewer, which entities it may know about, who owns
//! each entity, and how often each entity's state is pushed to each viewer.
//!
//! # Invariants
//! - An entity pending removal is never visible and is detached from every
//!   streamer before it is destroyed.
//! - Only the reaper destroys replicated entities.
//! - The regulator never lowers an update interval below its default.
//! - A streamer's known map and each entity's reverse index agree after
//!   every dispatch and reaper pass.
//!
//! # Workaround
//! Visibility is a brute-force scan of every (streamer, entity) pair each
//! dispatch. A spatial partition would narrow the candidate set without
//! changing the results.

mod archetypes;
mod config;
mod dispatch;
mod engine;
mod error;
mod exempt;
mod ownership;
mod reaper;
mod regulator;
mod schedule;
mod visibility;

#[cfg(test)]
mod testing;

pub use archetypes::{PlayerFactory, StreamingFactory};
pub use config::{ConfigError, EngineConfig, RegulatorConfig};
pub use dispatch::{ReplicationStats, dispatch};
pub use engine::{EngineStats, ServerEngine, TickReport};
pub use error::EngineError;
pub use exempt::collect_range_exempt;
pub use ownership::{assign_owners, closest_streamer};
pub use reaper::{ReapStats, purge_game_mode_entities, reap};
pub use regulator::{RegulatorStats, regulate};
pub use schedule::Interval;
pub use visibility::{Candidate, Viewer, find_visible_streamers, is_visible};

pub fn crate_info() -> &'static str {
    "replica-stream v0.1.0"
}
