//! Component bundles for the two kinds of replicated entity: plain objects
//! and players.

use replica_common::{EntityId, Guid, Transform};
use replica_kernel::{
    ComponentKind, ReplicationEvents, Streamable, Streamer, TickRateRegulator, World,
};
use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::error::EngineError;

fn ensure_alive(world: &World, entity: EntityId) -> Result<(), EngineError> {
    if world.is_alive(entity) {
        Ok(())
    } else {
        Err(EngineError::EntityNotFound(entity))
    }
}

fn ensure_transform(world: &mut World, entity: EntityId) {
    if !world.has::<Transform>(entity) {
        world.insert(entity, Transform::default());
    }
}

/// Sets up replicable objects.
#[derive(Debug, Clone, Copy)]
pub struct StreamingFactory {
    default_update_interval: Duration,
}

impl StreamingFactory {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            default_update_interval: config.default_update_interval(),
        }
    }

    /// Attach Transform (if missing), Streamable and TickRateRegulator.
    ///
    /// An existing Streamable keeps its reverse index and policies; only its
    /// owner, events and intervals are reset.
    pub fn setup_server(
        &self,
        world: &mut World,
        entity: EntityId,
        owner: Guid,
        events: ReplicationEvents,
    ) -> Result<(), EngineError> {
        ensure_alive(world, entity)?;
        ensure_transform(world, entity);

        match world.get_mut::<Streamable>(entity) {
            Some(streamable) => {
                streamable.owner = owner;
                streamable.events = events;
                streamable.default_update_interval = self.default_update_interval;
                streamable.reset_update_interval();
            }
            None => {
                let streamable = Streamable::new(self.default_update_interval)
                    .with_owner(owner)
                    .with_events(events);
                world.insert(entity, streamable);
            }
        }
        world.insert(entity, TickRateRegulator::default());
        Ok(())
    }
}

/// Sets up player entities: a streamer that also replicates itself.
#[derive(Debug, Clone, Copy)]
pub struct PlayerFactory {
    range: f32,
}

impl PlayerFactory {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            range: config.default_range,
        }
    }

    /// Attach a Streamer for `guid` and mark the player's Streamable as owned
    /// by it for good. Requires the streaming archetype to be set up already.
    pub fn setup_server(
        &self,
        world: &mut World,
        entity: EntityId,
        guid: Guid,
        player_index: u16,
        nickname: impl Into<String>,
    ) -> Result<(), EngineError> {
        ensure_alive(world, entity)?;

        let Some(streamable) = world.get_mut::<Streamable>(entity) else {
            return Err(EngineError::MissingComponent {
                entity,
                component: ComponentKind::Streamable,
            });
        };
        streamable.owner = guid;
        // A player always owns itself.
        streamable.assign_owner = Some(Arc::new(|_: EntityId, _: &mut Streamable| true));

        let mut streamer = Streamer::new(guid, self.range);
        streamer.player_index = player_index;
        streamer.nickname = nickname.into();
        world.insert(entity, streamer);
        tracing::debug!(%entity, %guid, player_index, "player set up");
        Ok(())
    }
}
