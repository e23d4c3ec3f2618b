use glam::{Quat, Vec3};
use replica_common::{EntityId, Guid, Transform};
use replica_kernel::{
    ComponentKind, NetworkPeer, RemovedOnGameModeReload, ReplicationEvents, Streamable, Streamer,
    TickRateRegulator, World, WorldEvent,
};
use serde::Serialize;
use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Duration;

use crate::archetypes::{PlayerFactory, StreamingFactory};
use crate::config::EngineConfig;
use crate::dispatch::{ReplicationStats, dispatch};
use crate::error::EngineError;
use crate::exempt::collect_range_exempt;
use crate::ownership::assign_owners;
use crate::reaper::{ReapStats, purge_game_mode_entities, reap};
use crate::regulator::{RegulatorStats, regulate};
use crate::schedule::Interval;
use crate::visibility;

/// Slow jobs run at this multiple of the streaming tick.
const SLOW_JOB_FACTOR: u32 = 4;

/// What each job did during one `update`. `None` means the job was not due.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub owner_changes: Option<usize>,
    pub range_exempt: Option<usize>,
    pub regulator: Option<RegulatorStats>,
    pub replication: Option<ReplicationStats>,
    pub reaped: Option<ReapStats>,
    /// Entities created since the previous `update`.
    pub created: usize,
    /// Entities destroyed since the previous `update`.
    pub destroyed: usize,
}

/// Totals since the engine started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub ticks: u64,
    pub created: usize,
    pub owner_changes: usize,
    pub replication: ReplicationStats,
    pub regulator_active: usize,
    pub regulator_resting: usize,
    pub destroyed: usize,
}

impl AddAssign<&TickReport> for EngineStats {
    fn add_assign(&mut self, report: &TickReport) {
        self.ticks += 1;
        self.created += report.created;
        self.owner_changes += report.owner_changes.unwrap_or(0);
        if let Some(replication) = report.replication {
            self.replication += replication;
        }
        if let Some(regulator) = report.regulator {
            self.regulator_active += regulator.active;
            self.regulator_resting += regulator.resting;
        }
        if let Some(reaped) = report.reaped {
            self.replication.despawned += reaped.despawned;
        }
        self.destroyed += report.destroyed;
    }
}

#[derive(Debug, Clone, Copy)]
struct Jobs {
    ownership: Interval,
    range_exempt: Interval,
    regulator: Interval,
    dispatch: Interval,
    reaper: Interval,
}

impl Jobs {
    fn new(config: &EngineConfig) -> Self {
        let streaming = config.streaming_tick();
        let slow = streaming * SLOW_JOB_FACTOR;
        Self {
            ownership: Interval::new(slow),
            range_exempt: Interval::new(slow),
            regulator: Interval::new(config.regulator.interval()),
            dispatch: Interval::new(streaming),
            reaper: Interval::new(slow),
        }
    }
}

/// Server-side replication scheduler.
///
/// Owns the world and drives the periodic jobs from `update`, in order:
/// ownership arbitration, range-exempt collection, tick-rate regulation,
/// replication dispatch, then the removal reaper. Each job is gated by its
/// own interval.
pub struct ServerEngine {
    world: World,
    peer: Arc<dyn NetworkPeer>,
    config: EngineConfig,
    streaming: StreamingFactory,
    players: PlayerFactory,
    jobs: Jobs,
    now: Duration,
    stats: EngineStats,
}

impl ServerEngine {
    pub fn new(config: EngineConfig, peer: Arc<dyn NetworkPeer>) -> Result<Self, EngineError> {
        config.validate()?;
        tracing::info!(
            tick_rate_hz = config.tick_rate_hz,
            streaming_tick = ?config.streaming_tick(),
            "replication engine started"
        );
        Ok(Self {
            world: World::new(),
            streaming: StreamingFactory::new(&config),
            players: PlayerFactory::new(&config),
            jobs: Jobs::new(&config),
            peer,
            config,
            now: Duration::ZERO,
            stats: EngineStats::default(),
        })
    }

    /// The store every job runs over.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable store access for components the engine API does not cover.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// The validated configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The transport handed to every replication callback.
    pub fn peer(&self) -> &dyn NetworkPeer {
        self.peer.as_ref()
    }

    /// Engine time: the sum of every `delta` passed to `update`.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Totals accumulated over every `update`.
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Advance time by `delta` and run every job that is due.
    pub fn update(&mut self, delta: Duration) -> TickReport {
        self.now += delta;
        let _span = tracing::debug_span!("tick", now = ?self.now).entered();
        let peer = self.peer.as_ref();
        let mut report = TickReport::default();

        if self.jobs.ownership.advance(delta) {
            report.owner_changes = Some(assign_owners(&mut self.world));
        }
        if self.jobs.range_exempt.advance(delta) {
            report.range_exempt = Some(collect_range_exempt(&mut self.world));
        }
        if self.jobs.regulator.advance(delta) {
            report.regulator = Some(regulate(&mut self.world, &self.config.regulator));
        }
        if self.jobs.dispatch.advance(delta) {
            report.replication = Some(dispatch(&mut self.world, peer, self.now));
        }
        if self.jobs.reaper.advance(delta) {
            report.reaped = Some(reap(&mut self.world, peer));
        }

        for event in self.world.drain_events() {
            match event {
                WorldEvent::Created { .. } => report.created += 1,
                WorldEvent::Destroyed { .. } => report.destroyed += 1,
            }
        }
        self.stats += &report;
        report
    }

    /// A bare entity with no replication components.
    pub fn create_entity(&mut self) -> EntityId {
        self.world.create()
    }

    /// Spawn a player: a streamer at the origin that owns itself.
    pub fn spawn_player(
        &mut self,
        guid: Guid,
        nickname: impl Into<String>,
        player_index: u16,
    ) -> Result<EntityId, EngineError> {
        let nickname = nickname.into();
        let entity = self.world.create_named(nickname.clone());
        self.streaming
            .setup_server(&mut self.world, entity, guid, ReplicationEvents::new())?;
        self.players
            .setup_server(&mut self.world, entity, guid, player_index, nickname)?;
        Ok(entity)
    }

    /// Spawn a replicable object at the origin, owned by the local peer
    /// until the ownership job reassigns it.
    pub fn spawn_object(&mut self) -> Result<EntityId, EngineError> {
        let entity = self.world.create();
        self.streaming.setup_server(
            &mut self.world,
            entity,
            self.peer.local_guid(),
            ReplicationEvents::new(),
        )?;
        Ok(entity)
    }

    /// Replace the replication callbacks of a streamable.
    pub fn set_events(
        &mut self,
        entity: EntityId,
        events: ReplicationEvents,
    ) -> Result<(), EngineError> {
        self.streamable_mut(entity)?.events = events;
        Ok(())
    }

    /// Overwrite the owner of a streamable. The ownership job may reassign
    /// it unless the entity's policy keeps it.
    pub fn set_owner(&mut self, entity: EntityId, owner: Guid) -> Result<(), EngineError> {
        self.streamable_mut(entity)?.owner = owner;
        Ok(())
    }

    /// The streamer entity whose GUID owns `entity`.
    pub fn owner_of(&self, entity: EntityId) -> Option<EntityId> {
        let owner = self.world.get::<Streamable>(entity)?.owner;
        if !owner.is_assigned() {
            return None;
        }
        self.entity_by_guid(owner)
    }

    /// True if `guid` currently owns `entity`.
    pub fn is_owner(&self, entity: EntityId, guid: Guid) -> bool {
        self.world
            .get::<Streamable>(entity)
            .is_some_and(|s| s.owner == guid)
    }

    /// The streamer entity registered for `guid`.
    pub fn entity_by_guid(&self, guid: Guid) -> Option<EntityId> {
        self.world
            .query::<Streamer>()
            .find(|(_, s)| s.guid == guid)
            .map(|(id, _)| id)
    }

    /// Every streamer that can see `entity` right now, in store order.
    ///
    /// ```
    /// use std::sync::Arc;
    /// use replica_common::Guid;
    /// use replica_kernel::NetworkPeer;
    /// use replica_stream::{EngineConfig, ServerEngine};
    ///
    /// struct Server;
    /// impl NetworkPeer for Server {
    ///     fn local_guid(&self) -> Guid {
    ///         Guid(0)
    ///     }
    /// }
    ///
    /// let mut engine = ServerEngine::new(EngineConfig::default(), Arc::new(Server)).unwrap();
    /// let player = engine.spawn_player(Guid(1), "ada", 0).unwrap();
    /// let barrel = engine.spawn_object().unwrap();
    /// assert_eq!(engine.find_visible_streamers(barrel), vec![player]);
    ///
    /// engine.set_owner(barrel, Guid(1)).unwrap();
    /// assert!(engine.is_owner(barrel, Guid(1)));
    /// assert_eq!(engine.owner_of(barrel), Some(player));
    /// ```
    pub fn find_visible_streamers(&self, entity: EntityId) -> Vec<EntityId> {
        visibility::find_visible_streamers(&self.world, entity)
    }

    /// Queue an entity for the reaper.
    pub fn remove_entity(&mut self, entity: EntityId) -> Result<(), EngineError> {
        if self.world.mark_pending_removal(entity) {
            Ok(())
        } else {
            Err(EngineError::EntityNotFound(entity))
        }
    }

    /// Tag an entity as belonging to the running game mode.
    pub fn mark_removed_on_reload(&mut self, entity: EntityId) -> Result<(), EngineError> {
        if self.world.insert(entity, RemovedOnGameModeReload) {
            Ok(())
        } else {
            Err(EngineError::EntityNotFound(entity))
        }
    }

    /// Queue every game-mode entity for the reaper.
    pub fn purge_game_mode_entities(&mut self) -> usize {
        purge_game_mode_entities(&mut self.world)
    }

    /// Put a regulated entity back on its default update interval and make
    /// the next regulator pass treat it as active. Entities without a
    /// regulator are left untouched.
    pub fn wake_entity(&mut self, entity: EntityId) -> Result<(), EngineError> {
        if !self.world.is_alive(entity) {
            return Err(EngineError::EntityNotFound(entity));
        }
        if !self.world.has::<TickRateRegulator>(entity) {
            return Ok(());
        }
        let generation = self.transform(entity)?.generation();
        if let Some(regulator) = self.world.get_mut::<TickRateRegulator>(entity) {
            regulator.last_generation = generation.wrapping_sub(1);
        }
        if let Some(streamable) = self.world.get_mut::<Streamable>(entity) {
            streamable.reset_update_interval();
        }
        Ok(())
    }

    pub fn set_position(&mut self, entity: EntityId, position: Vec3) -> Result<(), EngineError> {
        self.transform_mut(entity)?.set_position(position);
        self.wake_entity(entity)
    }

    pub fn set_rotation(&mut self, entity: EntityId, rotation: Quat) -> Result<(), EngineError> {
        self.transform_mut(entity)?.set_rotation(rotation);
        self.wake_entity(entity)
    }

    pub fn set_velocity(&mut self, entity: EntityId, velocity: Vec3) -> Result<(), EngineError> {
        self.transform_mut(entity)?.set_velocity(velocity);
        self.wake_entity(entity)
    }

    /// Queue every entity for removal and reap immediately, despawning
    /// everything from every streamer.
    pub fn shutdown(&mut self) -> ReapStats {
        let ids: Vec<EntityId> = self.world.entities().collect();
        self.world.deferred(|world| {
            for &id in &ids {
                world.mark_pending_removal(id);
            }
        });
        let stats = reap(&mut self.world, self.peer.as_ref());
        for event in self.world.drain_events() {
            match event {
                WorldEvent::Created { .. } => self.stats.created += 1,
                WorldEvent::Destroyed { .. } => self.stats.destroyed += 1,
            }
        }
        tracing::info!(destroyed = stats.destroyed, "replication engine shut down");
        stats
    }

    fn transform(&self, entity: EntityId) -> Result<&Transform, EngineError> {
        if !self.world.is_alive(entity) {
            return Err(EngineError::EntityNotFound(entity));
        }
        self.world
            .get::<Transform>(entity)
            .ok_or(EngineError::MissingComponent {
                entity,
                component: ComponentKind::Transform,
            })
    }

    fn transform_mut(&mut self, entity: EntityId) -> Result<&mut Transform, EngineError> {
        if !self.world.is_alive(entity) {
            return Err(EngineError::EntityNotFound(entity));
        }
        self.world
            .get_mut::<Transform>(entity)
            .ok_or(EngineError::MissingComponent {
                entity,
                component: ComponentKind::Transform,
            })
    }

    fn streamable_mut(&mut self, entity: EntityId) -> Result<&mut Streamable, EngineError> {
        if !self.world.is_alive(entity) {
            return Err(EngineError::EntityNotFound(entity));
        }
        self.world
            .get_mut::<Streamable>(entity)
            .ok_or(EngineError::MissingComponent {
                entity,
                component: ComponentKind::Streamable,
            })
    }
}

impl std::fmt::Debug for ServerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerEngine")
            .field("local_guid", &self.peer.local_guid())
            .field("config", &self.config)
            .field("now", &self.now)
            .field("entities", &self.world.entity_count())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
