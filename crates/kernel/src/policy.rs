//! Extension points: per-entity policies and replication event callbacks.
//!
//! Every policy trait is implemented for plain closures, so callers usually
//! install them through the `with_*` builders on the components.

use replica_common::{EntityId, Guid};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::components::Streamable;
use crate::world::World;

/// The transport endpoint the engine replicates through.
///
/// Sending is the transport's business and happens inside the event
/// callbacks; the engine itself only needs the local identity.
pub trait NetworkPeer: Send + Sync {
    fn local_guid(&self) -> Guid;
}

/// Read-only view handed to every replication callback.
pub struct EventContext<'a> {
    pub peer: &'a dyn NetworkPeer,
    pub world: &'a World,
}

/// Spawn callback. Returning `false` means "not ready yet"; the entity stays
/// unknown and the spawn is retried on the next dispatch.
pub type SpawnProc = Arc<dyn Fn(&EventContext<'_>, Guid, EntityId) -> bool + Send + Sync>;

/// Update, owner-update, despawn and self-update callbacks.
pub type EventProc = Arc<dyn Fn(&EventContext<'_>, Guid, EntityId) + Send + Sync>;

/// The five optional replication callbacks of a streamable entity.
#[derive(Clone, Default)]
pub struct ReplicationEvents {
    pub spawn: Option<SpawnProc>,
    pub update: Option<EventProc>,
    pub owner_update: Option<EventProc>,
    pub despawn: Option<EventProc>,
    pub self_update: Option<EventProc>,
}

impl ReplicationEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_spawn(
        mut self,
        f: impl Fn(&EventContext<'_>, Guid, EntityId) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.spawn = Some(Arc::new(f));
        self
    }

    pub fn on_update(
        mut self,
        f: impl Fn(&EventContext<'_>, Guid, EntityId) + Send + Sync + 'static,
    ) -> Self {
        self.update = Some(Arc::new(f));
        self
    }

    pub fn on_owner_update(
        mut self,
        f: impl Fn(&EventContext<'_>, Guid, EntityId) + Send + Sync + 'static,
    ) -> Self {
        self.owner_update = Some(Arc::new(f));
        self
    }

    pub fn on_despawn(
        mut self,
        f: impl Fn(&EventContext<'_>, Guid, EntityId) + Send + Sync + 'static,
    ) -> Self {
        self.despawn = Some(Arc::new(f));
        self
    }

    pub fn on_self_update(
        mut self,
        f: impl Fn(&EventContext<'_>, Guid, EntityId) + Send + Sync + 'static,
    ) -> Self {
        self.self_update = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for ReplicationEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicationEvents")
            .field("spawn", &self.spawn.is_some())
            .field("update", &self.update.is_some())
            .field("owner_update", &self.owner_update.is_some())
            .field("despawn", &self.despawn.is_some())
            .field("self_update", &self.self_update.is_some())
            .finish()
    }
}

/// Custom visibility rule for a target entity, evaluated from a streamer.
pub trait VisibilityPolicy: Send + Sync {
    fn is_visible(&self, world: &World, streamer: EntityId, target: EntityId) -> bool;
}

impl<F> VisibilityPolicy for F
where
    F: Fn(&World, EntityId, EntityId) -> bool + Send + Sync,
{
    fn is_visible(&self, world: &World, streamer: EntityId, target: EntityId) -> bool {
        self(world, streamer, target)
    }
}

/// Custom ownership assignment. Returning `true` tells the arbiter the
/// policy has handled ownership and the default closest-streamer rule must
/// not run.
pub trait OwnershipPolicy: Send + Sync {
    fn assign_owner(&self, entity: EntityId, streamable: &mut Streamable) -> bool;
}

impl<F> OwnershipPolicy for F
where
    F: Fn(EntityId, &mut Streamable) -> bool + Send + Sync,
{
    fn assign_owner(&self, entity: EntityId, streamable: &mut Streamable) -> bool {
        self(entity, streamable)
    }
}

/// Repopulates a streamer's range-exempt set. The set arrives cleared.
pub trait RangeExemptCollector: Send + Sync {
    fn collect(&self, world: &World, streamer: EntityId, exempt: &mut BTreeSet<EntityId>);
}

impl<F> RangeExemptCollector for F
where
    F: Fn(&World, EntityId, &mut BTreeSet<EntityId>) + Send + Sync,
{
    fn collect(&self, world: &World, streamer: EntityId, exempt: &mut BTreeSet<EntityId>) {
        self(world, streamer, exempt)
    }
}
