use replica_common::{EntityId, Transform};
use replica_ecs::{CommandQueue, ComponentStorage, EntityAllocator};

use crate::components::{
    Name, PendingRemoval, RemovedOnGameModeReload, Streamable, Streamer, TickRateRegulator,
};

/// Structural event recorded for every entity created or destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldEvent {
    Created { id: EntityId },
    Destroyed { id: EntityId },
}

/// Identifies a component type without naming it generically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Name,
    Transform,
    Streamable,
    Streamer,
    TickRateRegulator,
    PendingRemoval,
    RemovedOnGameModeReload,
}

/// A structural change queued while the world is deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldCommand {
    Destroy(EntityId),
    Detach(EntityId, ComponentKind),
    MarkPendingRemoval(EntityId),
}

/// A type the world has storage for.
pub trait Component: Sized + 'static {
    const KIND: ComponentKind;

    fn storage(world: &World) -> &ComponentStorage<Self>;
    fn storage_mut(world: &mut World) -> &mut ComponentStorage<Self>;
}

macro_rules! component {
    ($ty:ty, $kind:ident, $field:ident) => {
        impl Component for $ty {
            const KIND: ComponentKind = ComponentKind::$kind;

            fn storage(world: &World) -> &ComponentStorage<Self> {
                &world.$field
            }

            fn storage_mut(world: &mut World) -> &mut ComponentStorage<Self> {
                &mut world.$field
            }
        }
    };
}

component!(Name, Name, names);
component!(Transform, Transform, transforms);
component!(Streamable, Streamable, streamables);
component!(Streamer, Streamer, streamers);
component!(TickRateRegulator, TickRateRegulator, regulators);
component!(PendingRemoval, PendingRemoval, pending_removal);
component!(RemovedOnGameModeReload, RemovedOnGameModeReload, removed_on_reload);

/// The entity store replication runs over.
///
/// Entities are generation-checked handles into an arena; each component type
/// has its own ordered storage, so every query iterates in `EntityId` order.
/// While a deferred scope is open, `destroy`, `detach` and
/// `mark_pending_removal` are queued and applied when the outermost scope
/// ends.
#[derive(Debug, Default)]
pub struct World {
    entities: EntityAllocator,
    names: ComponentStorage<Name>,
    transforms: ComponentStorage<Transform>,
    streamables: ComponentStorage<Streamable>,
    streamers: ComponentStorage<Streamer>,
    regulators: ComponentStorage<TickRateRegulator>,
    pending_removal: ComponentStorage<PendingRemoval>,
    removed_on_reload: ComponentStorage<RemovedOnGameModeReload>,
    commands: CommandQueue<WorldCommand>,
    event_log: Vec<WorldEvent>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        self.entities.is_alive(id)
    }

    /// Live entity handles in index order.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter()
    }

    /// Drain and return the structural event log. The log grows with every
    /// create and destroy until its owner drains it.
    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.event_log)
    }

    /// Read-only access to the event log.
    pub fn events(&self) -> &[WorldEvent] {
        &self.event_log
    }

    pub fn create(&mut self) -> EntityId {
        let id = self.entities.allocate();
        self.event_log.push(WorldEvent::Created { id });
        tracing::trace!(%id, "entity created");
        id
    }

    pub fn create_named(&mut self, name: impl Into<String>) -> EntityId {
        let id = self.create();
        self.names.insert(id, Name(name.into()));
        id
    }

    /// First live entity carrying the given name.
    pub fn lookup(&self, name: &str) -> Option<EntityId> {
        self.names
            .iter()
            .find(|(_, n)| n.0 == name)
            .map(|(id, _)| id)
    }

    /// Destroy an entity and all of its components. Deferred while a scope is
    /// open. Returns false for a stale handle.
    pub fn destroy(&mut self, id: EntityId) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        if self.commands.is_deferred() {
            self.commands.push(WorldCommand::Destroy(id));
            return true;
        }
        for kind in ALL_KINDS {
            self.remove_kind(id, kind);
        }
        self.entities.free(id);
        self.event_log.push(WorldEvent::Destroyed { id });
        tracing::debug!(%id, "entity destroyed");
        true
    }

    /// Attach or replace a component. Returns false for a stale handle.
    pub fn insert<T: Component>(&mut self, id: EntityId, value: T) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        T::storage_mut(self).insert(id, value);
        true
    }

    /// Detach a component immediately, returning it.
    pub fn remove<T: Component>(&mut self, id: EntityId) -> Option<T> {
        T::storage_mut(self).remove(id)
    }

    /// Detach a component, deferred while a scope is open.
    pub fn detach<T: Component>(&mut self, id: EntityId) {
        if self.commands.is_deferred() {
            self.commands.push(WorldCommand::Detach(id, T::KIND));
        } else {
            T::storage_mut(self).remove(id);
        }
    }

    pub fn get<T: Component>(&self, id: EntityId) -> Option<&T> {
        T::storage(self).get(id)
    }

    pub fn get_mut<T: Component>(&mut self, id: EntityId) -> Option<&mut T> {
        T::storage_mut(self).get_mut(id)
    }

    pub fn has<T: Component>(&self, id: EntityId) -> bool {
        T::storage(self).contains(id)
    }

    /// Iterate `(id, &T)` in index order.
    pub fn query<T: Component>(&self) -> impl Iterator<Item = (EntityId, &T)> {
        T::storage(self).iter()
    }

    /// Snapshot of every entity carrying `T`.
    pub fn entities_with<T: Component>(&self) -> Vec<EntityId> {
        T::storage(self).ids().collect()
    }

    /// Entities carrying both a `Transform` and a `Streamable`.
    pub fn streamable_entities(&self) -> Vec<EntityId> {
        self.streamables
            .ids()
            .filter(|id| self.transforms.contains(*id))
            .collect()
    }

    /// Entities carrying a `Streamer`.
    pub fn streamer_entities(&self) -> Vec<EntityId> {
        self.streamers.ids().collect()
    }

    pub fn is_pending_removal(&self, id: EntityId) -> bool {
        self.pending_removal.contains(id)
    }

    /// Tag an entity for the reaper. Deferred while a scope is open.
    pub fn mark_pending_removal(&mut self, id: EntityId) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        if self.commands.is_deferred() {
            self.commands.push(WorldCommand::MarkPendingRemoval(id));
        } else {
            self.pending_removal.insert(id, PendingRemoval);
        }
        true
    }

    pub fn is_deferred(&self) -> bool {
        self.commands.is_deferred()
    }

    /// Open a deferred scope. Scopes nest.
    pub fn defer_begin(&mut self) {
        self.commands.begin();
    }

    /// Close a deferred scope; the outermost close applies queued commands.
    pub fn defer_end(&mut self) {
        if let Some(batch) = self.commands.end() {
            if !batch.is_empty() {
                tracing::trace!(commands = batch.len(), "flushing deferred commands");
            }
            for command in batch {
                self.apply(command);
            }
        }
    }

    /// Run `f` inside a deferred scope.
    pub fn deferred<R>(&mut self, f: impl FnOnce(&mut World) -> R) -> R {
        self.defer_begin();
        let result = f(self);
        self.defer_end();
        result
    }

    fn apply(&mut self, command: WorldCommand) {
        match command {
            WorldCommand::Destroy(id) => {
                self.destroy(id);
            }
            WorldCommand::Detach(id, kind) => self.remove_kind(id, kind),
            WorldCommand::MarkPendingRemoval(id) => {
                self.mark_pending_removal(id);
            }
        }
    }

    fn remove_kind(&mut self, id: EntityId, kind: ComponentKind) {
        match kind {
            ComponentKind::Name => {
                self.names.remove(id);
            }
            ComponentKind::Transform => {
                self.transforms.remove(id);
            }
            ComponentKind::Streamable => {
                self.streamables.remove(id);
            }
            ComponentKind::Streamer => {
                self.streamers.remove(id);
            }
            ComponentKind::TickRateRegulator => {
                self.regulators.remove(id);
            }
            ComponentKind::PendingRemoval => {
                self.pending_removal.remove(id);
            }
            ComponentKind::RemovedOnGameModeReload => {
                self.removed_on_reload.remove(id);
            }
        }
    }
}

const ALL_KINDS: [ComponentKind; 7] = [
    ComponentKind::Name,
    ComponentKind::Transform,
    ComponentKind::Streamable,
    ComponentKind::Streamer,
    ComponentKind::TickRateRegulator,
    ComponentKind::PendingRemoval,
    ComponentKind::RemovedOnGameModeReload,
];
