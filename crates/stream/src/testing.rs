//! Fixtures shared by the unit tests.

use glam::Vec3;
use replica_common::{EntityId, Guid, Transform};
use replica_kernel::{
    NetworkPeer, ReplicationEvents, Streamable, Streamer, TickRateRegulator, World,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TICK: Duration = Duration::from_millis(16);

pub struct TestPeer;

impl NetworkPeer for TestPeer {
    fn local_guid(&self) -> Guid {
        Guid(0xAA)
    }
}

/// One callback invocation: (viewer, entity).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sent {
    Spawn(Guid, EntityId),
    Update(Guid, EntityId),
    OwnerUpdate(Guid, EntityId),
    Despawn(Guid, EntityId),
    SelfUpdate(Guid, EntityId),
}

/// Records every replication callback it is wired into.
#[derive(Clone)]
pub struct Recorder {
    log: Arc<Mutex<Vec<Sent>>>,
    accept_spawns: Arc<AtomicBool>,
}

impl Default for Recorder {
    fn default() -> Self {
        Self {
            log: Arc::default(),
            accept_spawns: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl Recorder {
    pub fn events(&self) -> ReplicationEvents {
        let (spawn, update, owner_update, despawn) = (
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
        );
        ReplicationEvents::new()
            .on_spawn(move |_, viewer, e| {
                spawn.push(Sent::Spawn(viewer, e));
                spawn.accept_spawns.load(Ordering::SeqCst)
            })
            .on_update(move |_, viewer, e| update.push(Sent::Update(viewer, e)))
            .on_owner_update(move |_, viewer, e| owner_update.push(Sent::OwnerUpdate(viewer, e)))
            .on_despawn(move |_, viewer, e| despawn.push(Sent::Despawn(viewer, e)))
    }

    pub fn with_self_update(&self) -> ReplicationEvents {
        let this = self.clone();
        self.events()
            .on_self_update(move |_, viewer, e| this.push(Sent::SelfUpdate(viewer, e)))
    }

    pub fn set_accept_spawns(&self, accept: bool) {
        self.accept_spawns.store(accept, Ordering::SeqCst);
    }

    fn push(&self, sent: Sent) {
        self.log.lock().unwrap().push(sent);
    }

    pub fn take(&self) -> Vec<Sent> {
        std::mem::take(&mut *self.log.lock().unwrap())
    }
}

/// A viewer with Transform, Streamer and a Streamable it owns.
pub fn spawn_viewer(world: &mut World, guid: Guid, position: Vec3, range: f32) -> EntityId {
    let id = world.create();
    world.insert(id, Transform::from_position(position));
    world.insert(id, Streamer::new(guid, range));
    world.insert(id, Streamable::new(TICK).with_owner(guid));
    id
}

/// A plain replicable object.
pub fn spawn_target(world: &mut World, position: Vec3) -> EntityId {
    let id = world.create();
    world.insert(id, Transform::from_position(position));
    world.insert(id, Streamable::new(TICK));
    world.insert(id, TickRateRegulator::default());
    id
}

pub fn spawn_recorded(world: &mut World, position: Vec3, recorder: &Recorder) -> EntityId {
    let id = spawn_target(world, position);
    if let Some(s) = world.get_mut::<Streamable>(id) {
        s.events = recorder.events();
    }
    id
}
