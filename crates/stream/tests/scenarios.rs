use glam::Vec3;
use replica_common::{EntityId, Guid, Transform};
use replica_kernel::{NetworkPeer, ReplicationEvents, Streamable, Streamer, World};
use replica_stream::{
    Candidate, EngineConfig, ServerEngine, Viewer, assign_owners, collect_range_exempt, dispatch,
    is_visible, reap, regulate,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Peer;

impl NetworkPeer for Peer {
    fn local_guid(&self) -> Guid {
        Guid(1000)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Spawn(Guid, EntityId),
    Update(Guid, EntityId),
    OwnerUpdate(Guid, EntityId),
    Despawn(Guid, EntityId),
}

type Log = Arc<Mutex<Vec<Call>>>;

fn recording(log: &Log) -> ReplicationEvents {
    let (a, b, c, d) = (log.clone(), log.clone(), log.clone(), log.clone());
    ReplicationEvents::new()
        .on_spawn(move |_, viewer, e| {
            a.lock().unwrap().push(Call::Spawn(viewer, e));
            true
        })
        .on_update(move |_, viewer, e| b.lock().unwrap().push(Call::Update(viewer, e)))
        .on_owner_update(move |_, viewer, e| c.lock().unwrap().push(Call::OwnerUpdate(viewer, e)))
        .on_despawn(move |_, viewer, e| d.lock().unwrap().push(Call::Despawn(viewer, e)))
}

fn drain(log: &Log) -> Vec<Call> {
    std::mem::take(&mut *log.lock().unwrap())
}

fn streamer(world: &mut World, guid: Guid, x: f32, range: f32) -> EntityId {
    let id = world.create();
    world.insert(id, Transform::from_position(Vec3::new(x, 0.0, 0.0)));
    world.insert(id, Streamer::new(guid, range));
    world.insert(
        id,
        Streamable::new(Duration::from_millis(16)).with_owner(guid),
    );
    id
}

fn object(world: &mut World, x: f32, log: &Log) -> EntityId {
    let id = world.create();
    world.insert(id, Transform::from_position(Vec3::new(x, 0.0, 0.0)));
    world.insert(
        id,
        Streamable::new(Duration::from_millis(16)).with_events(recording(log)),
    );
    id
}

fn visible(world: &World, viewer: EntityId, target: EntityId) -> bool {
    let viewer = Viewer::fetch(world, viewer).unwrap();
    let target = Candidate::fetch(world, target).unwrap();
    is_visible(world, &viewer, &target)
}

#[test]
fn scenario_a_spawn_registers_with_timestamp() {
    let log = Log::default();
    let mut world = World::new();
    let s = streamer(&mut world, Guid(1), 0.0, 50.0);
    let e = object(&mut world, 10.0, &log);

    assert!(visible(&world, s, e));
    let now = Duration::from_millis(500);
    dispatch(&mut world, &Peer, now);

    assert_eq!(drain(&log), vec![Call::Spawn(Guid(1), e)]);
    let known = &world.get::<Streamer>(s).unwrap().entities;
    assert_eq!(known[&e].last_update, now);
}

#[test]
fn scenario_b_leaving_range_despawns_exactly_once() {
    let log = Log::default();
    let mut world = World::new();
    let s = streamer(&mut world, Guid(1), 0.0, 50.0);
    let e = object(&mut world, 10.0, &log);
    dispatch(&mut world, &Peer, Duration::from_millis(16));
    drain(&log);

    world
        .get_mut::<Transform>(e)
        .unwrap()
        .set_position(Vec3::new(100.0, 0.0, 0.0));
    for tick in 2..6 {
        dispatch(&mut world, &Peer, Duration::from_millis(16 * tick));
    }

    assert_eq!(drain(&log), vec![Call::Despawn(Guid(1), e)]);
    assert!(!world.get::<Streamer>(s).unwrap().knows(e));
}

#[test]
fn scenario_c_closest_streamer_owns() {
    let log = Log::default();
    let mut world = World::new();
    streamer(&mut world, Guid(1), 5.0, 50.0);
    streamer(&mut world, Guid(2), 20.0, 50.0);
    let e = object(&mut world, 0.0, &log);

    assign_owners(&mut world);
    assert_eq!(world.get::<Streamable>(e).unwrap().owner, Guid(1));
}

#[test]
fn scenario_d_always_visible_crosses_virtual_worlds() {
    let log = Log::default();
    let mut world = World::new();
    let s = streamer(&mut world, Guid(1), 0.0, 50.0);
    let e = object(&mut world, 5000.0, &log);
    let data = world.get_mut::<Streamable>(e).unwrap();
    data.always_visible = true;
    data.virtual_world = 3;

    assert!(visible(&world, s, e));
}

#[test]
fn visibility_is_pure() {
    let log = Log::default();
    let mut world = World::new();
    let s = streamer(&mut world, Guid(1), 0.0, 50.0);
    let e = object(&mut world, 30.0, &log);
    let before = format!("{:?}", world.get::<Streamable>(e));
    let answers: Vec<bool> = (0..5).map(|_| visible(&world, s, e)).collect();
    assert!(answers.iter().all(|&v| v == answers[0]));
    assert_eq!(format!("{:?}", world.get::<Streamable>(e)), before);
}

#[test]
fn range_exempt_overrides_distance() {
    let log = Log::default();
    let mut world = World::new();
    let s = streamer(&mut world, Guid(1), 0.0, 50.0);
    let e = object(&mut world, 10_000.0, &log);
    assert!(!visible(&world, s, e));

    let data = world.get_mut::<Streamer>(s).unwrap();
    *data = data
        .clone()
        .with_range_exempt_collector(move |_, _, out| {
            out.insert(e);
        });
    collect_range_exempt(&mut world);
    assert!(visible(&world, s, e));
}

#[test]
fn owner_is_always_an_eligible_streamer() {
    let log = Log::default();
    let mut world = World::new();
    let near = streamer(&mut world, Guid(1), 1.0, 50.0);
    streamer(&mut world, Guid(2), 40.0, 50.0);
    streamer(&mut world, Guid(3), 900.0, 50.0);
    let objects: Vec<EntityId> = (0..20)
        .map(|i| object(&mut world, i as f32 * 7.0, &log))
        .collect();
    world.get_mut::<Streamable>(near).unwrap().virtual_world = 1;

    assign_owners(&mut world);
    for e in objects {
        let owner = world.get::<Streamable>(e).unwrap().owner;
        if !owner.is_assigned() {
            continue;
        }
        let owner_entity = world
            .query::<Streamer>()
            .find(|(_, s)| s.guid == owner)
            .map(|(id, _)| id)
            .unwrap();
        assert!(visible(&world, owner_entity, e));
    }
}

#[test]
fn resting_entities_back_off_monotonically() {
    let log = Log::default();
    let mut world = World::new();
    let e = object(&mut world, 0.0, &log);
    world.insert(e, replica_kernel::TickRateRegulator::default());
    let config = EngineConfig::default().regulator;

    let mut last = world.get::<Streamable>(e).unwrap().update_interval;
    for _ in 0..10 {
        regulate(&mut world, &config);
        let current = world.get::<Streamable>(e).unwrap().update_interval;
        assert!(current > last);
        last = current;
    }
}

#[test]
fn reaper_leaves_no_dangling_references() {
    let log = Log::default();
    let mut world = World::new();
    let viewers: Vec<EntityId> = (0..3)
        .map(|i| streamer(&mut world, Guid(i + 1), i as f32, 50.0))
        .collect();
    let e = object(&mut world, 0.0, &log);
    dispatch(&mut world, &Peer, Duration::from_millis(16));
    drain(&log);

    world.mark_pending_removal(e);
    reap(&mut world, &Peer);

    let despawns = drain(&log)
        .into_iter()
        .filter(|c| matches!(c, Call::Despawn(_, id) if *id == e))
        .count();
    assert_eq!(despawns, 3);
    for v in viewers {
        assert!(!world.get::<Streamer>(v).unwrap().knows(e));
    }
}

#[test]
fn engine_drives_full_lifecycle() {
    let log = Log::default();
    let config = EngineConfig::from_yaml_str("tick_rate_hz: 50\nstreaming_tick_ms: 20\n").unwrap();
    let mut engine = ServerEngine::new(config, Arc::new(Peer)).unwrap();
    let player = engine.spawn_player(Guid(7), "bob", 0).unwrap();
    let e = engine.spawn_object().unwrap();
    engine.set_events(e, recording(&log)).unwrap();
    engine.set_position(e, Vec3::new(20.0, 0.0, 0.0)).unwrap();

    let tick = Duration::from_millis(20);
    for _ in 0..8 {
        engine.update(tick);
    }
    assert!(engine.is_owner(e, Guid(7)));
    assert_eq!(engine.owner_of(e), Some(player));
    let calls = drain(&log);
    assert_eq!(calls.first(), Some(&Call::Spawn(Guid(7), e)));
    assert!(calls.contains(&Call::OwnerUpdate(Guid(7), e)));

    engine.set_position(e, Vec3::new(500.0, 0.0, 0.0)).unwrap();
    engine.update(tick);
    assert_eq!(drain(&log), vec![Call::Despawn(Guid(7), e)]);
    assert!(engine.stats().replication.spawned >= 1);
}
