//! Removal reaper: the only place replicated entities are destroyed.

use replica_common::EntityId;
use replica_kernel::{
    EventContext, NetworkPeer, PendingRemoval, RemovedOnGameModeReload, Streamable, Streamer,
    World,
};
use serde::Serialize;

/// Outcome of one reaper pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReapStats {
    pub destroyed: usize,
    pub despawned: usize,
}

/// Destroy every entity tagged `PendingRemoval`.
///
/// Each one is first erased from every streamer that knows it, firing its
/// `despawn` callback per streamer. Destruction happens when the pass's
/// deferred scope closes.
pub fn reap(world: &mut World, peer: &dyn NetworkPeer) -> ReapStats {
    let _span = tracing::debug_span!("reap").entered();
    let pending = world.entities_with::<PendingRemoval>();
    if pending.is_empty() {
        return ReapStats::default();
    }

    let stats = world.deferred(|world| {
        let mut stats = ReapStats::default();
        let streamers = world.streamer_entities();
        for &id in &pending {
            stats.despawned += detach_from_streamers(world, peer, id, &streamers);
        }
        // Known maps of removed streamers are dropped only after every
        // despawn has fired.
        for &id in &pending {
            forget_known(world, id);
            if world.destroy(id) {
                stats.destroyed += 1;
            }
        }
        stats
    });

    tracing::debug!(
        destroyed = stats.destroyed,
        despawned = stats.despawned,
        "reaped pending entities"
    );
    stats
}

/// Erase `id` from every streamer's known map. Returns how many knew it.
fn detach_from_streamers(
    world: &mut World,
    peer: &dyn NetworkPeer,
    id: EntityId,
    streamers: &[EntityId],
) -> usize {
    let despawn = world
        .get::<Streamable>(id)
        .and_then(|s| s.events.despawn.clone());
    let mut count = 0;

    for &streamer in streamers {
        let Some(s) = world.get_mut::<Streamer>(streamer) else {
            continue;
        };
        if s.entities.remove(&id).is_none() {
            continue;
        }
        let guid = s.guid;
        count += 1;
        if let Some(despawn) = &despawn {
            let ctx = EventContext {
                peer,
                world: &*world,
            };
            despawn(&ctx, guid, id);
        }
    }

    if let Some(s) = world.get_mut::<Streamable>(id) {
        s.streamers.clear();
    }
    count
}

/// A removed streamer drops out of the reverse index of everything it knew.
fn forget_known(world: &mut World, streamer: EntityId) {
    let Some(known) = world
        .get_mut::<Streamer>(streamer)
        .map(|s| std::mem::take(&mut s.entities))
    else {
        return;
    };
    for target in known.into_keys() {
        if let Some(s) = world.get_mut::<Streamable>(target) {
            s.streamers.remove(&streamer);
        }
    }
}

/// Tag every game-mode entity for the reaper. Nothing is destroyed here.
pub fn purge_game_mode_entities(world: &mut World) -> usize {
    let ids = world.entities_with::<RemovedOnGameModeReload>();
    world.deferred(|world| {
        for &id in &ids {
            world.mark_pending_removal(id);
        }
    });
    tracing::debug!(count = ids.len(), "game mode entities marked for removal");
    ids.len()
}
