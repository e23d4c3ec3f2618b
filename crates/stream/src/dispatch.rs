//! Replication dispatch: per streamer, diff what it knows against what it can
//! see and fire the matching callbacks.

use replica_common::EntityId;
use replica_kernel::{EventContext, NetworkPeer, StreamData, Streamable, Streamer, World};
use serde::Serialize;
use std::ops::AddAssign;
use std::time::Duration;

use crate::visibility::{Candidate, Viewer, is_visible};

/// Callback counters for instrumentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplicationStats {
    pub spawned: usize,
    pub updated: usize,
    pub owner_updated: usize,
    pub despawned: usize,
    pub self_updated: usize,
}

impl AddAssign for ReplicationStats {
    fn add_assign(&mut self, rhs: Self) {
        self.spawned += rhs.spawned;
        self.updated += rhs.updated;
        self.owner_updated += rhs.owner_updated;
        self.despawned += rhs.despawned;
        self.self_updated += rhs.self_updated;
    }
}

/// Change to one (streamer, target) pair, applied to both the streamer's
/// known map and the target's reverse index once the streamer's pass is
/// over. `None` forgets the pair.
type KnownEdit = (EntityId, Option<StreamData>);

/// Run one dispatch pass over every streamer.
///
/// Visibility rules and callbacks see the store exactly as it was before the
/// streamer's pass; its edits land afterwards.
pub fn dispatch(world: &mut World, peer: &dyn NetworkPeer, now: Duration) -> ReplicationStats {
    let _span = tracing::debug_span!("dispatch").entered();
    let mut stats = ReplicationStats::default();
    let candidates = world.streamable_entities();

    for streamer in world.streamer_entities() {
        if world.is_pending_removal(streamer) {
            continue;
        }
        let Some(viewer) = Viewer::fetch(world, streamer) else {
            continue;
        };

        let mut edits = Vec::new();
        let ctx = EventContext {
            peer,
            world: &*world,
        };
        stats += diff(&ctx, &viewer, &candidates, &mut edits, now);
        apply_edits(world, streamer, edits);
    }

    tracing::trace!(
        spawned = stats.spawned,
        updated = stats.updated,
        owner_updated = stats.owner_updated,
        despawned = stats.despawned,
        "dispatch complete"
    );
    stats
}

fn apply_edits(world: &mut World, streamer: EntityId, edits: Vec<KnownEdit>) {
    let dead: Vec<EntityId> = world
        .get::<Streamer>(streamer)
        .map(|s| {
            s.entities
                .keys()
                .copied()
                .filter(|id| !world.is_alive(*id))
                .collect()
        })
        .unwrap_or_default();

    if let Some(s) = world.get_mut::<Streamer>(streamer) {
        for &(id, data) in &edits {
            match data {
                Some(data) => s.entities.insert(id, data),
                None => s.entities.remove(&id),
            };
        }
        for id in &dead {
            s.entities.remove(id);
        }
    }

    for (target, data) in edits {
        let Some(target) = world.get_mut::<Streamable>(target) else {
            continue;
        };
        match data {
            Some(data) => target.streamers.insert(streamer, data),
            None => target.streamers.remove(&streamer),
        };
    }
}

fn diff(
    ctx: &EventContext<'_>,
    viewer: &Viewer<'_>,
    candidates: &[EntityId],
    edits: &mut Vec<KnownEdit>,
    now: Duration,
) -> ReplicationStats {
    let world = ctx.world;
    let guid = viewer.streamer.guid;
    let known = &viewer.streamer.entities;
    let mut stats = ReplicationStats::default();

    for &id in candidates {
        if !world.is_alive(id) {
            continue;
        }

        if id == viewer.entity {
            if let Some(self_update) = &viewer.streamable.events.self_update {
                self_update(ctx, guid, id);
                stats.self_updated += 1;
                continue;
            }
        }

        let Some(target) = Candidate::fetch(world, id) else {
            continue;
        };
        let events = &target.streamable.events;
        let can_send = is_visible(world, viewer, &target);

        if let Some(data) = known.get(&id) {
            if !can_send {
                edits.push((id, None));
                if let Some(despawn) = &events.despawn {
                    despawn(ctx, guid, id);
                }
                stats.despawned += 1;
                tracing::debug!(viewer = %guid, entity = %id, "despawned");
                continue;
            }

            let Some(data) = refreshed(data, now, target.streamable) else {
                continue;
            };
            if viewer.streamable.owner != target.streamable.owner {
                if let Some(update) = &events.update {
                    update(ctx, guid, id);
                }
                stats.updated += 1;
            } else {
                if let Some(owner_update) = &events.owner_update {
                    owner_update(ctx, guid, id);
                }
                stats.owner_updated += 1;
            }
            edits.push((id, Some(data)));
        } else if can_send {
            let Some(spawn) = &events.spawn else {
                continue;
            };
            if spawn(ctx, guid, id) {
                edits.push((id, Some(StreamData::at(now))));
                stats.spawned += 1;
                tracing::debug!(viewer = %guid, entity = %id, "spawned");
            }
        }
    }

    stats
}

/// Throttle: due once more than `update_interval` has passed since the last
/// send. Returns the refreshed bookkeeping when due.
fn refreshed(data: &StreamData, now: Duration, target: &Streamable) -> Option<StreamData> {
    if now.saturating_sub(data.last_update) > target.update_interval {
        Some(StreamData::at(now))
    } else {
        None
    }
}
