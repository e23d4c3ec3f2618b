//! Visibility evaluation: may this streamer know about this entity right now?
//!
//! Rules are applied in a fixed precedence; the first one that decides wins,
//! except an `Add` policy, which is AND-ed with the distance result:
//!
//! 1. dead target: hidden
//! 2. target pending removal: hidden
//! 3. `Replace` policy: its answer
//! 4. `always_visible`: visible
//! 5. `!is_visible`: hidden
//! 6. virtual world mismatch: hidden
//! 7. `ReplacePosition` policy: its answer
//! 8. distance `< range`
//! 9. range-exempt target: visible regardless of 8
//! 10. `Add` policy: AND-ed with 8/9
//!
//! Evaluation never mutates anything, so repeated calls with the same inputs
//! agree.

use replica_common::{EntityId, Transform};
use replica_kernel::{HeuristicMode, Streamable, Streamer, VisibilityOverride, World};

/// The viewing side of a visibility test.
#[derive(Debug, Clone, Copy)]
pub struct Viewer<'a> {
    pub entity: EntityId,
    pub transform: &'a Transform,
    pub streamer: &'a Streamer,
    pub streamable: &'a Streamable,
}

impl<'a> Viewer<'a> {
    /// Borrow the viewer's components. `None` if the entity is dead or lacks
    /// any of Transform, Streamer, Streamable.
    pub fn fetch(world: &'a World, entity: EntityId) -> Option<Self> {
        if !world.is_alive(entity) {
            return None;
        }
        Some(Self {
            entity,
            transform: world.get::<Transform>(entity)?,
            streamer: world.get::<Streamer>(entity)?,
            streamable: world.get::<Streamable>(entity)?,
        })
    }
}

/// The entity being tested.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub entity: EntityId,
    pub transform: &'a Transform,
    pub streamable: &'a Streamable,
}

impl<'a> Candidate<'a> {
    pub fn fetch(world: &'a World, entity: EntityId) -> Option<Self> {
        Some(Self {
            entity,
            transform: world.get::<Transform>(entity)?,
            streamable: world.get::<Streamable>(entity)?,
        })
    }
}

pub fn is_visible(world: &World, viewer: &Viewer<'_>, target: &Candidate<'_>) -> bool {
    if !world.is_alive(target.entity) {
        return false;
    }
    if world.is_pending_removal(target.entity) {
        return false;
    }

    let policy = target.streamable.visibility.as_ref();
    let ask = |policy: &VisibilityOverride| {
        policy
            .policy
            .is_visible(world, viewer.entity, target.entity)
    };

    if let Some(policy) = policy.filter(|p| p.applies(HeuristicMode::Replace)) {
        return ask(policy);
    }

    if target.streamable.always_visible {
        return true;
    }
    if !target.streamable.is_visible {
        return false;
    }
    if viewer.streamable.virtual_world != target.streamable.virtual_world {
        return false;
    }

    if let Some(policy) = policy.filter(|p| p.applies(HeuristicMode::ReplacePosition)) {
        return ask(policy);
    }

    let distance = viewer.transform.distance(target.transform);
    let mut visible = distance < viewer.streamer.range;

    if viewer.streamer.range_exempt.contains(&target.entity) {
        visible = true;
    }

    if let Some(policy) = policy.filter(|p| p.applies(HeuristicMode::Add)) {
        visible = visible && ask(policy);
    }

    visible
}

/// Every streamer that can currently see `target`, in store order.
pub fn find_visible_streamers(world: &World, target: EntityId) -> Vec<EntityId> {
    let Some(candidate) = Candidate::fetch(world, target) else {
        return Vec::new();
    };
    world
        .streamer_entities()
        .into_iter()
        .filter(|id| {
            Viewer::fetch(world, *id).is_some_and(|viewer| is_visible(world, &viewer, &candidate))
        })
        .collect()
}
