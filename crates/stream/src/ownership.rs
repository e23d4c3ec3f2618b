//! Ownership arbitration: every streamable is owned by the closest streamer
//! that can see it, unless its own policy says otherwise.

use replica_common::{EntityId, Guid};
use replica_kernel::{Streamable, World};

use crate::visibility::{Candidate, Viewer, is_visible};

/// Run one arbitration pass. Returns how many owners changed.
pub fn assign_owners(world: &mut World) -> usize {
    let _span = tracing::debug_span!("assign_owners").entered();
    let streamers = world.streamer_entities();
    let mut changed = 0;

    for id in world.streamable_entities() {
        let policy = world
            .get::<Streamable>(id)
            .and_then(|s| s.assign_owner.clone());
        if let Some(policy) = policy {
            let handled = world
                .get_mut::<Streamable>(id)
                .is_some_and(|s| policy.assign_owner(id, s));
            if handled {
                continue;
            }
        }

        let owner = closest_streamer(world, id, &streamers);
        let Some(streamable) = world.get_mut::<Streamable>(id) else {
            continue;
        };
        if streamable.owner != owner {
            tracing::debug!(entity = %id, from = %streamable.owner, to = %owner, "owner changed");
            streamable.owner = owner;
            changed += 1;
        }
    }

    changed
}

/// GUID of the nearest streamer that can see `target`, or `UNASSIGNED`.
///
/// Streamers are scanned in the given order and only a strictly closer one
/// replaces the current pick, so the first of several equidistant streamers
/// wins.
pub fn closest_streamer(world: &World, target: EntityId, streamers: &[EntityId]) -> Guid {
    let Some(candidate) = Candidate::fetch(world, target) else {
        return Guid::UNASSIGNED;
    };

    let mut closest = Guid::UNASSIGNED;
    let mut closest_distance = f32::MAX;
    for &streamer in streamers {
        let Some(viewer) = Viewer::fetch(world, streamer) else {
            continue;
        };
        if !is_visible(world, &viewer, &candidate) {
            continue;
        }
        let distance = candidate.transform.distance(viewer.transform);
        if distance < closest_distance {
            closest_distance = distance;
            closest = viewer.streamer.guid;
        }
    }
    closest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{spawn_target, spawn_viewer};
    use glam::Vec3;

    fn owner(world: &World, id: EntityId) -> Guid {
        world.get::<Streamable>(id).unwrap().owner
    }

    #[test]
    fn closest_visible_streamer_wins() {
        let mut world = World::new();
        spawn_viewer(&mut world, Guid(2), Vec3::new(20.0, 0.0, 0.0), 50.0);
        spawn_viewer(&mut world, Guid(1), Vec3::new(5.0, 0.0, 0.0), 50.0);
        let target = spawn_target(&mut world, Vec3::ZERO);

        assign_owners(&mut world);
        assert_eq!(owner(&world, target), Guid(1));
    }

    #[test]
    fn no_visible_streamer_unassigns() {
        let mut world = World::new();
        spawn_viewer(&mut world, Guid(1), Vec3::new(500.0, 0.0, 0.0), 50.0);
        let target = spawn_target(&mut world, Vec3::ZERO);
        world.get_mut::<Streamable>(target).unwrap().owner = Guid(1);

        assert_eq!(assign_owners(&mut world), 1);
        assert_eq!(owner(&world, target), Guid::UNASSIGNED);
    }

    #[test]
    fn invisible_closer_streamer_is_ineligible() {
        let mut world = World::new();
        let near = spawn_viewer(&mut world, Guid(1), Vec3::new(1.0, 0.0, 0.0), 50.0);
        spawn_viewer(&mut world, Guid(2), Vec3::new(30.0, 0.0, 0.0), 50.0);
        let target = spawn_target(&mut world, Vec3::ZERO);
        world.get_mut::<Streamable>(near).unwrap().virtual_world = 4;

        assign_owners(&mut world);
        assert_eq!(owner(&world, target), Guid(2));
    }

    #[test]
    fn equidistant_tie_goes_to_first_streamer() {
        let mut world = World::new();
        spawn_viewer(&mut world, Guid(7), Vec3::new(10.0, 0.0, 0.0), 50.0);
        spawn_viewer(&mut world, Guid(3), Vec3::new(-10.0, 0.0, 0.0), 50.0);
        let target = spawn_target(&mut world, Vec3::ZERO);

        assign_owners(&mut world);
        assert_eq!(owner(&world, target), Guid(7));
    }

    #[test]
    fn handled_policy_keeps_owner() {
        let mut world = World::new();
        spawn_viewer(&mut world, Guid(1), Vec3::ZERO, 50.0);
        let target = spawn_target(&mut world, Vec3::ZERO);
        let s = world.get_mut::<Streamable>(target).unwrap();
        s.owner = Guid(99);
        *s = s.clone().with_owner_policy(|_, _| true);

        assert_eq!(assign_owners(&mut world), 0);
        assert_eq!(owner(&world, target), Guid(99));
    }

    #[test]
    fn policy_may_assign_itself() {
        let mut world = World::new();
        spawn_viewer(&mut world, Guid(1), Vec3::ZERO, 50.0);
        let target = spawn_target(&mut world, Vec3::ZERO);
        let s = world.get_mut::<Streamable>(target).unwrap();
        *s = s.clone().with_owner_policy(|_, s| {
            s.owner = Guid(42);
            true
        });

        assign_owners(&mut world);
        assert_eq!(owner(&world, target), Guid(42));
    }

    #[test]
    fn declining_policy_falls_back_to_closest() {
        let mut world = World::new();
        spawn_viewer(&mut world, Guid(1), Vec3::ZERO, 50.0);
        let target = spawn_target(&mut world, Vec3::ZERO);
        let s = world.get_mut::<Streamable>(target).unwrap();
        *s = s.clone().with_owner_policy(|_, _| false);

        assign_owners(&mut world);
        assert_eq!(owner(&world, target), Guid(1));
    }
}
