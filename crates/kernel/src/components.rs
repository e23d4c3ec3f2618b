//! Components attached to replicated entities and to the viewers that
//! receive them.

use glam::{Quat, Vec3};
use replica_common::{EntityId, Guid, Transform};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::policy::{OwnershipPolicy, RangeExemptCollector, ReplicationEvents, VisibilityPolicy};
use crate::world::World;

/// Human-readable name component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name(pub String);

/// Per (viewer, entity) replication bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamData {
    /// Engine time of the last update sent for this pair.
    pub last_update: Duration,
}

impl StreamData {
    pub fn at(now: Duration) -> Self {
        Self { last_update: now }
    }
}

/// How a custom visibility policy combines with the built-in rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HeuristicMode {
    /// The policy alone decides, before any built-in rule except liveness.
    #[default]
    Replace,
    /// The policy replaces only the distance test.
    ReplacePosition,
    /// The policy is AND-ed with the distance result.
    Add,
}

/// A visibility policy together with its combination mode.
#[derive(Clone)]
pub struct VisibilityOverride {
    pub policy: Arc<dyn VisibilityPolicy>,
    pub mode: HeuristicMode,
}

impl VisibilityOverride {
    pub fn applies(&self, mode: HeuristicMode) -> bool {
        self.mode == mode
    }
}

impl fmt::Debug for VisibilityOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisibilityOverride")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Attached to every entity that can be replicated to streamers.
#[derive(Clone)]
pub struct Streamable {
    pub owner: Guid,
    pub is_visible: bool,
    pub always_visible: bool,
    pub virtual_world: i32,
    /// Current replication period; raised by the tick-rate regulator while
    /// the entity rests.
    pub update_interval: Duration,
    pub default_update_interval: Duration,
    /// Streamers that currently know this entity.
    pub streamers: BTreeMap<EntityId, StreamData>,
    pub assign_owner: Option<Arc<dyn OwnershipPolicy>>,
    pub visibility: Option<VisibilityOverride>,
    pub events: ReplicationEvents,
}

impl Streamable {
    pub fn new(default_update_interval: Duration) -> Self {
        Self {
            owner: Guid::UNASSIGNED,
            is_visible: true,
            always_visible: false,
            virtual_world: 0,
            update_interval: default_update_interval,
            default_update_interval,
            streamers: BTreeMap::new(),
            assign_owner: None,
            visibility: None,
            events: ReplicationEvents::default(),
        }
    }

    pub fn with_owner(mut self, owner: Guid) -> Self {
        self.owner = owner;
        self
    }

    pub fn with_events(mut self, events: ReplicationEvents) -> Self {
        self.events = events;
        self
    }

    /// Install a custom ownership policy. Returning `true` from it keeps the
    /// arbiter from touching `owner`.
    pub fn with_owner_policy(
        mut self,
        policy: impl Fn(EntityId, &mut Streamable) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.assign_owner = Some(Arc::new(policy));
        self
    }

    pub fn with_visibility(
        mut self,
        mode: HeuristicMode,
        policy: impl Fn(&World, EntityId, EntityId) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.set_visibility(mode, policy);
        self
    }

    pub fn set_visibility(
        &mut self,
        mode: HeuristicMode,
        policy: impl Fn(&World, EntityId, EntityId) -> bool + Send + Sync + 'static,
    ) {
        self.visibility = Some(VisibilityOverride {
            policy: Arc::new(policy),
            mode,
        });
    }

    /// Reset the replication period to its baseline.
    pub fn reset_update_interval(&mut self) {
        self.update_interval = self.default_update_interval;
    }
}

impl fmt::Debug for Streamable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Streamable")
            .field("owner", &self.owner)
            .field("is_visible", &self.is_visible)
            .field("always_visible", &self.always_visible)
            .field("virtual_world", &self.virtual_world)
            .field("update_interval", &self.update_interval)
            .field("default_update_interval", &self.default_update_interval)
            .field("streamers", &self.streamers.len())
            .field("assign_owner", &self.assign_owner.is_some())
            .field("visibility", &self.visibility)
            .field("events", &self.events)
            .finish()
    }
}

/// Attached to every entity acting as a viewer.
#[derive(Clone)]
pub struct Streamer {
    pub guid: Guid,
    pub nickname: String,
    pub player_index: u16,
    /// Visibility radius.
    pub range: f32,
    /// Streamable entities this viewer has been told about.
    pub entities: BTreeMap<EntityId, StreamData>,
    /// Entities that bypass the distance test for this viewer.
    pub range_exempt: BTreeSet<EntityId>,
    pub range_exempt_collector: Option<Arc<dyn RangeExemptCollector>>,
}

impl Streamer {
    pub fn new(guid: Guid, range: f32) -> Self {
        Self {
            guid,
            nickname: String::new(),
            player_index: 0,
            range,
            entities: BTreeMap::new(),
            range_exempt: BTreeSet::new(),
            range_exempt_collector: None,
        }
    }

    pub fn with_range_exempt_collector(
        mut self,
        collector: impl Fn(&World, EntityId, &mut BTreeSet<EntityId>) + Send + Sync + 'static,
    ) -> Self {
        self.range_exempt_collector = Some(Arc::new(collector));
        self
    }

    pub fn knows(&self, entity: EntityId) -> bool {
        self.entities.contains_key(&entity)
    }
}

impl fmt::Debug for Streamer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Streamer")
            .field("guid", &self.guid)
            .field("nickname", &self.nickname)
            .field("player_index", &self.player_index)
            .field("range", &self.range)
            .field("entities", &self.entities.len())
            .field("range_exempt", &self.range_exempt)
            .field(
                "range_exempt_collector",
                &self.range_exempt_collector.is_some(),
            )
            .finish()
    }
}

/// Last transform observed by the tick-rate regulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickRateRegulator {
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    pub last_generation: u64,
}

impl Default for TickRateRegulator {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            last_generation: 0,
        }
    }
}

impl TickRateRegulator {
    /// True if any axis of `transform` differs from the cache by more than
    /// `epsilon`, or its generation moved since the last observation.
    pub fn has_changed(&self, transform: &Transform, epsilon: f32) -> bool {
        differs(&transform.position.to_array(), &self.position.to_array(), epsilon)
            || differs(&transform.rotation.to_array(), &self.rotation.to_array(), epsilon)
            || differs(&transform.velocity.to_array(), &self.velocity.to_array(), epsilon)
            || transform.generation() != self.last_generation
    }

    pub fn observe(&mut self, transform: &Transform) {
        self.position = transform.position;
        self.rotation = transform.rotation;
        self.velocity = transform.velocity;
        self.last_generation = transform.generation();
    }
}

/// Per-axis comparison.
fn differs(current: &[f32], cached: &[f32], epsilon: f32) -> bool {
    current
        .iter()
        .zip(cached)
        .any(|(a, b)| (a - b).abs() > epsilon)
}

/// Tag: the entity is queued for destruction by the reaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingRemoval;

/// Tag: the entity belongs to the running game mode and is purged on reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemovedOnGameModeReload;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streamable_starts_at_default_interval() {
        let s = Streamable::new(Duration::from_millis(16));
        assert_eq!(s.update_interval, s.default_update_interval);
        assert_eq!(s.owner, Guid::UNASSIGNED);
        assert!(s.is_visible);
        assert!(!s.always_visible);
    }

    #[test]
    fn reset_update_interval_restores_baseline() {
        let mut s = Streamable::new(Duration::from_millis(16));
        s.update_interval += Duration::from_millis(50);
        s.reset_update_interval();
        assert_eq!(s.update_interval, Duration::from_millis(16));
    }

    #[test]
    fn regulator_detects_motion_beyond_epsilon() {
        let reg = TickRateRegulator::default();
        let mut t = Transform::default();
        t.position.x = 0.005;
        assert!(!reg.has_changed(&t, 0.01));
        t.position.x = 0.02;
        assert!(reg.has_changed(&t, 0.01));
    }

    #[test]
    fn regulator_detects_generation_change() {
        let mut reg = TickRateRegulator::default();
        let mut t = Transform::default();
        reg.observe(&t);
        t.set_position(Vec3::ZERO);
        assert!(reg.has_changed(&t, 0.01));
        reg.observe(&t);
        assert!(!reg.has_changed(&t, 0.01));
    }

    #[test]
    fn regulator_checks_rotation_and_velocity() {
        let reg = TickRateRegulator::default();
        let mut t = Transform::default();
        t.velocity.z = 1.0;
        assert!(reg.has_changed(&t, 0.01));

        let mut t = Transform::default();
        t.rotation = Quat::from_rotation_y(0.5);
        assert!(reg.has_changed(&t, 0.01));
    }
}
