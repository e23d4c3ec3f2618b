//! Tick-rate regulation: entities that stop moving are replicated less often.

use replica_common::Transform;
use replica_kernel::{Streamable, TickRateRegulator, World};
use serde::Serialize;

use crate::config::RegulatorConfig;

/// Outcome of one regulator pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegulatorStats {
    pub active: usize,
    pub resting: usize,
}

/// Compare every regulated entity against its cached transform.
///
/// Active entities fall back to their default update interval; resting ones
/// have theirs raised by `config.step()`. The cache is refreshed either way.
pub fn regulate(world: &mut World, config: &RegulatorConfig) -> RegulatorStats {
    let _span = tracing::debug_span!("regulate").entered();
    let mut stats = RegulatorStats::default();
    let step = config.step();

    for id in world.entities_with::<TickRateRegulator>() {
        let Some(transform) = world.get::<Transform>(id).copied() else {
            continue;
        };
        if !world.has::<Streamable>(id) {
            continue;
        }
        let Some(regulator) = world.get_mut::<TickRateRegulator>(id) else {
            continue;
        };
        let active = regulator.has_changed(&transform, config.epsilon);
        regulator.observe(&transform);

        let Some(streamable) = world.get_mut::<Streamable>(id) else {
            continue;
        };
        if active {
            streamable.reset_update_interval();
            stats.active += 1;
        } else {
            streamable.update_interval += step;
            stats.resting += 1;
        }
    }

    tracing::trace!(active = stats.active, resting = stats.resting, "regulator pass");
    stats
}
