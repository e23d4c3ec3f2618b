//! Range-exempt collection: lets a streamer see chosen entities at any
//! distance.

use replica_kernel::{Streamer, World};

/// Clear every streamer's exempt set and let its collector refill it.
/// Returns the total number of exempt entries afterwards.
pub fn collect_range_exempt(world: &mut World) -> usize {
    let _span = tracing::debug_span!("collect_range_exempt").entered();
    let mut total = 0;

    for id in world.streamer_entities() {
        let Some(streamer) = world.get_mut::<Streamer>(id) else {
            continue;
        };
        let mut exempt = std::mem::take(&mut streamer.range_exempt);
        exempt.clear();
        if let Some(collector) = streamer.range_exempt_collector.clone() {
            collector.collect(world, id, &mut exempt);
        }
        total += exempt.len();
        if let Some(streamer) = world.get_mut::<Streamer>(id) {
            streamer.range_exempt = exempt;
        }
    }

    tracing::trace!(total, "range-exempt sets collected");
    total
}
