use super::AgentState;
use crate::units::ft;
use crate::util::Interval;
use crate::world::{ObjectState, RoadNetwork, RoadPosition};
use crate::{CorridorId, ObjectId};

/// The lateral clearance, in feet, beyond which a vehicle on the same road
/// is considered to be in another lane.
const LATERAL_MARGIN_FT: f64 = 0.5;

/// Chooses the vehicle an agent should follow.
///
/// Candidates come from the road network nearest first; the first one that
/// could actually obstruct the agent is the lead. Vehicles safely in an
/// adjacent lane are passed over unless they signal a change into the agent's
/// lane, and vehicles in other corridors only count once their corridor has
/// merged with the agent's.
#[derive(Clone, Copy, Debug, Default)]
pub struct LeadVehicleSelector;

impl LeadVehicleSelector {
    pub fn new() -> Self {
        Self
    }

    /// Picks the lead vehicle out of `candidates`, which must be ordered nearest first.
    pub fn select_lead(
        &self,
        own: &AgentState,
        candidates: &[ObjectId],
        world: &impl RoadNetwork,
    ) -> Option<ObjectId> {
        candidates
            .iter()
            .copied()
            .filter(|id| *id != own.id)
            .find(|id| match world.object(*id) {
                Some(obj) => self.can_lead(own, obj, world),
                None => false,
            })
    }

    fn can_lead(&self, own: &AgentState, obj: &ObjectState, world: &impl RoadNetwork) -> bool {
        use RoadPosition::*;

        if !obj.position.is_valid() || !obj.kind.is_followable() {
            return false;
        }

        match (own.position, obj.position) {
            (
                Road { road, lane, lateral, .. },
                Road { road: obj_road, lane: obj_lane, lateral: obj_lateral, .. },
            ) if road == obj_road => {
                let own_lats = Interval::disc(lateral, 0.5 * own.width);
                let obj_lats = Interval::disc(obj_lateral, 0.5 * obj.width);
                if own_lats.clearance_with(&obj_lats) < ft(LATERAL_MARGIN_FT) {
                    return true;
                }
                // Clear of the agent, so only a cut-in matters
                obj.signal
                    .side()
                    .and_then(|side| world.adjacent_lane(obj_lane, side))
                    == Some(lane)
            }
            (Road { .. }, Road { .. }) => true,
            (Road { lane, .. }, Intersection { corridor, dist, .. }) => {
                let Some(info) = world.corridor(corridor) else {
                    return false;
                };
                if info.src_lane == lane || own.next_corridor == Some(corridor) {
                    return true;
                }
                own.next_corridor
                    .map(|next| in_merged_stretch(world, corridor, next, dist))
                    .unwrap_or(false)
            }
            (Intersection { corridor: own_corridor, .. }, Intersection { corridor, dist, .. }) => {
                corridor == own_corridor || in_merged_stretch(world, corridor, own_corridor, dist)
            }
            (Intersection { corridor, .. }, Road { lane, .. }) => world
                .corridor(corridor)
                .map(|info| info.dst_lane == lane)
                .unwrap_or(false),
        }
    }
}

/// Whether an object `dist` m along corridor `on` is within the stretch where
/// `on` overlaps `with`.
fn in_merged_stretch(
    world: &impl RoadNetwork,
    on: CorridorId,
    with: CorridorId,
    dist: f64,
) -> bool {
    match (
        world.first_merge_distance(on, with),
        world.last_merge_distance(on, with),
    ) {
        (Some(first), Some(last)) => Interval::new(first, last).contains(dist),
        _ => false,
    }
}
