use crate::util::Interval;
use crate::world::{
    CorridorInfo, ObjectList, ObjectState, RoadNetwork, RoadPosition, Side,
};
use crate::{CorridorId, IntersectionId, LaneId, ObjectId, RoadId};
use itertools::Itertools;
use slotmap::SlotMap;
use std::collections::HashMap;

/// An in-memory copy of the road network and the objects on it for one frame.
///
/// Hosts fill one in from their own state before updating agents; tests build
/// small networks with it directly.
#[derive(Clone, Debug, Default)]
pub struct WorldSnapshot {
    roads: SlotMap<RoadId, RoadInfo>,
    lanes: SlotMap<LaneId, LaneInfo>,
    intersections: SlotMap<IntersectionId, ()>,
    corridors: SlotMap<CorridorId, CorridorInfo>,
    /// The stretch of the first corridor overlapped by the second.
    overlaps: HashMap<(CorridorId, CorridorId), Interval<f64>>,
    /// Ramp and target corridors of lanes on merge roads.
    merges: HashMap<LaneId, (CorridorId, CorridorId)>,
    objects: SlotMap<ObjectId, ObjectState>,
}

#[derive(Clone, Copy, Debug)]
struct RoadInfo {
    speed_limit: f64,
    merge: bool,
}

#[derive(Clone, Copy, Debug)]
struct LaneInfo {
    road: RoadId,
    length: f64,
    left: Option<LaneId>,
    right: Option<LaneId>,
}

impl WorldSnapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a road with the given speed limit in m/s.
    pub fn add_road(&mut self, speed_limit: f64, merge: bool) -> RoadId {
        self.roads.insert(RoadInfo { speed_limit, merge })
    }

    /// Adds a lane of the given length to a road.
    pub fn add_lane(&mut self, road: RoadId, length: f64) -> LaneId {
        self.lanes.insert(LaneInfo {
            road,
            length,
            left: None,
            right: None,
        })
    }

    /// Declares that `left` lies immediately to the left of `right`.
    pub fn set_adjacent(&mut self, left: LaneId, right: LaneId) {
        if let Some(lane) = self.lanes.get_mut(left) {
            lane.right = Some(right);
        }
        if let Some(lane) = self.lanes.get_mut(right) {
            lane.left = Some(left);
        }
    }

    /// Adds an intersection.
    pub fn add_intersection(&mut self) -> IntersectionId {
        self.intersections.insert(())
    }

    /// Adds a corridor through an intersection.
    pub fn add_corridor(
        &mut self,
        intersection: IntersectionId,
        src_lane: LaneId,
        dst_lane: LaneId,
        length: f64,
    ) -> CorridorId {
        self.corridors.insert(CorridorInfo {
            intersection,
            src_lane,
            dst_lane,
            length,
        })
    }

    /// Declares that corridor `a` over the stretch `on_a` overlaps corridor `b`
    /// over the stretch `on_b`.
    pub fn add_overlap(
        &mut self,
        a: CorridorId,
        on_a: Interval<f64>,
        b: CorridorId,
        on_b: Interval<f64>,
    ) {
        self.overlaps.insert((a, b), on_a);
        self.overlaps.insert((b, a), on_b);
    }

    /// Declares that traffic in `lane`, a lane of a merge road, merges through
    /// `ramp` into the traffic on `target`.
    pub fn set_merge(&mut self, lane: LaneId, ramp: CorridorId, target: CorridorId) {
        self.merges.insert(lane, (ramp, target));
    }

    /// Adds an object.
    pub fn add_object(&mut self, state: ObjectState) -> ObjectId {
        self.objects.insert(state)
    }

    /// Mutable access to an object's state, to publish a new frame.
    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut ObjectState> {
        self.objects.get_mut(id)
    }

    /// Removes an object.
    pub fn remove_object(&mut self, id: ObjectId) -> Option<ObjectState> {
        self.objects.remove(id)
    }

    fn lane_length(&self, lane: LaneId) -> Option<f64> {
        self.lanes.get(lane).map(|l| l.length)
    }

    fn lane_road(&self, lane: LaneId) -> Option<RoadId> {
        self.lanes.get(lane).map(|l| l.road)
    }

    /// Travel distance from `from` to `to`, positive if `to` lies ahead.
    fn forward_distance(&self, from: &RoadPosition, to: &RoadPosition) -> Option<f64> {
        use RoadPosition::*;
        match (*from, *to) {
            (Road { road, dist, .. }, Road { road: r, dist: d, .. }) if road == r => Some(d - dist),
            (Road { lane, dist, .. }, Road { lane: l, dist: d, .. }) => {
                // Another road, reached through a corridor from this road
                let road = self.lane_road(lane)?;
                let (_, corridor) = self.corridors.iter().find(|(_, c)| {
                    c.dst_lane == l && self.lane_road(c.src_lane) == Some(road)
                })?;
                Some(self.lane_length(lane)? - dist + corridor.length + d)
            }
            (Road { lane, dist, .. }, Intersection { corridor, dist: d, .. }) => {
                let info = self.corridors.get(corridor)?;
                let road = self.lane_road(lane)?;
                (self.lane_road(info.src_lane)? == road)
                    .then(|| self.lane_length(lane).map(|len| len - dist + d))
                    .flatten()
            }
            (
                Intersection { intersection, dist, .. },
                Intersection { intersection: i, dist: d, .. },
            ) if intersection == i => Some(d - dist),
            (Intersection { corridor, dist, .. }, Road { lane, dist: d, .. }) => {
                let info = self.corridors.get(corridor)?;
                (self.lane_road(info.dst_lane)? == self.lane_road(lane)?)
                    .then_some(info.length - dist + d)
            }
            (Intersection { .. }, Intersection { .. }) => None,
        }
    }
}

impl RoadNetwork for WorldSnapshot {
    fn object(&self, id: ObjectId) -> Option<&ObjectState> {
        self.objects.get(id)
    }

    fn speed_limit(&self, pos: &RoadPosition) -> Option<f64> {
        let road = match *pos {
            RoadPosition::Road { road, .. } => road,
            RoadPosition::Intersection { corridor, .. } => {
                self.lane_road(self.corridors.get(corridor)?.dst_lane)?
            }
        };
        self.roads.get(road).map(|r| r.speed_limit)
    }

    fn is_merge_road(&self, road: RoadId) -> bool {
        self.roads.get(road).map(|r| r.merge).unwrap_or(false)
    }

    fn adjacent_lane(&self, lane: LaneId, side: Side) -> Option<LaneId> {
        let lane = self.lanes.get(lane)?;
        match side {
            Side::Left => lane.left,
            Side::Right => lane.right,
        }
    }

    fn corridor(&self, id: CorridorId) -> Option<CorridorInfo> {
        self.corridors.get(id).copied()
    }

    fn first_merge_distance(&self, on: CorridorId, with: CorridorId) -> Option<f64> {
        self.overlaps.get(&(on, with)).map(|i| i.min)
    }

    fn last_merge_distance(&self, on: CorridorId, with: CorridorId) -> Option<f64> {
        self.overlaps.get(&(on, with)).map(|i| i.max)
    }

    fn merge_corridors(&self, road: RoadId, lane: LaneId) -> Option<(CorridorId, CorridorId)> {
        if self.lane_road(lane)? != road {
            return None;
        }
        self.merges.get(&lane).copied()
    }

    fn signed_distance(
        &self,
        from: &RoadPosition,
        corridor: CorridorId,
        dist: f64,
    ) -> Option<f64> {
        let info = self.corridors.get(corridor)?;
        match *from {
            RoadPosition::Intersection { corridor: c, dist: d, .. } if c == corridor => {
                Some(dist - d)
            }
            RoadPosition::Intersection { .. } => None,
            RoadPosition::Road { lane, dist: d, .. } if lane == info.src_lane => {
                Some(self.lane_length(lane)? - d + dist)
            }
            RoadPosition::Road { lane, dist: d, .. } if lane == info.dst_lane => {
                Some(-(info.length - dist + d))
            }
            RoadPosition::Road { .. } => None,
        }
    }

    fn forward_objects(&self, id: ObjectId) -> ObjectList {
        let Some(own) = self.objects.get(id) else {
            return ObjectList::new();
        };
        self.objects
            .iter()
            .filter(|(other, _)| *other != id)
            .filter_map(|(other, state)| {
                let dist = self.forward_distance(&own.position, &state.position)?;
                (dist > 0.0).then_some((other, dist))
            })
            .sorted_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(other, _)| other)
            .collect()
    }

    fn approaching_objects(&self, corridor: CorridorId) -> ObjectList {
        self.objects
            .iter()
            .filter_map(|(id, state)| {
                let dist = self.signed_distance(&state.position, corridor, 0.0)?;
                Some((id, dist))
            })
            .sorted_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
            .collect()
    }
}
