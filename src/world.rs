use crate::{CorridorId, IntersectionId, LaneId, ObjectId, RoadId};
use smallvec::SmallVec;

/// A list of object IDs, ordered as documented by the query producing it.
pub type ObjectList = SmallVec<[ObjectId; 8]>;

/// A lane-relative position on the road network.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RoadPosition {
    /// On a lane of a road segment.
    Road {
        road: RoadId,
        lane: LaneId,
        /// Longitudinal distance from the start of the lane.
        dist: f64,
        /// Lateral offset from the road's reference line, positive to the left.
        lateral: f64,
    },
    /// Inside an intersection, travelling along a corridor.
    Intersection {
        intersection: IntersectionId,
        corridor: CorridorId,
        /// Longitudinal distance from the start of the corridor.
        dist: f64,
        /// Lateral offset from the corridor's centre line, positive to the left.
        lateral: f64,
    },
}

impl RoadPosition {
    /// The longitudinal distance along the current lane or corridor.
    pub fn dist(&self) -> f64 {
        match *self {
            Self::Road { dist, .. } | Self::Intersection { dist, .. } => dist,
        }
    }

    /// The lateral offset.
    pub fn lateral(&self) -> f64 {
        match *self {
            Self::Road { lateral, .. } | Self::Intersection { lateral, .. } => lateral,
        }
    }

    /// The road, if the position is on a road segment.
    pub fn road(&self) -> Option<RoadId> {
        match *self {
            Self::Road { road, .. } => Some(road),
            Self::Intersection { .. } => None,
        }
    }

    /// The lane, if the position is on a road segment.
    pub fn lane(&self) -> Option<LaneId> {
        match *self {
            Self::Road { lane, .. } => Some(lane),
            Self::Intersection { .. } => None,
        }
    }

    /// The corridor, if the position is inside an intersection.
    pub fn corridor(&self) -> Option<CorridorId> {
        match *self {
            Self::Intersection { corridor, .. } => Some(corridor),
            Self::Road { .. } => None,
        }
    }

    /// Whether the position holds finite coordinates.
    pub fn is_valid(&self) -> bool {
        self.dist().is_finite() && self.lateral().is_finite()
    }
}

/// The kinds of dynamic object an agent may encounter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ObjectKind {
    Vehicle,
    Trailer,
    TrajectoryFollower,
    ExternalDriver,
    ExternalTrailer,
    Pedestrian,
    Animal,
    Static,
}

impl ObjectKind {
    /// Whether an agent may select an object of this kind as its lead vehicle.
    pub fn is_followable(self) -> bool {
        match self {
            Self::Vehicle
            | Self::Trailer
            | Self::TrajectoryFollower
            | Self::ExternalDriver
            | Self::ExternalTrailer => true,
            Self::Pedestrian | Self::Animal | Self::Static => false,
        }
    }
}

/// The state of an object's turn signals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TurnSignal {
    #[default]
    Off,
    Left,
    Right,
    Hazard,
}

impl TurnSignal {
    /// The side the signal indicates, if it indicates one.
    pub fn side(self) -> Option<Side> {
        match self {
            Self::Left => Some(Side::Left),
            Self::Right => Some(Side::Right),
            Self::Off | Self::Hazard => None,
        }
    }
}

/// A side of a lane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// The published state of a dynamic object.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjectState {
    pub kind: ObjectKind,
    pub position: RoadPosition,
    /// Velocity in m/s.
    pub vel: f64,
    /// Acceleration in m/s<sup>2</sup>.
    pub acc: f64,
    /// Width in m.
    pub width: f64,
    /// Length in m.
    pub length: f64,
    pub signal: TurnSignal,
}

/// Static information about a corridor.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CorridorInfo {
    pub intersection: IntersectionId,
    /// The lane the corridor starts from.
    pub src_lane: LaneId,
    /// The lane the corridor leads onto.
    pub dst_lane: LaneId,
    /// Length in m.
    pub length: f64,
}

/// Read-only queries against the road network and the objects on it.
pub trait RoadNetwork {
    /// The current state of an object, or `None` if it does not exist.
    fn object(&self, id: ObjectId) -> Option<&ObjectState>;

    /// The speed limit at a position.
    fn speed_limit(&self, pos: &RoadPosition) -> Option<f64>;

    /// Whether a road carries the "merge on-ramp" attribute.
    fn is_merge_road(&self, road: RoadId) -> bool;

    /// The lane next to `lane` on the given side, if there is one.
    fn adjacent_lane(&self, lane: LaneId, side: Side) -> Option<LaneId>;

    /// Information about a corridor.
    fn corridor(&self, id: CorridorId) -> Option<CorridorInfo>;

    /// The distance along `on` at which it first overlaps `with`.
    fn first_merge_distance(&self, on: CorridorId, with: CorridorId) -> Option<f64>;

    /// The distance along `on` at which its overlap with `with` ends.
    fn last_merge_distance(&self, on: CorridorId, with: CorridorId) -> Option<f64>;

    /// For a lane on a merge road, the ramp corridor its traffic takes and
    /// the target-lane corridor it merges with, in that order.
    fn merge_corridors(&self, road: RoadId, lane: LaneId) -> Option<(CorridorId, CorridorId)>;

    /// The signed travel distance from `from` to the point `dist` m along
    /// `corridor`: positive while the point is ahead, negative once passed.
    /// `None` if the position is not on a route through the corridor.
    fn signed_distance(&self, from: &RoadPosition, corridor: CorridorId, dist: f64)
        -> Option<f64>;

    /// Objects ahead of `id` on or near its path, nearest first.
    fn forward_objects(&self, id: ObjectId) -> ObjectList;

    /// Objects approaching or travelling along `corridor`, front to back.
    fn approaching_objects(&self, corridor: CorridorId) -> ObjectList;
}

/// A planned path through the road network.
pub trait Path {
    /// The distance travelled along the route before the start of this path.
    /// Grows as the path drops segments that have been passed.
    fn base_distance(&self) -> f64;

    /// The length of the path in m.
    fn length(&self) -> f64;

    /// The distance from the start of the path to a position on it.
    fn locate(&self, pos: &RoadPosition) -> Option<f64>;

    /// The radius of curvature in m, `f64::INFINITY` where straight.
    fn radius_at(&self, dist: f64) -> Option<f64>;

    /// The first corridor starting beyond `dist` m along the path.
    fn next_corridor(&self, dist: f64) -> Option<CorridorId>;
}
