//! Longitudinal decision and control for autonomous traffic agents.
//!
//! Every frame an [Agent] looks at the curvature of its path, the vehicle it may
//! need to follow and, on a highway on-ramp, the gaps in the traffic stream it is
//! merging into, and settles on a single acceleration command.
//!
//! The road network, neighbour lists and object kinematics come from the host
//! through the [RoadNetwork] and [Path] traits. [WorldSnapshot] and [RoutePath]
//! are simple in-memory implementations of both.

pub use agent::{
    conservative_select, emergency_follow, normal_follow, signed_distance_to_p1, AccelState,
    Agent, AgentAttributes, AgentState, Behavior, CurvatureBucket, CurvaturePlanner,
    CurvatureSample, Decision, FollowController, FollowInputs, FollowState, LeadVehicleSelector,
    MergeCoordinator, MergeGeometry, MergePhase, MergeSession, ReactionDelay, Severity,
};
pub use cgmath;
pub use error::{GeometryError, NotEngaged};
pub use params::AgentParams;
pub use path::{PathElement, RoutePath};
pub use rng::{RngStream, RngStreamPool};
use slotmap::new_key_type;
pub use slotmap::{Key, KeyData};
pub use snapshot::WorldSnapshot;
pub use util::{time_to_arrival, time_to_collision, Interval, INFINITE_TIME};
pub use world::{
    CorridorInfo, ObjectKind, ObjectList, ObjectState, Path, RoadNetwork, RoadPosition, Side,
    TurnSignal,
};

mod agent;
mod error;
pub mod math;
pub mod params;
mod path;
mod rng;
mod snapshot;
pub mod units;
mod util;
mod world;

new_key_type! {
    /// Unique ID of a dynamic object (vehicle, trailer, external driver, ...).
    pub struct ObjectId;
    /// Unique ID of a road.
    pub struct RoadId;
    /// Unique ID of a lane on a road.
    pub struct LaneId;
    /// Unique ID of an intersection.
    pub struct IntersectionId;
    /// Unique ID of a corridor, a directed path across an intersection.
    pub struct CorridorId;
}
