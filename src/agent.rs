use self::cruise::{approach_speed_accel, cruise_accel};
use crate::params::AgentParams;
use crate::rng::{RngStream, RngStreamPool};
use crate::world::{ObjectState, Path, RoadNetwork, RoadPosition};
use crate::{CorridorId, LaneId, ObjectId, RoadId};
use arrayvec::ArrayVec;
use std::fmt;

pub use curvature::{CurvatureBucket, CurvaturePlanner, CurvatureSample, Severity};
pub use follow::{
    conservative_select, emergency_follow, normal_follow, AccelState, FollowController,
    FollowInputs, FollowState, ReactionDelay,
};
pub use lead::LeadVehicleSelector;
pub use merge::{signed_distance_to_p1, MergeCoordinator, MergeGeometry, MergePhase, MergeSession};

mod cruise;
mod curvature;
mod follow;
mod lead;
mod merge;

/// The behaviour that proposed an acceleration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Behavior {
    /// Cruising at the desired speed on a free road.
    FreeDrive,
    /// Slowing for a curve ahead.
    Curvature,
    /// Following a lead vehicle.
    Follow,
    /// Merging from an on-ramp.
    Merge,
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FreeDrive => "free drive",
            Self::Curvature => "curvature",
            Self::Follow => "follow",
            Self::Merge => "merge",
        })
    }
}

/// The acceleration an agent settled on for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decision {
    /// The acceleration in m/s<sup>2</sup>.
    pub accel: f64,
    /// The behaviour that won the arbitration.
    pub behavior: Behavior,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+.2} m/s^2 ({})", self.accel, self.behavior)
    }
}

/// The attributes of an agent's vehicle.
#[derive(Clone, Copy, Debug)]
pub struct AgentAttributes {
    /// The vehicle width in m.
    pub width: f64,
    /// The vehicle length in m.
    pub length: f64,
}

/// An agent's own state in the current frame, as its behaviours see it.
#[derive(Clone, Copy, Debug)]
pub struct AgentState {
    pub id: ObjectId,
    pub position: RoadPosition,
    /// The velocity in m/s.
    pub vel: f64,
    /// The acceleration in m/s<sup>2</sup>.
    pub acc: f64,
    /// The vehicle width in m.
    pub width: f64,
    /// The vehicle length in m.
    pub length: f64,
    /// The next corridor on the agent's path, if there is one.
    pub next_corridor: Option<CorridorId>,
}

/// An autonomous traffic agent's longitudinal controller.
///
/// Owns all of the agent's per-frame state. Each call to [Agent::step] reads
/// the published state of the world and returns the acceleration to apply.
#[derive(Debug)]
pub struct Agent {
    /// The ID of the agent's object in the world.
    id: ObjectId,
    attributes: AgentAttributes,
    params: AgentParams,
    /// The agent's random number stream, returned to its pool by [Agent::retire].
    rng: RngStream,
    curvature: CurvaturePlanner,
    selector: LeadVehicleSelector,
    follow: FollowController,
    delay: ReactionDelay,
    merge: MergeCoordinator,
    /// The number of frames stepped so far.
    frame: u64,
    /// The road and lane the agent was on last frame.
    last_lane: Option<(RoadId, LaneId)>,
    /// The vehicle followed last frame.
    lead: Option<ObjectId>,
    /// The gap to `lead` the last time it was followed.
    prev_actual_dist: Option<f64>,
}

impl Agent {
    /// Creates an agent controlling the object `id`. The agent draws a random
    /// number stream from `pool` and uses it to individualise `params`.
    pub fn new(
        id: ObjectId,
        attributes: AgentAttributes,
        mut params: AgentParams,
        pool: &RngStreamPool,
    ) -> Self {
        let mut rng = pool.acquire();
        params.randomise(&mut rng);
        Self {
            id,
            attributes,
            curvature: CurvaturePlanner::new(params.curvature.clone()),
            selector: LeadVehicleSelector::new(),
            follow: FollowController::new(params.follow.clone()),
            delay: ReactionDelay::new(params.delay.clone()),
            merge: MergeCoordinator::new(params.merge.clone(), params.cruise.clone()),
            params,
            rng,
            frame: 0,
            last_lane: None,
            lead: None,
            prev_actual_dist: None,
        }
    }

    /// Deletes the agent, returning its random number stream to `pool`.
    pub fn retire(self, pool: &RngStreamPool) {
        pool.release(self.rng);
    }

    /// The ID of the agent's object.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// The agent's individualised parameters.
    pub fn params(&self) -> &AgentParams {
        &self.params
    }

    /// The ID of the agent's random number stream.
    pub fn rng_stream(&self) -> u32 {
        self.rng.id()
    }

    /// The vehicle the agent followed in the last frame.
    pub fn lead(&self) -> Option<ObjectId> {
        self.lead
    }

    pub fn curvature(&self) -> &CurvaturePlanner {
        &self.curvature
    }

    pub fn follow_state(&self) -> &FollowState {
        self.delay.state()
    }

    pub fn merge_session(&self) -> &MergeSession {
        self.merge.session()
    }

    /// Tells the agent its path was replaced by a different route, so the
    /// curvature ahead is sampled afresh on the next step.
    pub fn replace_route(&mut self) {
        self.curvature.clear();
    }

    /// Decides the agent's acceleration for the next `dt` seconds.
    ///
    /// `path` is the agent's planned path, starting on the lane or corridor it
    /// currently occupies. Returns `None` if no behaviour could propose an
    /// acceleration this frame.
    pub fn step(
        &mut self,
        world: &impl RoadNetwork,
        path: &impl Path,
        dt: f64,
    ) -> Option<Decision> {
        let Some(own) = world.object(self.id) else {
            log::error!("agent {:?} is not in the world", self.id);
            return None;
        };
        if !own.position.is_valid() {
            log::error!("agent {:?} has an invalid position {:?}", self.id, own.position);
            return None;
        }

        let local = path.locate(&own.position);
        let state = AgentState {
            id: self.id,
            position: own.position,
            vel: own.vel,
            acc: own.acc,
            width: self.attributes.width,
            length: self.attributes.length,
            next_corridor: local.and_then(|dist| path.next_corridor(dist)),
        };

        let mut proposals = ArrayVec::<(f64, Behavior), 4>::new();

        let desired_speed = world
            .speed_limit(&state.position)
            .map(|limit| limit * self.params.cruise.speed_factor);
        match desired_speed {
            Some(speed) => proposals.push((
                cruise_accel(state.vel, speed, &self.params.cruise),
                Behavior::FreeDrive,
            )),
            None => log::error!("agent {:?}: no speed limit at {:?}", self.id, state.position),
        }

        if let Some(acc) = self.curve_accel(&state, local, path) {
            proposals.push((acc, Behavior::Curvature));
        }

        let merge = self.merge.step(&state, world, dt);
        let mut follow_catch_up = false;
        if self.merge.is_engaged() {
            self.lead = None;
            self.delay.reset();
            if let Some(acc) = merge {
                proposals.push((acc, Behavior::Merge));
            }
        } else {
            let max_speed = desired_speed.unwrap_or(f64::INFINITY);
            if let Some(acc) = self.follow_lead(&state, world, path, max_speed, dt) {
                proposals.push((acc, Behavior::Follow));
                follow_catch_up = self.follow.params().normal.allow_catch_up;
            }
        }

        self.frame += 1;
        let decision = conservative_select(&proposals, follow_catch_up)
            .map(|(accel, behavior)| Decision { accel, behavior });
        log::trace!(
            "agent {:?} frame {}: {:?} -> {:?}",
            self.id,
            self.frame,
            proposals,
            decision
        );
        decision
    }

    /// Brings the curvature samples up to date and converts the advisory, if
    /// there is one, into an acceleration.
    fn curve_accel(&mut self, state: &AgentState, local: Option<f64>, path: &impl Path) -> Option<f64> {
        let lane = state.position.road().zip(state.position.lane());
        let lane_changed = matches!(
            (self.last_lane, lane),
            (Some((road, old)), Some((new_road, new))) if road == new_road && old != new
        );
        if lane.is_some() {
            self.last_lane = lane;
        }

        let updated = if lane_changed {
            self.curvature.initialize(&state.position, path)
        } else {
            self.curvature.refresh(&state.position, path, self.frame)
        };
        updated.ok()?;

        let odometer = path.base_distance() + local?;
        self.curvature
            .update_buckets(odometer, state.vel, 0.5 * state.length);
        let threshold = self.params.curvature.min_accel_threshold;
        let (speed, dist) = self.curvature.get_advisory(threshold)?;
        approach_speed_accel(state.vel, speed, dist, threshold, &self.params.cruise)
    }

    /// Selects a lead vehicle and computes the delayed following acceleration.
    fn follow_lead(
        &mut self,
        state: &AgentState,
        world: &impl RoadNetwork,
        path: &impl Path,
        max_speed: f64,
        dt: f64,
    ) -> Option<f64> {
        let candidates = world.forward_objects(self.id);
        let lead_id = self.selector.select_lead(state, &candidates, world);
        if lead_id != self.lead {
            self.lead = lead_id;
            self.prev_actual_dist = None;
            self.delay.reset();
        }
        let lead = world.object(lead_id?)?;

        let Some(gap) = gap_to(state, lead, path, world) else {
            log::debug!("agent {:?}: gap to lead {:?} is unknown", self.id, lead_id);
            self.delay.reset();
            return None;
        };
        let inputs = FollowInputs {
            target_dist: self.follow.target_dist(state.vel),
            actual_dist: gap,
            prev_actual_dist: self.prev_actual_dist,
            lead_vel: lead.vel,
            lead_acc: lead.acc,
            curr_vel: state.vel,
            max_speed,
            dt,
        };
        match self.follow.compute(&inputs) {
            Ok(acc) => {
                self.prev_actual_dist = Some(gap);
                Some(self.delay.apply(acc, state.vel, dt))
            }
            Err(err) => {
                log::trace!("agent {:?}: not following {:?}: {}", self.id, lead_id, err);
                self.delay.reset();
                None
            }
        }
    }
}

/// The bumper to bumper gap from the agent to a vehicle ahead of it.
///
/// Vehicles on the agent's path are measured along it. A vehicle in a
/// corridor merging with the agent's current or next corridor is projected
/// onto the agent's corridor through the start of their overlap.
fn gap_to(
    state: &AgentState,
    lead: &ObjectState,
    path: &impl Path,
    world: &impl RoadNetwork,
) -> Option<f64> {
    let centres = match (path.locate(&state.position), path.locate(&lead.position)) {
        (Some(own), Some(other)) => other - own,
        _ => {
            let RoadPosition::Intersection { corridor, dist, .. } = lead.position else {
                return None;
            };
            let own_corridor = state.position.corridor().or(state.next_corridor)?;
            let on_own = world.first_merge_distance(own_corridor, corridor)? + dist
                - world.first_merge_distance(corridor, own_corridor)?;
            world.signed_distance(&state.position, own_corridor, on_own)?
        }
    };
    Some(centres - 0.5 * (state.length + lead.length))
}
