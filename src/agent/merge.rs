//! Merging from an on-ramp into a moving traffic stream.
//!
//! While the agent drives along a merge road and its ramp corridor, the
//! coordinator cycles through three phases:
//!
//! * OFF - drive towards the speed of the target lane traffic;
//! * GAP_SEARCH - compare arrival times at the merge point P1 with those of the
//!   approaching traffic until an acceptable gap is found;
//! * TRACK - follow the vehicle at the front of the chosen gap.
//!
//! All arrival times are measured to P1, which lies a fixed offset past the
//! point where the ramp corridor first overlaps the target corridor.

use super::cruise::{cruise_accel, stop_at_point_accel, stopping_distance};
use super::follow::{normal_follow, FollowInputs};
use super::AgentState;
use crate::error::{GeometryError, NotEngaged};
use crate::params::{CruiseParams, MergeParams};
use crate::util::time_to_arrival;
use crate::world::{RoadNetwork, RoadPosition};
use crate::{CorridorId, LaneId, ObjectId};
use std::fmt;

/// Distances to P1 closer to zero than this, in m, count as "at P1" for
/// either sign.
const AT_P1_DIST: f64 = 0.01;

/// The phase of a merge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MergePhase {
    #[default]
    Off,
    GapSearch,
    Track,
}

impl fmt::Display for MergePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Off => "OFF",
            Self::GapSearch => "GAP_SEARCH",
            Self::Track => "TRACK",
        })
    }
}

/// Where a merge takes place.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MergeGeometry {
    /// The merge road lane the geometry was resolved from.
    pub lane: LaneId,
    /// The corridor the agent merges through.
    pub ramp: CorridorId,
    /// The corridor of the traffic being merged into.
    pub target: CorridorId,
    /// Distance of P1 along `ramp`.
    pub p1_on_ramp: f64,
    /// Distance of P1 along `target`.
    pub p1_on_target: f64,
}

/// The merge state an agent keeps from frame to frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergeSession {
    pub phase: MergePhase,
    /// Present while the agent is on a merge road or its ramp corridor.
    pub geometry: Option<MergeGeometry>,
    /// The vehicle at the front of the accepted gap, `None` when the agent
    /// leads the target lane traffic.
    pub gap_leader: Option<ObjectId>,
    /// The vehicle last tracked successfully.
    pub last_leader: Option<ObjectId>,
    /// The gap to `last_leader` when it was last tracked.
    pub prev_actual_dist: Option<f64>,
    /// Frames spent tracking the current gap.
    pub engaged_frames: u32,
}

/// What the coordinator knows about the agent in the current frame.
struct MergeFrame<'a> {
    state: &'a AgentState,
    geometry: MergeGeometry,
    /// Signed distance from the agent's centre to P1.
    own_d: f64,
    own_tta: f64,
    desired_speed: f64,
    dt: f64,
}

/// A target lane vehicle approaching P1.
#[derive(Clone, Copy, Debug)]
struct Approaching {
    id: ObjectId,
    /// Signed distance to P1.
    dist: f64,
    tta: f64,
}

/// Runs an agent's merge session.
#[derive(Clone, Debug)]
pub struct MergeCoordinator {
    params: MergeParams,
    cruise: CruiseParams,
    session: MergeSession,
}

impl MergeCoordinator {
    pub fn new(params: MergeParams, cruise: CruiseParams) -> Self {
        Self {
            params,
            cruise,
            session: MergeSession::default(),
        }
    }

    pub fn session(&self) -> &MergeSession {
        &self.session
    }

    pub fn phase(&self) -> MergePhase {
        self.session.phase
    }

    /// Whether the agent was on a merge road or its ramp at the last step, in
    /// which case the merge result replaces car following.
    pub fn is_engaged(&self) -> bool {
        self.session.geometry.is_some()
    }

    /// Advances the merge by one frame and proposes an acceleration.
    ///
    /// Returns `None` when the agent is not merging, or when no acceleration
    /// can be resolved this frame.
    pub fn step(
        &mut self,
        state: &AgentState,
        world: &impl RoadNetwork,
        dt: f64,
    ) -> Option<f64> {
        let geometry = match self.resolve_geometry(state, world) {
            Ok(Some(geometry)) => geometry,
            Ok(None) => {
                self.reset();
                return None;
            }
            Err(err) => {
                log::error!("merge: agent {:?}: {}", state.id, err);
                self.reset();
                return None;
            }
        };
        self.session.geometry = Some(geometry);

        let Some(own_d) = signed_distance_to_p1(world, &state.position, &geometry) else {
            log::error!(
                "merge: agent {:?} at {:?} cannot be placed relative to P1",
                state.id,
                state.position
            );
            return None;
        };
        let Some(speed_limit) = world.speed_limit(&state.position) else {
            log::error!("merge: no speed limit at {:?}", state.position);
            return None;
        };

        let frame = MergeFrame {
            state,
            geometry,
            own_d,
            own_tta: time_to_arrival(own_d, state.vel),
            desired_speed: speed_limit * self.cruise.speed_factor,
            dt,
        };
        match self.session.phase {
            MergePhase::Off => self.off(&frame, world),
            MergePhase::GapSearch => self.gap_search(&frame, world),
            MergePhase::Track => self.track(&frame, world),
        }
    }

    /// Finds the merge geometry covering the agent's position. `Ok(None)`
    /// means the agent is not merging.
    fn resolve_geometry(
        &self,
        state: &AgentState,
        world: &impl RoadNetwork,
    ) -> Result<Option<MergeGeometry>, GeometryError> {
        let cached = self.session.geometry;
        match state.position {
            RoadPosition::Road { road, lane, .. } if world.is_merge_road(road) => {
                if let Some(geometry) = cached.filter(|g| g.lane == lane) {
                    return Ok(Some(geometry));
                }
                let (ramp, target) = world
                    .merge_corridors(road, lane)
                    .ok_or(GeometryError::NoMergeGeometry)?;
                let p_ramp = world
                    .first_merge_distance(ramp, target)
                    .ok_or(GeometryError::NoMergeGeometry)?;
                let p_target = world
                    .first_merge_distance(target, ramp)
                    .ok_or(GeometryError::NoMergeGeometry)?;
                Ok(Some(MergeGeometry {
                    lane,
                    ramp,
                    target,
                    p1_on_ramp: p_ramp + self.params.p1_offset,
                    p1_on_target: p_target + self.params.p1_offset,
                }))
            }
            RoadPosition::Intersection { corridor, .. } => {
                Ok(cached.filter(|g| g.ramp == corridor))
            }
            RoadPosition::Road { .. } => Ok(None),
        }
    }

    fn off(&mut self, frame: &MergeFrame, world: &impl RoadNetwork) -> Option<f64> {
        let p = &self.params;
        let (sum, count) = world
            .approaching_objects(frame.geometry.target)
            .into_iter()
            .filter(|id| *id != frame.state.id)
            .filter_map(|id| world.object(id))
            .filter(|obj| obj.kind.is_followable())
            .filter(|obj| {
                signed_distance_to_p1(world, &obj.position, &frame.geometry)
                    .map_or(false, |d| d >= 0.0)
            })
            .take(p.avg_count)
            .fold((0.0, 0), |(sum, count), obj| (sum + obj.vel, count + 1));
        let mut target_speed = frame.desired_speed;
        if count > 0 {
            target_speed = f64::max(target_speed, sum / count as f64);
        }
        let acc = cruise_accel(frame.state.vel, target_speed, &self.cruise);

        let on_merge_road = frame.state.position.road().is_some();
        if on_merge_road && frame.own_tta > 0.0 && frame.own_tta <= p.gap_search_tta {
            self.set_phase(frame.state.id, MergePhase::GapSearch);
        }
        Some(acc)
    }

    fn gap_search(&mut self, frame: &MergeFrame, world: &impl RoadNetwork) -> Option<f64> {
        let vehicles = self.approaching(frame, world);
        match self.find_gap(frame, &vehicles) {
            Some(leader) => {
                log::debug!(
                    "merge: agent {:?} accepted gap behind {:?} (tta {:.2} s, {} approaching)",
                    frame.state.id,
                    leader,
                    frame.own_tta,
                    vehicles.len()
                );
                self.session.gap_leader = leader;
                self.session.engaged_frames = 0;
                self.set_phase(frame.state.id, MergePhase::Track);
                self.track(frame, world)
            }
            None => {
                let vel = frame.state.vel;
                let stop_dist = stopping_distance(vel, self.params.stop_decel());
                (frame.own_d > 0.0 && frame.own_d <= stop_dist)
                    .then(|| stop_at_point_accel(vel, frame.own_d, &self.cruise))
            }
        }
    }

    /// The target lane vehicles that can be placed relative to P1, front to back.
    fn approaching(&self, frame: &MergeFrame, world: &impl RoadNetwork) -> Vec<Approaching> {
        world
            .approaching_objects(frame.geometry.target)
            .into_iter()
            .filter(|id| *id != frame.state.id)
            .filter_map(|id| {
                let obj = world.object(id)?;
                if !obj.kind.is_followable() {
                    return None;
                }
                let dist = signed_distance_to_p1(world, &obj.position, &frame.geometry)?;
                Some(Approaching {
                    id,
                    dist,
                    tta: time_to_arrival(dist, obj.vel),
                })
            })
            .collect()
    }

    /// Scans the slots between approaching vehicles, front to back, for one the
    /// agent can arrive in. `Some(None)` accepts the slot ahead of all traffic.
    fn find_gap(&self, frame: &MergeFrame, vehicles: &[Approaching]) -> Option<Option<ObjectId>> {
        let p = &self.params;
        let own = frame.own_tta;
        let Some(first) = vehicles.first() else {
            return Some(None);
        };
        // Past P1 with the only vehicle behind: the agent leads it
        if frame.own_d <= 0.0 && vehicles.len() == 1 && first.dist > frame.own_d {
            return Some(None);
        }
        if first.tta - own > p.min_spacing {
            return Some(None);
        }
        vehicles.iter().enumerate().find_map(|(idx, leader)| {
            let behind_leader = own - leader.tta > p.min_ttc_gap;
            let ahead_of_follower = vehicles
                .get(idx + 1)
                .map_or(true, |follower| follower.tta - own > p.min_spacing);
            (behind_leader && ahead_of_follower).then_some(Some(leader.id))
        })
    }

    fn track(&mut self, frame: &MergeFrame, world: &impl RoadNetwork) -> Option<f64> {
        let Some(leader) = self.session.gap_leader else {
            let cruise = cruise_accel(frame.state.vel, frame.desired_speed, &self.cruise);
            return Some(f64::min(self.params.free_accel, cruise));
        };
        match self.track_leader(frame, world, leader) {
            Ok(acc) => {
                self.session.engaged_frames += 1;
                Some(acc)
            }
            Err(err) => {
                log::debug!(
                    "merge: agent {:?} lost gap leader {:?} after {} frames: {}",
                    frame.state.id,
                    leader,
                    self.session.engaged_frames,
                    err
                );
                self.session.gap_leader = None;
                self.set_phase(frame.state.id, MergePhase::GapSearch);
                None
            }
        }
    }

    fn track_leader(
        &mut self,
        frame: &MergeFrame,
        world: &impl RoadNetwork,
        leader: ObjectId,
    ) -> Result<f64, NotEngaged> {
        let obj = world.object(leader).ok_or(NotEngaged::InvalidLead)?;
        let lead_d = signed_distance_to_p1(world, &obj.position, &frame.geometry)
            .ok_or(NotEngaged::UnknownDistance)?;
        let gap = frame.own_d - lead_d - 0.5 * (frame.state.length + obj.length);
        if gap > self.params.track_range {
            return Err(NotEngaged::OutOfRange { distance: gap });
        }

        let prev_actual_dist = if self.session.last_leader == Some(leader) {
            self.session.prev_actual_dist
        } else {
            None
        };
        let inputs = FollowInputs {
            target_dist: self.params.target_dist,
            actual_dist: gap,
            prev_actual_dist,
            lead_vel: obj.vel,
            lead_acc: obj.acc,
            curr_vel: frame.state.vel,
            max_speed: frame.desired_speed,
            dt: frame.dt,
        };
        let acc = normal_follow(&inputs, &self.params.track)?;
        self.session.last_leader = Some(leader);
        self.session.prev_actual_dist = Some(gap);
        Ok(acc)
    }

    fn set_phase(&mut self, id: ObjectId, phase: MergePhase) {
        if self.session.phase != phase {
            log::debug!("merge: agent {:?} {} -> {}", id, self.session.phase, phase);
            self.session.phase = phase;
        }
    }

    fn reset(&mut self) {
        if self.session.phase != MergePhase::Off {
            log::debug!("merge: {} -> OFF, left the merge road", self.session.phase);
        }
        self.session = MergeSession::default();
    }
}

/// The signed distance from `pos` to P1: positive before it, negative once
/// passed.
///
/// The position is measured against both the ramp and the target corridor.
/// When both measures exist but disagree in sign the distance is unknown.
pub fn signed_distance_to_p1(
    world: &impl RoadNetwork,
    pos: &RoadPosition,
    geometry: &MergeGeometry,
) -> Option<f64> {
    if !pos.is_valid() {
        return None;
    }
    let via_ramp = world.signed_distance(pos, geometry.ramp, geometry.p1_on_ramp);
    let via_target = world.signed_distance(pos, geometry.target, geometry.p1_on_target);
    match (via_ramp, via_target) {
        (Some(a), Some(b)) => {
            let ambiguous = a.abs() > AT_P1_DIST && b.abs() > AT_P1_DIST && a.signum() != b.signum();
            (!ambiguous).then_some(a)
        }
        (Some(d), None) | (None, Some(d)) => Some(d),
        (None, None) => None,
    }
}
