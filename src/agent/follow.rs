use super::Behavior;
use crate::error::NotEngaged;
use crate::params::{DelayParams, FollowGains, FollowParams};
use crate::util::{time_to_collision, Interval, STOPPED_VEL};

/// Target distances at or below this, in m, count as "touching".
const ZERO_TARGET_DIST: f64 = 1e-3;

/// Slack on the reaction timer against floating point accumulation.
const TIMER_EPSILON: f64 = 1e-9;

/// The kinematics a following controller works from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FollowInputs {
    /// The desired gap to the lead vehicle, in m.
    pub target_dist: f64,
    /// The current gap to the lead vehicle, in m.
    pub actual_dist: f64,
    /// The gap in the previous frame, if it was known.
    pub prev_actual_dist: Option<f64>,
    pub lead_vel: f64,
    pub lead_acc: f64,
    pub curr_vel: f64,
    /// The speed the agent should not exceed.
    pub max_speed: f64,
    /// The frame period in s.
    pub dt: f64,
}

impl FollowInputs {
    /// The time to collision with the lead vehicle.
    pub fn ttc(&self) -> f64 {
        time_to_collision(self.actual_dist, self.curr_vel, self.lead_vel)
    }

    /// The distance error, positive when farther than the target.
    fn dist_err(&self) -> f64 {
        self.actual_dist - self.target_dist
    }

    /// Rate of change of the gap, measured from the previous frame when possible.
    fn dist_rate(&self) -> f64 {
        match self.prev_actual_dist {
            Some(prev) if self.dt > 0.0 => (self.actual_dist - prev) / self.dt,
            _ => self.lead_vel - self.curr_vel,
        }
    }

    fn is_valid(&self) -> bool {
        self.actual_dist.is_finite() && self.target_dist.is_finite()
    }
}

/// The normal following controller.
///
/// Combines a velocity term, an asymmetric PD term on the distance error
/// (softer when farther than the target) and a term limiting the approach
/// speed which fades out as the time to collision grows. Positive output is
/// limited to what still lets the agent stop short of the target gap under
/// `neg_acc_clip`.
pub fn normal_follow(inputs: &FollowInputs, gains: &FollowGains) -> Result<f64, NotEngaged> {
    if !inputs.is_valid() {
        return Err(NotEngaged::UnknownDistance);
    }

    let dist_err = inputs.dist_err();
    let dist_kp = if dist_err > 0.0 {
        gains.dist_kp * gains.far_dist_scale
    } else {
        gains.dist_kp
    };
    let dist_term = dist_kp * dist_err + gains.dist_kd * inputs.dist_rate();
    let vel_term = gains.vel_kp * (inputs.lead_vel - inputs.curr_vel);

    let closing = f64::max(inputs.curr_vel - inputs.lead_vel, 0.0);
    let fade = if gains.approach_ttc > 0.0 {
        f64::min(gains.approach_ttc / inputs.ttc(), 1.0)
    } else {
        0.0
    };
    let approach_term = -gains.approach_kp * closing * fade;

    let mut acc = vel_term + dist_term + approach_term;
    if inputs.max_speed.is_finite() {
        acc = f64::min(acc, inputs.max_speed - inputs.curr_vel);
    }

    // The closing speed from which the agent can still brake to the target gap
    let safe_closing = (2.0 * -gains.neg_acc_clip * f64::max(dist_err, 0.0)).sqrt();
    let pos_limit = f64::min(gains.pos_acc_clip, f64::max(safe_closing - closing, 0.0));
    let acc = acc.clamp(gains.neg_acc_clip, f64::max(pos_limit, gains.neg_acc_clip));

    if !gains.allow_catch_up && acc > 0.0 && dist_err > gains.catch_up_range {
        return Err(NotEngaged::CatchUpRefused { gap: dist_err });
    }
    Ok(acc)
}

/// The emergency following controller.
///
/// Only ever brakes: a PD term on the distance error, which is never allowed
/// to go positive, plus a term matching the lead vehicle's acceleration. Once
/// the lead pulls away by more than `windup_margin` m/s it idles at zero.
pub fn emergency_follow(
    inputs: &FollowInputs,
    gains: &FollowGains,
    windup_margin: f64,
) -> Result<f64, NotEngaged> {
    if !inputs.is_valid() {
        return Err(NotEngaged::UnknownDistance);
    }
    if inputs.lead_vel - inputs.curr_vel > windup_margin {
        return Ok(0.0);
    }
    let dist_err = f64::min(inputs.dist_err(), 0.0);
    let acc = gains.dist_kp * dist_err
        + gains.dist_kd * inputs.dist_rate()
        + gains.acc_match_kp * inputs.lead_acc;
    Ok(acc.clamp(gains.neg_acc_clip, 0.0))
}

/// Blends the normal and emergency controllers and decides whether following
/// is engaged at all.
#[derive(Clone, Debug)]
pub struct FollowController {
    params: FollowParams,
}

impl FollowController {
    pub fn new(params: FollowParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &FollowParams {
        &self.params
    }

    /// The desired gap behind a lead vehicle when travelling at `vel`.
    pub fn target_dist(&self, vel: f64) -> f64 {
        self.params.min_gap + self.params.time_headway * f64::max(vel, 0.0)
    }

    /// The weight of the emergency controller at the given time to collision.
    pub fn emergency_weight(&self, ttc: f64) -> f64 {
        let p = &self.params;
        if ttc <= p.ttc_emergency {
            1.0
        } else if ttc >= p.ttc_normal {
            0.0
        } else {
            1.0 - Interval::new(p.ttc_emergency, p.ttc_normal).inv_lerp(ttc)
        }
    }

    /// Computes the following acceleration, or why following is not engaged.
    pub fn compute(&self, inputs: &FollowInputs) -> Result<f64, NotEngaged> {
        let p = &self.params;
        if !inputs.is_valid() {
            return Err(NotEngaged::UnknownDistance);
        }

        let stopped = inputs.curr_vel < STOPPED_VEL && inputs.lead_vel < STOPPED_VEL;
        if stopped
            && (inputs.target_dist <= ZERO_TARGET_DIST || inputs.actual_dist <= inputs.target_dist)
        {
            return Ok(p.hold_accel);
        }

        if inputs.actual_dist > p.engage_dist {
            return Err(NotEngaged::OutOfRange {
                distance: inputs.actual_dist,
            });
        }
        let ttc = inputs.ttc();
        if ttc > p.ttc_disengage && inputs.actual_dist > p.disengage_dist {
            return Err(NotEngaged::Disengaged { ttc });
        }

        let weight = self.emergency_weight(ttc);
        if weight >= 1.0 {
            return emergency_follow(inputs, &p.emergency, p.windup_margin);
        }
        let normal = normal_follow(inputs, &p.normal)?;
        if weight <= 0.0 {
            return Ok(normal);
        }
        let emergency = emergency_follow(inputs, &p.emergency, p.windup_margin)?;
        Ok(weight * emergency + (1.0 - weight) * normal)
    }
}

/// The coarse classification of an acceleration command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AccelState {
    #[default]
    Stop,
    Steady,
    Accel,
    Decel,
    Emergency,
}

impl AccelState {
    fn classify(accel: f64, vel: f64, params: &DelayParams) -> Self {
        if vel < STOPPED_VEL && accel <= params.steady_band {
            Self::Stop
        } else if accel < params.emergency_accel {
            Self::Emergency
        } else if accel > params.steady_band {
            Self::Accel
        } else if accel < -params.steady_band {
            Self::Decel
        } else {
            Self::Steady
        }
    }

    /// Whether a driver takes a moment to react to this change.
    fn is_delayed_transition(self, to: Self) -> bool {
        use AccelState::*;
        matches!(
            (self, to),
            (Stop, Accel) | (Steady, Accel) | (Steady, Decel) | (Accel, Decel) | (Decel, Accel)
        )
    }
}

/// Reaction delay state kept by an agent from frame to frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FollowState {
    /// The state of the last adopted acceleration.
    pub old_state: AccelState,
    /// The last adopted acceleration.
    pub old_output: Option<f64>,
    /// Time spent holding a transition, in s.
    pub timer: f64,
    /// Whether a transition is being held.
    pub counting: bool,
    /// The state being transitioned to while counting.
    pending: AccelState,
}

/// Models the time a driver takes to react to a change in the situation.
///
/// A transition between acceleration states that a driver would have to
/// notice first (e.g. starting off, or braking after cruising) is held off
/// for the reaction time, during which the previous output is repeated.
#[derive(Clone, Debug)]
pub struct ReactionDelay {
    params: DelayParams,
    state: FollowState,
}

impl ReactionDelay {
    pub fn new(params: DelayParams) -> Self {
        Self {
            params,
            state: FollowState::default(),
        }
    }

    pub fn state(&self) -> &FollowState {
        &self.state
    }

    /// Forgets the last adopted acceleration, so the next one applies at once.
    pub fn reset(&mut self) {
        self.state = FollowState::default();
    }

    /// Passes `accel`, computed for an agent travelling at `vel`, through the delay.
    pub fn apply(&mut self, accel: f64, vel: f64, dt: f64) -> f64 {
        let new_state = AccelState::classify(accel, vel, &self.params);
        let Some(old_output) = self.state.old_output else {
            return self.adopt(new_state, accel);
        };

        if self.state.counting {
            if new_state != self.state.pending {
                return self.adopt(new_state, accel);
            }
            self.state.timer += dt;
            if self.state.timer + TIMER_EPSILON >= self.params.reaction_time {
                log::debug!(
                    "reaction delay: {:?} -> {:?} after {:.2} s",
                    self.state.old_state,
                    new_state,
                    self.state.timer
                );
                return self.adopt(new_state, accel);
            }
            return old_output;
        }

        if self.params.reaction_time > 0.0 && self.state.old_state.is_delayed_transition(new_state)
        {
            log::debug!(
                "reaction delay: holding {:?} -> {:?}",
                self.state.old_state,
                new_state
            );
            self.state.counting = true;
            self.state.pending = new_state;
            self.state.timer = 0.0;
            return old_output;
        }

        self.adopt(new_state, accel)
    }

    fn adopt(&mut self, state: AccelState, accel: f64) -> f64 {
        self.state = FollowState {
            old_state: state,
            old_output: Some(accel),
            timer: 0.0,
            counting: false,
            pending: state,
        };
        accel
    }
}

/// Resolves the accelerations proposed by several behaviours in one frame.
///
/// The most restrictive proposal wins, except that when the only proposals
/// are free driving and following, and following permits catching up, the
/// follow proposal wins whatever its value.
pub fn conservative_select(
    candidates: &[(f64, Behavior)],
    follow_allows_catch_up: bool,
) -> Option<(f64, Behavior)> {
    if follow_allows_catch_up && candidates.len() == 2 {
        let has = |b| candidates.iter().any(|c| c.1 == b);
        if has(Behavior::FreeDrive) {
            if let Some(follow) = candidates.iter().find(|c| c.1 == Behavior::Follow) {
                return Some(*follow);
            }
        }
    }
    candidates.iter().copied().min_by(|a, b| a.0.total_cmp(&b.0))
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn inputs(actual_dist: f64, curr_vel: f64, lead_vel: f64) -> FollowInputs {
        let controller = FollowController::new(FollowParams::default());
        FollowInputs {
            target_dist: controller.target_dist(curr_vel),
            actual_dist,
            prev_actual_dist: None,
            lead_vel,
            lead_acc: 0.0,
            curr_vel,
            max_speed: 30.0,
            dt: 0.1,
        }
    }

    #[test]
    fn blend_matches_controllers_at_boundaries() {
        let controller = FollowController::new(FollowParams::default());
        let p = controller.params().clone();

        let close = inputs(25.0, 20.0, 10.0);
        assert!(close.ttc() <= p.ttc_emergency);
        let expected = emergency_follow(&close, &p.emergency, p.windup_margin).unwrap();
        assert_approx_eq!(controller.compute(&close).unwrap(), expected);

        let relaxed = inputs(30.0, 20.0, 16.0);
        assert!(relaxed.ttc() >= p.ttc_normal);
        let expected = normal_follow(&relaxed, &p.normal).unwrap();
        assert_approx_eq!(controller.compute(&relaxed).unwrap(), expected);

        let between = inputs(27.0, 20.0, 14.0);
        let ttc = between.ttc();
        assert!(ttc > p.ttc_emergency && ttc < p.ttc_normal);
        let e = emergency_follow(&between, &p.emergency, p.windup_margin).unwrap();
        let n = normal_follow(&between, &p.normal).unwrap();
        let out = controller.compute(&between).unwrap();
        assert!(out >= f64::min(e, n) - 1e-9 && out <= f64::max(e, n) + 1e-9);
        let weight = controller.emergency_weight(ttc);
        assert!(weight > 0.0 && weight < 1.0);
        assert_approx_eq!(out, weight * e + (1.0 - weight) * n);
    }

    #[test]
    fn stopped_lead_ahead_triggers_emergency_braking() {
        let controller = FollowController::new(FollowParams::default());
        let scenario = inputs(50.0, 20.0, 0.0);
        assert!(scenario.ttc() < controller.params().ttc_emergency);
        let acc = controller.compute(&scenario).unwrap();
        assert!(acc < 0.0);
        assert!(acc >= controller.params().emergency.neg_acc_clip);
    }

    #[test]
    fn stopped_behind_stopped_lead_holds() {
        let controller = FollowController::new(FollowParams::default());
        let mut scenario = inputs(0.0, 0.0, 0.0);
        scenario.target_dist = 0.0;
        assert_approx_eq!(controller.compute(&scenario).unwrap(), -0.5);

        scenario.target_dist = 2.0;
        scenario.actual_dist = 1.5;
        assert_approx_eq!(controller.compute(&scenario).unwrap(), -0.5);
    }

    #[test]
    fn engagement_preconditions() {
        let controller = FollowController::new(FollowParams::default());
        assert_eq!(
            controller.compute(&inputs(200.0, 20.0, 0.0)),
            Err(NotEngaged::OutOfRange { distance: 200.0 })
        );
        assert!(matches!(
            controller.compute(&inputs(100.0, 10.0, 10.0)),
            Err(NotEngaged::Disengaged { .. })
        ));
        assert_eq!(
            controller.compute(&inputs(f64::NAN, 10.0, 10.0)),
            Err(NotEngaged::UnknownDistance)
        );
        // Close enough to stay engaged even when not closing in.
        assert!(controller.compute(&inputs(60.0, 10.0, 10.0)).is_ok());
    }

    #[test]
    fn normal_follow_settles_and_catches_up() {
        let gains = FollowGains::normal();
        let steady = inputs(17.0, 10.0, 10.0);
        assert_approx_eq!(normal_follow(&steady, &gains).unwrap(), 0.0);

        let far = inputs(60.0, 10.0, 10.0);
        assert_approx_eq!(normal_follow(&far, &gains).unwrap(), gains.pos_acc_clip);

        let too_close = inputs(8.0, 10.0, 10.0);
        assert!(normal_follow(&too_close, &gains).unwrap() < 0.0);

        let no_catch_up = FollowGains {
            allow_catch_up: false,
            ..FollowGains::normal()
        };
        assert_eq!(
            normal_follow(&inputs(100.0, 10.0, 10.0), &no_catch_up),
            Err(NotEngaged::CatchUpRefused { gap: 83.0 })
        );
        assert!(normal_follow(&far, &no_catch_up).is_ok());
    }

    #[test]
    fn normal_follow_respects_max_speed() {
        let gains = FollowGains::normal();
        let mut far = inputs(60.0, 10.0, 10.0);
        far.max_speed = 10.5;
        assert_approx_eq!(normal_follow(&far, &gains).unwrap(), 0.5);
    }

    #[test]
    fn emergency_follow_never_accelerates() {
        let gains = FollowGains::emergency();
        let mut scenario = inputs(10.0, 15.0, 14.0);
        scenario.lead_acc = 2.0;
        let acc = emergency_follow(&scenario, &gains, 3.0).unwrap();
        assert!(acc <= 0.0 && acc >= gains.neg_acc_clip);

        // The lead is pulling away, so there is nothing to brake for.
        let pulling_away = inputs(10.0, 10.0, 20.0);
        assert_eq!(emergency_follow(&pulling_away, &gains, 3.0), Ok(0.0));
    }

    #[test]
    fn gap_change_uses_previous_distance() {
        let gains = FollowGains::emergency();
        let mut scenario = inputs(30.0, 10.0, 10.0);
        assert_eq!(emergency_follow(&scenario, &gains, 3.0), Ok(0.0));
        scenario.prev_actual_dist = Some(30.5);
        assert_approx_eq!(emergency_follow(&scenario, &gains, 3.0).unwrap(), -4.0);
    }

    #[test]
    fn unchanged_state_passes_through() {
        let mut delay = ReactionDelay::new(DelayParams::default());
        assert_eq!(delay.apply(1.0, 10.0, 0.1), 1.0);
        assert_eq!(delay.apply(1.4, 10.0, 0.1), 1.4);
        assert_eq!(delay.apply(0.8, 10.0, 0.1), 0.8);
        assert!(!delay.state().counting);
    }

    #[test]
    fn recognised_transition_is_held() {
        let params = DelayParams::default();
        let mut delay = ReactionDelay::new(params.clone());
        assert_eq!(delay.apply(0.0, 10.0, 0.1), 0.0);
        assert_eq!(delay.state().old_state, AccelState::Steady);

        // Steady to decel is held for the reaction time.
        let mut outputs = vec![];
        for _ in 0..8 {
            outputs.push(delay.apply(-1.5, 10.0, 0.1));
        }
        assert_eq!(&outputs[..5], &[0.0; 5]);
        assert_eq!(outputs[5], -1.5);
        assert_eq!(delay.state().old_state, AccelState::Decel);
        assert!(!delay.state().counting);
    }

    #[test]
    fn emergency_and_reverted_transitions_are_immediate() {
        let mut delay = ReactionDelay::new(DelayParams::default());
        delay.apply(0.0, 10.0, 0.1);
        assert_eq!(delay.apply(-6.0, 10.0, 0.1), -6.0);

        let mut delay = ReactionDelay::new(DelayParams::default());
        delay.apply(0.0, 10.0, 0.1);
        assert_eq!(delay.apply(1.0, 10.0, 0.1), 0.0);
        assert!(delay.state().counting);
        assert_eq!(delay.apply(0.1, 10.0, 0.1), 0.1);
        assert!(!delay.state().counting);
    }

    #[test]
    fn reset_forgets_the_last_output() {
        let mut delay = ReactionDelay::new(DelayParams::default());
        assert_eq!(delay.apply(-3.0, 25.0, 0.1), -3.0);
        assert_eq!(delay.apply(1.0, 25.0, 0.1), -3.0);

        delay.reset();
        assert_eq!(delay.state(), &FollowState::default());
        assert_eq!(delay.apply(1.0, 25.0, 0.1), 1.0);
    }

    #[test]
    fn starting_off_is_delayed() {
        let mut delay = ReactionDelay::new(DelayParams::default());
        assert_eq!(delay.apply(-0.5, 0.0, 0.1), -0.5);
        assert_eq!(delay.state().old_state, AccelState::Stop);
        assert_eq!(delay.apply(1.5, 0.0, 0.1), -0.5);
    }

    #[test]
    fn most_conservative_proposal_wins() {
        let proposals = [
            (1.0, Behavior::FreeDrive),
            (-0.8, Behavior::Curvature),
            (0.2, Behavior::Follow),
        ];
        assert_eq!(conservative_select(&proposals, true), Some((-0.8, Behavior::Curvature)));
        assert_eq!(conservative_select(&[], true), None);
    }

    #[test]
    fn engaged_follow_overrides_cruise() {
        let proposals = [(0.3, Behavior::FreeDrive), (1.2, Behavior::Follow)];
        assert_eq!(conservative_select(&proposals, true), Some((1.2, Behavior::Follow)));
        assert_eq!(conservative_select(&proposals, false), Some((0.3, Behavior::FreeDrive)));
    }
}
