use crate::params::CruiseParams;
use crate::util::STOPPED_VEL;

/// The minimum distance, in m, used when approaching a speed or a stop point,
/// so the required deceleration stays finite.
const MIN_APPROACH_DIST: f64 = 0.5;

/// Calculates the acceleration needed to travel at `target` m/s on a free road.
///
/// # Arguments
/// * `vel` - The velocity of the agent (m/s).
/// * `target` - The desired speed (m/s).
pub fn cruise_accel(vel: f64, target: f64, params: &CruiseParams) -> f64 {
    if target <= STOPPED_VEL {
        return if vel > STOPPED_VEL { -params.comf_dec } else { 0.0 };
    }
    let acc = params.max_acc * (1.0 - (vel / target).powi(4));
    f64::max(acc, params.max_dec)
}

/// Calculates the acceleration needed to reach `speed` within `dist` m.
///
/// Returns `None` when the speed can be reached without exceeding the
/// comfortable deceleration threshold `threshold` (a negative number), in
/// which case the restriction does not yet constrain the agent.
///
/// # Arguments
/// * `vel` - The velocity of the agent (m/s).
/// * `speed` - The speed to reach (m/s).
/// * `dist` - The distance to the point where `speed` applies (m).
pub fn approach_speed_accel(
    vel: f64,
    speed: f64,
    dist: f64,
    threshold: f64,
    params: &CruiseParams,
) -> Option<f64> {
    let acc = required_accel(vel, speed, dist);
    (acc <= threshold).then(|| f64::max(acc, params.max_dec))
}

/// Calculates the constant acceleration taking the agent from `vel` to `speed`
/// over `dist` m.
pub fn required_accel(vel: f64, speed: f64, dist: f64) -> f64 {
    let dist = f64::max(dist, MIN_APPROACH_DIST);
    (speed.powi(2) - vel.powi(2)) / (2.0 * dist)
}

/// Calculates the acceleration needed to stop `dist` m ahead.
pub fn stop_at_point_accel(vel: f64, dist: f64, params: &CruiseParams) -> f64 {
    if vel <= STOPPED_VEL {
        return 0.0;
    }
    f64::max(required_accel(vel, 0.0, dist), params.max_dec)
}

/// Calculates the distance needed to stop from `vel` m/s decelerating at
/// `decel` m/s<sup>2</sup> (a positive number).
pub fn stopping_distance(vel: f64, decel: f64) -> f64 {
    vel.powi(2) / (2.0 * decel)
}
