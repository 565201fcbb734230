use crate::rng::RngStream;
use crate::units::{ft, GRAVITY};
use rand_distr::{Distribution, Normal};

/// Every parameter group of an agent.
#[derive(Clone, Debug, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct AgentParams {
    pub cruise: CruiseParams,
    pub curvature: CurvatureParams,
    pub follow: FollowParams,
    pub delay: DelayParams,
    pub merge: MergeParams,
}

/// Free-driving parameters.
#[derive(Clone, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct CruiseParams {
    /// The maximum acceleration of the vehicle.
    pub max_acc: f64,
    /// The comfortable deceleration of the vehicle, a positive number.
    pub comf_dec: f64,
    /// The hardest deceleration the vehicle can produce, a negative number.
    pub max_dec: f64,
    /// Multiplies the speed limit to give the desired speed.
    pub speed_factor: f64,
    /// Standard deviation of the randomised `speed_factor`.
    pub speed_factor_stddev: f64,
}

/// Curve speed planning parameters.
#[derive(Clone, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct CurvatureParams {
    /// Spacing of curvature samples along the path.
    pub sample_step: f64,
    /// How far ahead of the agent the path is sampled.
    pub lookahead: f64,
    /// Lateral acceleration tolerated in curves.
    pub lat_accel_limit: f64,
    /// Buckets needing a gentler acceleration than this are not advised.
    pub min_accel_threshold: f64,
    /// The longest a low-severity bucket may grow.
    pub small_zone_max_len: f64,
    /// Frames between incremental path refreshes.
    pub refresh_frames: u64,
}

/// Gains and clips of one following controller. The normal, emergency and
/// merge-tracking controllers differ only in these numbers.
#[derive(Clone, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct FollowGains {
    /// Gain on the velocity difference to the lead vehicle.
    pub vel_kp: f64,
    /// Proportional gain on the distance error.
    pub dist_kp: f64,
    /// Derivative gain on the distance error.
    pub dist_kd: f64,
    /// Scales `dist_kp` when farther than the target distance.
    pub far_dist_scale: f64,
    /// Gain on the closing speed.
    pub approach_kp: f64,
    /// Time to collision beyond which the approach term fades out.
    pub approach_ttc: f64,
    /// Gain on the lead vehicle's acceleration.
    pub acc_match_kp: f64,
    pub pos_acc_clip: f64,
    pub neg_acc_clip: f64,
    /// Whether the controller may accelerate to catch up with a distant lead.
    pub allow_catch_up: bool,
    /// Without catch-up, no positive output when the gap exceeds the target by this.
    pub catch_up_range: f64,
}

/// Car following parameters.
#[derive(Clone, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct FollowParams {
    pub normal: FollowGains,
    pub emergency: FollowGains,
    /// The desired time gap to the lead vehicle.
    pub time_headway: f64,
    /// The desired gap when stopped.
    pub min_gap: f64,
    /// At or below this time to collision only the emergency controller acts.
    pub ttc_emergency: f64,
    /// At or above this time to collision only the normal controller acts.
    pub ttc_normal: f64,
    /// Beyond this time to collision, with a gap over `disengage_dist`, following stops.
    pub ttc_disengage: f64,
    /// Leads farther than this are not followed.
    pub engage_dist: f64,
    pub disengage_dist: f64,
    /// The emergency controller idles once the lead pulls away faster than this.
    pub windup_margin: f64,
    /// Output when stopped behind a stopped lead.
    pub hold_accel: f64,
}

/// Reaction delay parameters.
#[derive(Clone, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct DelayParams {
    /// How long a recognised transition is held off, in s.
    pub reaction_time: f64,
    /// Standard deviation of the randomised `reaction_time`.
    pub reaction_time_stddev: f64,
    /// Accelerations within this band of zero count as steady.
    pub steady_band: f64,
    /// Accelerations below this count as emergency braking.
    pub emergency_accel: f64,
}

/// On-ramp merging parameters.
#[derive(Clone, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct MergeParams {
    /// Distance from the merge transition point P to the reference point P1.
    pub p1_offset: f64,
    /// Gap search starts once the agent is this close to P1 in time.
    pub gap_search_tta: f64,
    /// Minimum arrival time margin behind the gap leader.
    pub min_ttc_gap: f64,
    /// Minimum arrival time margin ahead of the gap follower.
    pub min_spacing: f64,
    /// Deceleration, in g, defining the stopping distance before P1.
    pub stop_decel_g: f64,
    /// Target distance when tracking the gap leader.
    pub target_dist: f64,
    pub track: FollowGains,
    /// Gap leaders farther than this cannot be tracked.
    pub track_range: f64,
    /// Acceleration when tracking without a leader.
    pub free_accel: f64,
    /// Number of target-lane vehicles whose speed is averaged before the search.
    pub avg_count: usize,
}

impl AgentParams {
    /// Draws this agent's individual parameters from the given RNG stream.
    pub fn randomise(&mut self, rng: &mut RngStream) {
        let cruise = &mut self.cruise;
        if let Ok(distr) = Normal::new(1.0, cruise.speed_factor_stddev) {
            cruise.speed_factor = distr.sample(rng.inner()).clamp(0.75, 1.25);
        }
        let delay = &mut self.delay;
        if let Ok(distr) = Normal::new(delay.reaction_time, delay.reaction_time_stddev) {
            let mean = delay.reaction_time;
            delay.reaction_time = distr.sample(rng.inner()).clamp(0.0, 2.0 * mean);
        }
    }

    /// Parses parameters from JSON. Missing fields take their default values.
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Default for CruiseParams {
    fn default() -> Self {
        Self {
            max_acc: 2.0,
            comf_dec: 2.5,
            max_dec: -6.0,
            speed_factor: 1.0,
            speed_factor_stddev: 0.1,
        }
    }
}

impl Default for CurvatureParams {
    fn default() -> Self {
        Self {
            sample_step: ft(6.0),
            lookahead: ft(2500.0),
            lat_accel_limit: 3.0,
            min_accel_threshold: -0.3,
            small_zone_max_len: 3.3,
            refresh_frames: 1,
        }
    }
}

impl FollowGains {
    /// Gains of the normal distance/velocity controller.
    pub fn normal() -> Self {
        Self {
            vel_kp: 0.5,
            dist_kp: 0.15,
            dist_kd: 0.3,
            far_dist_scale: 0.4,
            approach_kp: 0.5,
            approach_ttc: 6.0,
            acc_match_kp: 0.0,
            pos_acc_clip: 2.0,
            neg_acc_clip: -4.0,
            allow_catch_up: true,
            catch_up_range: 60.0,
        }
    }

    /// Gains of the time-to-collision triggered emergency controller.
    pub fn emergency() -> Self {
        Self {
            vel_kp: 0.0,
            dist_kp: 0.5,
            dist_kd: 0.8,
            far_dist_scale: 1.0,
            approach_kp: 0.0,
            approach_ttc: 0.0,
            acc_match_kp: 0.5,
            pos_acc_clip: 0.0,
            neg_acc_clip: -8.0,
            allow_catch_up: false,
            catch_up_range: 0.0,
        }
    }

    /// Gains for tracking a gap leader while merging.
    pub fn merge_track() -> Self {
        Self {
            vel_kp: 0.5,
            dist_kp: 0.2,
            dist_kd: 0.4,
            far_dist_scale: 1.0,
            approach_kp: 0.3,
            approach_ttc: 4.0,
            acc_match_kp: 0.0,
            pos_acc_clip: 2.0,
            neg_acc_clip: -3.0,
            allow_catch_up: true,
            catch_up_range: 0.0,
        }
    }
}

impl Default for FollowGains {
    fn default() -> Self {
        Self::normal()
    }
}

impl Default for FollowParams {
    fn default() -> Self {
        Self {
            normal: FollowGains::normal(),
            emergency: FollowGains::emergency(),
            time_headway: 1.5,
            min_gap: 2.0,
            ttc_emergency: 3.0,
            ttc_normal: 6.0,
            ttc_disengage: 20.0,
            engage_dist: 150.0,
            disengage_dist: 80.0,
            windup_margin: 3.0,
            hold_accel: -0.5,
        }
    }
}

impl Default for DelayParams {
    fn default() -> Self {
        Self {
            reaction_time: 0.5,
            reaction_time_stddev: 0.1,
            steady_band: 0.25,
            emergency_accel: -4.0,
        }
    }
}

impl Default for MergeParams {
    fn default() -> Self {
        Self {
            p1_offset: ft(20.0),
            gap_search_tta: 5.0,
            min_ttc_gap: 1.5,
            min_spacing: 2.0,
            stop_decel_g: 0.3,
            target_dist: ft(20.0),
            track: FollowGains::merge_track(),
            track_range: 150.0,
            free_accel: 0.5,
            avg_count: 4,
        }
    }
}

impl MergeParams {
    /// The deceleration used for the stopping distance before P1, a positive number.
    pub fn stop_decel(&self) -> f64 {
        self.stop_decel_g * GRAVITY
    }
}
