use super::cruise::required_accel;
use crate::error::GeometryError;
use crate::params::CurvatureParams;
use crate::units::to_ft;
use crate::world::{Path, RoadPosition};
use std::collections::VecDeque;

/// Radius thresholds, in ft, of severities 0 (straight) to 7 (sharp).
const SEVERITY_RADII_FT: [f64; 8] = [10000.0, 5000.0, 1000.0, 500.0, 300.0, 100.0, 40.0, 0.0];

/// How sharp a curve is, from 0 (straight) to 7.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Severity(u8);

impl Severity {
    pub const STRAIGHT: Severity = Severity(0);

    /// Beyond a harsh curve there is nothing to gain from looking further.
    pub const HARSH: Severity = Severity(6);

    /// Classifies a radius of curvature given in m.
    pub fn from_radius(radius: f64) -> Self {
        let radius_ft = to_ft(radius);
        SEVERITY_RADII_FT
            .iter()
            .position(|threshold| radius_ft >= *threshold)
            .map(|code| Severity(code as u8))
            .unwrap_or(Self::STRAIGHT)
    }

    /// The numeric severity code.
    pub fn code(self) -> u8 {
        self.0
    }

    pub fn is_harsh(self) -> bool {
        self >= Self::HARSH
    }

    /// Gentle curves, whose buckets are kept short.
    fn is_low(self) -> bool {
        matches!(self.0, 1 | 2)
    }
}

/// The radius of curvature at one point along the path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurvatureSample {
    /// Radius of curvature in m, infinite where straight.
    pub radius: f64,
    /// Distance along the route, measured from the route's origin, in m.
    pub dist: f64,
}

/// A contiguous zone of path with one curve severity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurvatureBucket {
    pub severity: Severity,
    /// The tightest radius in the zone, in m.
    pub min_radius: f64,
    /// The speed at which the zone can be driven, in m/s.
    pub speed: f64,
    /// Route distance of the start of the zone.
    pub start: f64,
    /// Route distance of the end of the zone.
    pub end: f64,
    /// Distance from the agent's front to the start of the zone, updated each frame.
    pub dist: f64,
    /// Acceleration needed to reach `speed` at the zone, updated each frame.
    pub required_accel: f64,
}

/// Samples the curvature ahead of one agent and advises on curve speeds.
#[derive(Clone, Debug)]
pub struct CurvaturePlanner {
    params: CurvatureParams,
    samples: VecDeque<CurvatureSample>,
    buckets: Vec<CurvatureBucket>,
    /// Frame of the last refresh.
    refreshed: Option<u64>,
    /// Base distance of the path last sampled.
    base: Option<f64>,
}

impl CurvaturePlanner {
    /// Creates a planner with no samples.
    pub fn new(params: CurvatureParams) -> Self {
        Self {
            params,
            samples: VecDeque::new(),
            buckets: vec![],
            refreshed: None,
            base: None,
        }
    }

    /// Drops all samples and buckets, so the next refresh rebuilds them.
    /// Call this when the path is replaced by a different route.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.buckets.clear();
        self.refreshed = None;
        self.base = None;
    }

    /// The current samples, nearest first.
    pub fn samples(&self) -> impl Iterator<Item = &CurvatureSample> {
        self.samples.iter()
    }

    /// The current buckets, nearest first.
    pub fn buckets(&self) -> &[CurvatureBucket] {
        &self.buckets
    }

    /// Samples the path from `start` out to the lookahead distance and builds
    /// the buckets. On an invalid position or path nothing changes.
    pub fn initialize(
        &mut self,
        start: &RoadPosition,
        path: &impl Path,
    ) -> Result<(), GeometryError> {
        if path.length() <= 0.0 {
            log::error!("curvature planner: cannot sample an empty path");
            return Err(GeometryError::InvalidPath);
        }
        let Some(local) = path.locate(start) else {
            log::error!("curvature planner: start position {:?} is not on the path", start);
            return Err(GeometryError::InvalidPosition);
        };

        self.samples.clear();
        self.base = Some(path.base_distance());
        self.sample_path(path, local, local + self.params.lookahead);
        self.reset_buckets();
        log::debug!(
            "curvature planner: sampled {} points into {} buckets",
            self.samples.len(),
            self.buckets.len()
        );
        Ok(())
    }

    /// Incrementally follows the agent along a possibly extended or trimmed path:
    /// passed samples are dropped and new ones appended at the far end. The
    /// samples are only rebuilt from scratch once they have been exhausted.
    pub fn refresh(
        &mut self,
        position: &RoadPosition,
        path: &impl Path,
        frame: u64,
    ) -> Result<(), GeometryError> {
        // A path can only grow its base, so a smaller one is a new route
        if self.base.map_or(false, |base| path.base_distance() < base) {
            self.refreshed = Some(frame);
            return self.initialize(position, path);
        }
        let due = self
            .refreshed
            .map_or(true, |last| frame.saturating_sub(last) >= self.params.refresh_frames);
        if !due {
            return Ok(());
        }
        self.refreshed = Some(frame);

        let Some(local) = path.locate(position) else {
            log::error!("curvature planner: position {:?} is not on the path", position);
            return Err(GeometryError::InvalidPosition);
        };
        let base = path.base_distance();
        self.base = Some(base);
        let here = base + local;

        match self.samples.back() {
            Some(last) if last.dist >= here => {}
            _ => return self.initialize(position, path),
        }

        while self.samples.front().map_or(false, |s| s.dist < here) {
            self.samples.pop_front();
        }

        let next = self
            .samples
            .back()
            .map_or(local, |s| s.dist - base + self.params.sample_step);
        let appended = self.sample_path(path, next, local + self.params.lookahead);
        if appended > 0 {
            self.reset_buckets();
        }
        Ok(())
    }

    /// Collapses the samples into buckets of equal severity. Straight zones
    /// produce no bucket, and low-severity buckets are split once they grow
    /// beyond the small zone length.
    pub fn reset_buckets(&mut self) {
        self.buckets.clear();
        let mut current: Option<CurvatureBucket> = None;

        for sample in &self.samples {
            let severity = Severity::from_radius(sample.radius);
            if let Some(bucket) = current.as_mut() {
                let too_long = severity.is_low()
                    && sample.dist - bucket.start > self.params.small_zone_max_len;
                if bucket.severity == severity && !too_long {
                    bucket.end = sample.dist;
                    bucket.min_radius = f64::min(bucket.min_radius, sample.radius);
                    continue;
                }
            }
            if let Some(bucket) = current.take() {
                push_bucket(&mut self.buckets, &self.params, bucket);
            }
            if severity != Severity::STRAIGHT {
                current = Some(CurvatureBucket {
                    severity,
                    min_radius: sample.radius,
                    speed: 0.0,
                    start: sample.dist,
                    end: sample.dist,
                    dist: 0.0,
                    required_accel: 0.0,
                });
            }
        }
        if let Some(bucket) = current {
            push_bucket(&mut self.buckets, &self.params, bucket);
        }
    }

    /// Recomputes each bucket's distance and required acceleration for an
    /// agent whose centre is at route distance `current` travelling at `speed`.
    /// Buckets the agent has driven out of are dropped.
    pub fn update_buckets(&mut self, current: f64, speed: f64, half_length: f64) {
        let front = current + half_length;
        self.buckets.retain(|b| b.end >= front);
        for bucket in &mut self.buckets {
            bucket.dist = bucket.start - front;
            bucket.required_accel = if bucket.dist > 0.0 || speed > bucket.speed {
                required_accel(speed, bucket.speed, bucket.dist)
            } else {
                0.0
            };
        }
    }

    /// The advisory `(speed, distance)` of the most restrictive bucket needing
    /// an acceleration below `min_accel_threshold`. Buckets past the first
    /// harsh one are not considered. `None` means the curves ahead do not
    /// constrain the agent.
    pub fn get_advisory(&self, min_accel_threshold: f64) -> Option<(f64, f64)> {
        let mut best: Option<&CurvatureBucket> = None;
        for bucket in &self.buckets {
            if bucket.dist <= self.params.lookahead
                && bucket.required_accel < min_accel_threshold
                && best.map_or(true, |b| bucket.required_accel < b.required_accel)
            {
                best = Some(bucket);
            }
            if bucket.severity.is_harsh() {
                break;
            }
        }
        best.map(|b| (b.speed, f64::max(b.dist, 0.0)))
    }

    /// Samples `[from, to]` m along the path, clipped to its length, appending
    /// to the sample list. Returns the number of samples added.
    fn sample_path(&mut self, path: &impl Path, from: f64, to: f64) -> usize {
        let base = path.base_distance();
        let to = f64::min(to, path.length());
        let mut count = 0;
        let mut dist = from;
        while dist <= to {
            if let Some(radius) = path.radius_at(dist) {
                self.samples.push_back(CurvatureSample {
                    radius,
                    dist: base + dist,
                });
                count += 1;
            }
            dist += self.params.sample_step;
        }
        count
    }
}

/// Closes a bucket, setting the speed its tightest radius allows.
fn push_bucket(
    buckets: &mut Vec<CurvatureBucket>,
    params: &CurvatureParams,
    mut bucket: CurvatureBucket,
) {
    bucket.speed = (bucket.min_radius * params.lat_accel_limit).sqrt();
    buckets.push(bucket);
}
