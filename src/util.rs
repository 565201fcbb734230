//! Miscellaneous utility structs and functions.

use cgmath::num_traits::Float;
use std::fmt::Debug;

/// Saturated time, in s, standing in for "never" inside time-to-collision
/// and time-to-arrival arithmetic.
pub const INFINITE_TIME: f64 = 9999.0;

/// Speeds below this, in m/s, are treated as stationary.
pub const STOPPED_VEL: f64 = 0.1;

/// An interval on the real number line.
#[derive(Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Interval<T> {
    pub min: T,
    pub max: T,
}

impl<T> Interval<T> {
    /// Creates a new interval.
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl<T: PartialOrd> Interval<T> {
    /// Returns true if this interval overlaps with the other.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.max > other.min && other.max > self.min
    }

    /// Returns true if this interval contains the value.
    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }
}

impl<T: std::ops::Sub<T, Output = T> + Copy> Interval<T> {
    /// Gets the magnitude of the interval.
    pub fn length(&self) -> T {
        self.max - self.min
    }
}

impl<T: Float> Interval<T> {
    /// Creates an interval with the given centre and radius.
    pub fn disc(centre: T, radius: T) -> Self {
        Self {
            min: centre - radius,
            max: centre + radius,
        }
    }

    /// Computes the gap between two intervals.
    /// Will be negative if the intervals overlap.
    pub fn clearance_with(&self, other: &Self) -> T {
        T::max(other.min - self.max, self.min - other.max)
    }

    pub fn lerp(&self, t: T) -> T {
        self.min + t * (self.max - self.min)
    }

    pub fn inv_lerp(&self, value: T) -> T {
        (value - self.min) / (self.max - self.min)
    }
}

impl<T: Debug> Debug for Interval<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Interval({:?}, {:?})", &self.min, &self.max)
    }
}

/// Time until a follower closes a gap of `dist` m on a leader, in s.
///
/// Saturates at [INFINITE_TIME] when the follower is not closing in.
pub fn time_to_collision(dist: f64, own_vel: f64, lead_vel: f64) -> f64 {
    let closing = own_vel - lead_vel;
    if closing <= 1e-3 || !dist.is_finite() {
        return INFINITE_TIME;
    }
    f64::min(f64::max(dist, 0.0) / closing, INFINITE_TIME)
}

/// Time until a vehicle travelling at `vel` covers `dist` m, in s.
///
/// Negative when the point has already been passed; saturates at
/// [INFINITE_TIME] when the vehicle is stationary short of the point.
pub fn time_to_arrival(dist: f64, vel: f64) -> f64 {
    if vel < STOPPED_VEL {
        return if dist <= 0.0 { 0.0 } else { INFINITE_TIME };
    }
    (dist / vel).clamp(-INFINITE_TIME, INFINITE_TIME)
}
