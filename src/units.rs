/// Metres per foot.
pub const FEET_TO_METERS: f64 = 0.3048;

/// Feet per metre.
pub const METERS_TO_FEET: f64 = 1.0 / FEET_TO_METERS;

/// Metres per second in one mile per hour.
pub const MPH_TO_MS: f64 = 0.44704;

/// Standard gravity in m/s<sup>2</sup>.
pub const GRAVITY: f64 = 9.80665;

/// Converts a length in feet to metres.
#[inline]
pub fn ft(feet: f64) -> f64 {
    feet * FEET_TO_METERS
}

/// Converts a length in metres to feet.
#[inline]
pub fn to_ft(meters: f64) -> f64 {
    meters * METERS_TO_FEET
}

/// Converts a speed in mph to m/s.
#[inline]
pub fn mph(mph: f64) -> f64 {
    mph * MPH_TO_MS
}

/// Converts a speed in m/s to mph.
#[inline]
pub fn to_mph(ms: f64) -> f64 {
    ms / MPH_TO_MS
}
