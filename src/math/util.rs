use super::{Point2d, Vector2d};
use cgmath::prelude::*;

/// Rotates a vector 90 degrees clockwise.
pub fn rot90(vec: Vector2d) -> Vector2d {
    Vector2d::new(-vec.y, vec.x)
}

/// Computes the radius of the circle passing through three points, in the
/// units of the points. Returns `f64::INFINITY` for collinear points.
pub fn circumradius(a: Point2d, b: Point2d, c: Point2d) -> f64 {
    let ab = b - a;
    let ac = c - a;
    let twice_area = ab.perp_dot(ac).abs();
    if twice_area < 1e-9 {
        return f64::INFINITY;
    }
    let bc = c - b;
    (ab.magnitude() * ac.magnitude() * bc.magnitude()) / (2.0 * twice_area)
}
