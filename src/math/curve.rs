use super::{rot90, Point2d, Vector2d};
use crate::util::Interval;
use cgmath::prelude::*;

/// A parametric curve in 2D space.
pub trait ParametricCurve2d {
    /// Samples the parametric curve.
    fn sample(&self, t: f64) -> Point2d;

    /// Returns the minimum and maximum t-values that define the bounds of the curve.
    fn bounds(&self) -> Interval<f64>;
}

impl<T: ParametricCurve2d + ?Sized> ParametricCurve2d for &T {
    fn sample(&self, t: f64) -> Point2d {
        (**self).sample(t)
    }

    fn bounds(&self) -> Interval<f64> {
        (**self).bounds()
    }
}

/// A straight line segment.
#[derive(Clone, Copy, Debug)]
pub struct LineSegment2d {
    start: Point2d,
    end: Point2d,
}

impl LineSegment2d {
    /// Creates a line segment from its two end points.
    pub fn from_ends(start: Point2d, end: Point2d) -> Self {
        Self { start, end }
    }
}

impl ParametricCurve2d for LineSegment2d {
    fn sample(&self, t: f64) -> Point2d {
        self.start + (self.end - self.start) * t
    }

    fn bounds(&self) -> Interval<f64> {
        Interval::new(0.0, 1.0)
    }
}

/// A circular arc of constant radius, parameterised by arc length.
#[derive(Clone, Copy, Debug)]
pub struct Arc2d {
    centre: Point2d,
    radius: f64,
    start_angle: f64,
    /// +1 for an anticlockwise (left) turn, -1 for clockwise.
    sense: f64,
    length: f64,
}

impl Arc2d {
    /// Creates an arc which starts at `start` heading in direction `dir`, turning
    /// left (`left == true`) or right with the given radius, for `length` m.
    pub fn new(start: Point2d, dir: Vector2d, radius: f64, length: f64, left: bool) -> Self {
        let sense = if left { 1.0 } else { -1.0 };
        let normal = rot90(dir.normalize()) * sense;
        let centre = start + normal * radius;
        let offset = start - centre;
        Self {
            centre,
            radius,
            start_angle: offset.y.atan2(offset.x),
            sense,
            length,
        }
    }

    /// The point at the end of the arc.
    pub fn end(&self) -> Point2d {
        self.sample(self.length)
    }

    /// The unit tangent at the end of the arc.
    pub fn end_dir(&self) -> Vector2d {
        let angle = self.start_angle + self.sense * self.length / self.radius;
        Vector2d::new(-angle.sin(), angle.cos()) * self.sense
    }
}

impl ParametricCurve2d for Arc2d {
    fn sample(&self, t: f64) -> Point2d {
        let angle = self.start_angle + self.sense * t / self.radius;
        self.centre + Vector2d::new(angle.cos(), angle.sin()) * self.radius
    }

    fn bounds(&self) -> Interval<f64> {
        Interval::new(0.0, self.length)
    }
}

/// Samples points along a curve such that consecutive points are `dist` apart.
/// The final point is the end of the curve.
pub fn equidistant_points_along_curve(curve: &impl ParametricCurve2d, dist: f64) -> Vec<Point2d> {
    const MAX_REFINEMENTS: usize = 64;

    let end_ts = curve.bounds();
    let end_ps = [curve.sample(end_ts.min), curve.sample(end_ts.max)];

    let mut ts = end_ts;
    let mut ps = end_ps;
    let mut dists = Interval::new(0.0, (ps[1] - ps[0]).magnitude());

    let mut points = vec![end_ps[0]];
    let mut last_p = end_ps[0];

    while dists.max > dist {
        let mut refinements = 0;
        loop {
            let new_t = ts.lerp(dists.inv_lerp(dist));
            let new_p = curve.sample(new_t);
            let new_dist = (new_p - last_p).magnitude();
            let f = new_dist / dist;
            refinements += 1;

            if f < 0.99 && refinements < MAX_REFINEMENTS {
                ts.min = new_t;
                ps[0] = new_p;
                dists.min = new_dist;
            } else if f > 1.01 && refinements < MAX_REFINEMENTS {
                ts.max = new_t;
                ps[1] = new_p;
                dists.max = new_dist;
            } else {
                points.push(new_p);
                last_p = new_p;

                ts = Interval::new(new_t, end_ts.max);
                ps = [new_p, end_ps[1]];
                dists = Interval::new(0.0, (ps[1] - ps[0]).magnitude());
                break;
            }
        }
    }

    if dists.max > 0.001 * dist {
        points.push(end_ps[1]);
    }
    points
}
