use super::{circumradius, equidistant_points_along_curve, ParametricCurve2d, Point2d};
use cgmath::prelude::*;

/// Half-width of the window, in m, over which the radius of curvature is measured.
const RADIUS_WINDOW: f64 = 3.0;

/// An arc-length parameterised sequence of points describing a centre line.
#[derive(Clone, Debug, Default)]
pub struct Polyline {
    points: Vec<Point2d>,
    /// Cumulative distance along the polyline at each point.
    dists: Vec<f64>,
}

impl Polyline {
    /// Creates a polyline through the given points.
    pub fn new(points: impl IntoIterator<Item = Point2d>) -> Self {
        let mut polyline = Self::default();
        polyline.extend(points);
        polyline
    }

    /// Appends points to the end of the polyline. Points which coincide with
    /// the current end point are skipped.
    pub fn extend(&mut self, points: impl IntoIterator<Item = Point2d>) {
        for point in points {
            match self.points.last() {
                Some(last) => {
                    let step = (point - *last).magnitude();
                    if step < 1e-6 {
                        continue;
                    }
                    let dist = self.length() + step;
                    self.points.push(point);
                    self.dists.push(dist);
                }
                None => {
                    self.points.push(point);
                    self.dists.push(0.0);
                }
            }
        }
    }

    /// Appends a sampled curve to the end of the polyline.
    pub fn extend_with_curve(&mut self, curve: &impl ParametricCurve2d, step: f64) {
        self.extend(equidistant_points_along_curve(curve, step));
    }

    /// The total length of the polyline in m.
    pub fn length(&self) -> f64 {
        self.dists.last().copied().unwrap_or(0.0)
    }

    /// The last point of the polyline, if any.
    pub fn end(&self) -> Option<Point2d> {
        self.points.last().copied()
    }

    /// Samples the point `dist` m along the polyline, clamped to its ends.
    pub fn point_at(&self, dist: f64) -> Option<Point2d> {
        let first = *self.points.first()?;
        if self.points.len() == 1 || dist <= 0.0 {
            return Some(first);
        }
        let idx = self.dists.partition_point(|d| *d < dist);
        if idx >= self.points.len() {
            return self.end();
        }
        let (d0, d1) = (self.dists[idx - 1], self.dists[idx]);
        let t = (dist - d0) / (d1 - d0);
        let (p0, p1) = (self.points[idx - 1], self.points[idx]);
        Some(p0 + (p1 - p0) * t)
    }

    /// The radius of curvature, in m, at `dist` m along the polyline.
    ///
    /// Straight sections report `f64::INFINITY`. Returns `None` when `dist` lies
    /// outside the polyline or the polyline is too short to measure.
    pub fn radius_at(&self, dist: f64) -> Option<f64> {
        let length = self.length();
        if self.points.len() < 3 || !(0.0..=length).contains(&dist) {
            return None;
        }
        let window = f64::min(RADIUS_WINDOW, 0.5 * length);
        let mid = dist.clamp(window, length - window);
        let a = self.point_at(mid - window)?;
        let b = self.point_at(mid)?;
        let c = self.point_at(mid + window)?;
        Some(circumradius(a, b, c))
    }
}
