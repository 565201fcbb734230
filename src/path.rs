use crate::math::{ParametricCurve2d, Polyline};
use crate::world::{Path, RoadPosition};
use crate::{CorridorId, LaneId, RoadId};

/// Spacing of the points sampled from segment curves, in m.
const GEOMETRY_STEP: f64 = 0.5;

/// An element of the road network a path passes through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathElement {
    Lane { road: RoadId, lane: LaneId },
    Corridor(CorridorId),
}

#[derive(Clone, Copy, Debug)]
struct Segment {
    element: PathElement,
    /// Distance from the start of the path to the start of the segment.
    start: f64,
    length: f64,
}

/// A path made of lanes and corridors with a centre line geometry.
///
/// Segments are appended at the far end as the route grows and dropped from
/// the near end once passed; [Path::base_distance] accumulates the length
/// dropped so far.
#[derive(Clone, Debug, Default)]
pub struct RoutePath {
    base: f64,
    segments: Vec<Segment>,
    geometry: Polyline,
    /// Distance along `geometry` of the start of the path.
    geometry_offset: f64,
}

impl RoutePath {
    /// Creates an empty path.
    pub fn new() -> Self {
        Default::default()
    }

    /// Appends a segment whose centre line is the given curve. The curve
    /// should start where the previous segment ended.
    pub fn append(&mut self, element: PathElement, curve: &impl ParametricCurve2d) {
        let before = self.geometry.length();
        self.geometry.extend_with_curve(curve, GEOMETRY_STEP);
        let length = self.geometry.length() - before;
        self.segments.push(Segment {
            element,
            start: self.length(),
            length,
        });
    }

    /// Drops every segment before the one containing `pos`.
    /// Returns the distance dropped, or `None` if `pos` is not on the path.
    pub fn trim_to(&mut self, pos: &RoadPosition) -> Option<f64> {
        let idx = self.segment_index(pos)?;
        let dropped = self.segments.get(idx).map(|s| s.start).unwrap_or(0.0);
        self.segments.drain(..idx);
        for segment in &mut self.segments {
            segment.start -= dropped;
        }
        self.base += dropped;
        self.geometry_offset += dropped;
        Some(dropped)
    }

    /// Iterates over the elements of the path in travel order.
    pub fn elements(&self) -> impl Iterator<Item = PathElement> + '_ {
        self.segments.iter().map(|s| s.element)
    }

    fn segment_index(&self, pos: &RoadPosition) -> Option<usize> {
        self.segments.iter().position(|s| match (s.element, *pos) {
            (PathElement::Lane { road, lane }, RoadPosition::Road { road: r, lane: l, .. }) => {
                road == r && lane == l
            }
            (PathElement::Corridor(c), RoadPosition::Intersection { corridor, .. }) => {
                c == corridor
            }
            _ => false,
        })
    }
}

impl Path for RoutePath {
    fn base_distance(&self) -> f64 {
        self.base
    }

    fn length(&self) -> f64 {
        self.segments.last().map(|s| s.start + s.length).unwrap_or(0.0)
    }

    fn locate(&self, pos: &RoadPosition) -> Option<f64> {
        if !pos.is_valid() {
            return None;
        }
        let segment = self.segments.get(self.segment_index(pos)?)?;
        Some(segment.start + pos.dist().clamp(0.0, segment.length))
    }

    fn radius_at(&self, dist: f64) -> Option<f64> {
        if dist < 0.0 || dist > self.length() {
            return None;
        }
        self.geometry.radius_at(dist + self.geometry_offset)
    }

    fn next_corridor(&self, dist: f64) -> Option<CorridorId> {
        self.segments
            .iter()
            .filter(|s| s.start + s.length > dist)
            .find_map(|s| match s.element {
                PathElement::Corridor(id) => Some(id),
                PathElement::Lane { .. } => None,
            })
    }
}
