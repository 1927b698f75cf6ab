//! Planar polyline helpers
//!
//! Coordinates are projected metres. Bearings are `atan2(dy, dx)` in degrees
//! (east = 0, counter-clockwise positive) and turn angles are the absolute
//! heading change wrapped to [0, 180].

use geo::{Closest, ClosestPoint, Coord, Line, LineLocatePoint, LineString, Point};

/// Segments shorter than this carry no usable heading
const DEGENERATE_LEN: f64 = 1e-12;

/// Heading from `a` to `b` in degrees, in (-180, 180]
pub fn bearing(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (b.y - a.y).atan2(b.x - a.x).to_degrees()
}

/// Absolute heading change when moving from `from` onto `to`
pub fn turn_angle(from: f64, to: f64) -> f64 {
    ((to - from + 180.0).rem_euclid(360.0) - 180.0).abs()
}

/// Reverse a bearing
pub fn flip_bearing(b: f64) -> f64 {
    let flipped = b + 180.0;
    if flipped > 180.0 {
        flipped - 360.0
    } else {
        flipped
    }
}

pub fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}

fn segment_length(line: &Line<f64>) -> f64 {
    line.dx().hypot(line.dy())
}

pub fn line_length(ls: &LineString<f64>) -> f64 {
    ls.lines().map(|l| segment_length(&l)).sum()
}

/// Headings of the non-degenerate segments, in order
fn segment_bearings(ls: &LineString<f64>) -> Vec<f64> {
    ls.lines()
        .filter(|l| segment_length(l) > DEGENERATE_LEN)
        .map(|l| bearing(l.start, l.end))
        .collect()
}

/// Sum of absolute turns at interior vertices
pub fn angle_sum(ls: &LineString<f64>) -> f64 {
    segment_bearings(ls)
        .windows(2)
        .map(|w| turn_angle(w[0], w[1]))
        .sum()
}

/// Bearings of the first and last segment
pub fn end_bearings(ls: &LineString<f64>) -> (f64, f64) {
    let bearings = segment_bearings(ls);
    match (bearings.first(), bearings.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => (0.0, 0.0),
    }
}

pub fn straight(a: Coord<f64>, b: Coord<f64>) -> LineString<f64> {
    LineString::new(vec![a, b])
}

/// Polyline with consecutive duplicate vertices removed
pub fn dedup(coords: Vec<Coord<f64>>) -> LineString<f64> {
    let mut out: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    for c in coords {
        if out.last().is_some_and(|&l| distance(l, c) <= DEGENERATE_LEN) {
            continue;
        }
        out.push(c);
    }
    if out.len() == 1 {
        out.push(out[0]);
    }
    LineString::new(out)
}

/// Join two polylines that meet at `a.last == b.first`
pub fn weld(a: &LineString<f64>, b: &LineString<f64>) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = a.0.clone();
    coords.extend(b.0.iter().skip(1).copied());
    dedup(coords)
}

pub fn reversed(ls: &LineString<f64>) -> LineString<f64> {
    let mut coords = ls.0.clone();
    coords.reverse();
    LineString::new(coords)
}

/// Point at `dist` along the polyline, clamped to its ends
pub fn interpolate(ls: &LineString<f64>, dist: f64) -> Coord<f64> {
    let mut travelled = 0.0;
    let mut last = ls.0.first().copied().unwrap_or(Coord { x: 0.0, y: 0.0 });
    for segment in ls.lines() {
        let len = segment_length(&segment);
        if travelled + len >= dist && len > DEGENERATE_LEN {
            let t = ((dist - travelled) / len).clamp(0.0, 1.0);
            return Coord {
                x: segment.start.x + segment.dx() * t,
                y: segment.start.y + segment.dy() * t,
            };
        }
        travelled += len;
        last = segment.end;
    }
    last
}

/// Portion of the polyline between two along-line distances
///
/// Interior vertices strictly inside the range are kept, so the result
/// follows the original curvature.
pub fn substring(ls: &LineString<f64>, start: f64, end: f64) -> LineString<f64> {
    let mut coords = vec![interpolate(ls, start)];
    let mut travelled = 0.0;
    for segment in ls.lines() {
        travelled += segment_length(&segment);
        if travelled > start && travelled < end {
            coords.push(segment.end);
        }
    }
    coords.push(interpolate(ls, end));
    dedup(coords)
}

/// Distances along the polyline of each vertex
pub fn vertex_offsets(ls: &LineString<f64>) -> Vec<f64> {
    let mut offsets = Vec::with_capacity(ls.0.len());
    let mut travelled = 0.0;
    offsets.push(0.0);
    for segment in ls.lines() {
        travelled += segment_length(&segment);
        offsets.push(travelled);
    }
    offsets
}

/// Perpendicular projection of a point onto a polyline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub point: Coord<f64>,
    /// Distance along the polyline from its first vertex
    pub along: f64,
    /// Distance from the query point to `point`
    pub offset: f64,
}

pub fn project(ls: &LineString<f64>, p: Coord<f64>) -> Option<Projection> {
    let query = Point::from(p);
    let closest = match ls.closest_point(&query) {
        Closest::Intersection(c) | Closest::SinglePoint(c) => c,
        Closest::Indeterminate => return None,
    };
    let fraction = ls.line_locate_point(&closest)?;
    Some(Projection {
        point: closest.0,
        along: fraction * line_length(ls),
        offset: distance(p, closest.0),
    })
}

pub fn coords_close(a: Coord<f64>, b: Coord<f64>, tolerance: f64) -> bool {
    distance(a, b) <= tolerance
}

pub fn centroid(points: &[Coord<f64>]) -> Option<Coord<f64>> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), c| (sx + c.x, sy + c.y));
    Some(Coord { x: sx / n, y: sy / n })
}
