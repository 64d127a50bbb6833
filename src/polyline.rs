use serde::{Deserialize, Serialize};

/// Point in grid coordinates (`x` along columns, `y` along rows)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Closed polyline; the last vertex connects back to the first
pub type Polyline = Vec<Point>;

/// Iterate the closing edges of a polyline, including last -> first
fn edges(poly: &[Point]) -> impl Iterator<Item = (Point, Point)> + '_ {
    let n = poly.len();
    (0..n).map(move |i| (poly[i], poly[(i + 1) % n]))
}

/// Signed shoelace area; positive when counter-clockwise in a y-up frame
pub fn signed_area(poly: &[Point]) -> f64 {
    edges(poly)
        .map(|(a, b)| a.x * b.y - b.x * a.y)
        .sum::<f64>()
        / 2.0
}

/// Cross product of (b - a) x (c - a)
#[inline]
fn cross(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

#[inline]
fn on_segment(a: Point, b: Point, p: Point) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// Closed-segment intersection test, touching endpoints included
pub fn segments_intersect(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    let d1 = cross(b1, b2, a1);
    let d2 = cross(b1, b2, a2);
    let d3 = cross(a1, a2, b1);
    let d4 = cross(a1, a2, b2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && on_segment(b1, b2, a1))
        || (d2 == 0.0 && on_segment(b1, b2, a2))
        || (d3 == 0.0 && on_segment(a1, a2, b1))
        || (d4 == 0.0 && on_segment(a1, a2, b2))
}

/// Distance from `p` to the closed segment `a`-`b`
pub fn point_segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return p.distance(&a);
    }

    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance(&Point::new(a.x + t * dx, a.y + t * dy))
}

/// Winding-number containment test. Degenerate polylines contain nothing.
pub fn is_inside(poly: &[Point], p: Point) -> bool {
    if poly.len() < 3 {
        return false;
    }

    let mut winding = 0i32;
    for (a, b) in edges(poly) {
        if a.y <= p.y {
            if b.y > p.y && cross(a, b, p) > 0.0 {
                winding += 1;
            }
        } else if b.y <= p.y && cross(a, b, p) < 0.0 {
            winding -= 1;
        }
    }

    winding != 0
}

/// Minimum distance between two closed polylines.
///
/// Zero when a vertex of either lies inside the other or any pair of edges meets.
/// Otherwise the smallest vertex-to-edge distance taken in both directions.
pub fn polyline_distance(a: &[Point], b: &[Point]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return f64::INFINITY;
    }

    if a.iter().any(|&p| is_inside(b, p)) || b.iter().any(|&p| is_inside(a, p)) {
        return 0.0;
    }

    for (a1, a2) in edges(a) {
        if edges(b).any(|(b1, b2)| segments_intersect(a1, a2, b1, b2)) {
            return 0.0;
        }
    }

    let a_to_b = a
        .iter()
        .flat_map(|&p| edges(b).map(move |(b1, b2)| point_segment_distance(p, b1, b2)));
    let b_to_a = b
        .iter()
        .flat_map(|&p| edges(a).map(move |(a1, a2)| point_segment_distance(p, a1, a2)));

    a_to_b.chain(b_to_a).fold(f64::INFINITY, f64::min)
}
