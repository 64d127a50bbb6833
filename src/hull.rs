use crate::polyline::{Point, Polyline};

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

#[inline]
fn cross(o: (i64, i64), a: (i64, i64), b: (i64, i64)) -> i64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// Convex hull of the pixel centres of a region, counter-clockwise.
///
/// Only the leftmost and rightmost pixel of each row can be hull vertices, so the
/// monotone chain runs over at most two points per row. A single pixel gives a
/// one-point hull and a straight run of pixels a two-point hull.
pub fn convex_hull(pixels: &[usize], nx: usize) -> Polyline {
    integer_hull(pixels, nx)
        .into_iter()
        .map(|(x, y)| Point::new(x as f64, y as f64))
        .collect()
}

fn integer_hull(pixels: &[usize], nx: usize) -> Vec<(i64, i64)> {
    if pixels.is_empty() || nx == 0 {
        return Vec::new();
    }

    // Row extremes; pixels arrive row-major but a union of objects need not be sorted
    let mut rows: Vec<(i64, i64, i64)> = Vec::new();
    let mut sorted = pixels.to_vec();
    sorted.sort_unstable();
    for idx in sorted {
        let (x, y) = ((idx % nx) as i64, (idx / nx) as i64);
        match rows.last_mut() {
            Some(row) if row.0 == y => {
                row.1 = row.1.min(x);
                row.2 = row.2.max(x);
            }
            _ => rows.push((y, x, x)),
        }
    }

    let mut points: Vec<(i64, i64)> = Vec::with_capacity(rows.len() * 2);
    for &(y, min_x, max_x) in &rows {
        points.push((min_x, y));
        if max_x != min_x {
            points.push((max_x, y));
        }
    }
    points.sort_unstable();
    points.dedup();

    if points.len() < 3 {
        return points;
    }

    let mut lower: Vec<(i64, i64)> = Vec::new();
    for &p in &points {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<(i64, i64)> = Vec::new();
    for &p in points.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Number of grid points inside or on a hull with integer vertices (Pick's theorem).
///
/// This is the pixel area of the hull as used by the complexity attribute; it is at
/// least 1 for any non-empty hull.
pub fn hull_pixel_count(hull: &[Point]) -> f64 {
    let n = hull.len();
    if n == 0 {
        return 0.0;
    }

    let pts: Vec<(i64, i64)> = hull
        .iter()
        .map(|p| (p.x.round() as i64, p.y.round() as i64))
        .collect();

    let mut twice_area = 0i64;
    let mut on_boundary = 0i64;
    for i in 0..n {
        let a = pts[i];
        let b = pts[(i + 1) % n];
        twice_area += a.0 * b.1 - b.0 * a.1;
        on_boundary += gcd(b.0 - a.0, b.1 - a.1);
    }

    // A + B/2 + 1 with A = |twice_area| / 2
    (twice_area.abs() + on_boundary) as f64 / 2.0 + 1.0
}
