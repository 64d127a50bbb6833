//! Boundary tracing along pixel edges.
//!
//! Pixel `(x, y)` covers the unit square `[x, x+1] x [y, y+1]`. Every side of an object
//! pixel that faces a non-object pixel becomes a directed unit edge with the object on
//! its left. Following those edges vertex by vertex closes one loop per boundary
//! component. At a vertex where two object pixels touch only diagonally the trace turns
//! right first, so diagonal neighbours share a boundary exactly as they share a label.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::polyline::{signed_area, Point, Polyline};

/// Unit directions, counter-clockwise: +x, +y, -x, -y
const DIRS: [(i64, i64); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];

#[inline]
fn turn_right(dir: usize) -> usize {
    (dir + 3) % 4
}

#[inline]
fn turn_left(dir: usize) -> usize {
    (dir + 1) % 4
}

/// One closed boundary of an object region
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundaryLoop {
    /// Corner vertices only; the loop closes from the last back to the first
    pub points: Polyline,
    pub is_hole: bool,
}

type EdgeKey = (i64, i64, usize);

/// Trace every outer boundary and hole of a pixel set.
///
/// `pixels` are flat row-major indices on a grid `nx` columns wide. Outer loops
/// (positive signed area) come first, then holes, each group in discovery order.
pub fn trace_boundaries(pixels: &[usize], nx: usize) -> Vec<BoundaryLoop> {
    if pixels.is_empty() || nx == 0 {
        return Vec::new();
    }

    let members: HashSet<(i64, i64)> = pixels
        .iter()
        .map(|&idx| ((idx % nx) as i64, (idx / nx) as i64))
        .collect();

    // Collect boundary edges in a deterministic order
    let mut edges: Vec<EdgeKey> = Vec::new();
    for &idx in pixels {
        let (x, y) = ((idx % nx) as i64, (idx / nx) as i64);
        for (normal, &(ox, oy)) in DIRS.iter().enumerate() {
            if members.contains(&(x + ox, y + oy)) {
                continue;
            }
            let dir = turn_left(normal);
            let (dx, dy) = DIRS[dir];
            // Start corner in doubled coordinates, then halved (always even)
            let sx = (2 * x + 1 + ox - dx) / 2;
            let sy = (2 * y + 1 + oy - dy) / 2;
            edges.push((sx, sy, dir));
        }
    }

    let lookup: HashMap<EdgeKey, usize> = edges
        .iter()
        .enumerate()
        .map(|(i, &key)| (key, i))
        .collect();
    let mut visited = vec![false; edges.len()];

    let mut outer = Vec::new();
    let mut holes = Vec::new();

    for first in 0..edges.len() {
        if visited[first] {
            continue;
        }

        let mut corners: Vec<(i64, i64, usize)> = Vec::new();
        let mut current = first;
        loop {
            visited[current] = true;
            let (sx, sy, dir) = edges[current];
            corners.push((sx, sy, dir));

            let (dx, dy) = DIRS[dir];
            let (ex, ey) = (sx + dx, sy + dy);

            let next = [turn_right(dir), dir, turn_left(dir)]
                .iter()
                .find_map(|&d| lookup.get(&(ex, ey, d)).copied());

            match next {
                Some(n) if n != first && !visited[n] => current = n,
                _ => break,
            }
        }

        let points = simplify(&corners);
        if signed_area(&points) > 0.0 {
            outer.push(BoundaryLoop {
                points,
                is_hole: false,
            });
        } else {
            holes.push(BoundaryLoop {
                points,
                is_hole: true,
            });
        }
    }

    outer.extend(holes);
    outer
}

/// Keep only the vertices where the edge direction changes
fn simplify(corners: &[(i64, i64, usize)]) -> Polyline {
    let n = corners.len();
    (0..n)
        .filter(|&i| corners[(i + n - 1) % n].2 != corners[i].2)
        .map(|i| Point::new(corners[i].0 as f64, corners[i].1 as f64))
        .collect()
}
