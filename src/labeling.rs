//! Connected-component labeling of binary masks.
//!
//! Two-pass labeling with union-find over provisional labels. Pixels are connected
//! through any of their eight neighbours. Final ids follow the row-major order in which
//! each component's first pixel is met, so the result does not depend on how the
//! provisional equivalences happened to be resolved.

use log::debug;

use crate::config::Threshold;
use crate::field::{LabeledField, Mask};
use crate::union_find::UnionFind;

/// Neighbours already visited in a row-major scan: left, up-left, up, up-right
const PRIOR_NEIGHBOURS: [(isize, isize); 4] = [(-1, 0), (-1, -1), (0, -1), (1, -1)];

/// Label the 8-connected regions of a mask.
///
/// Returns the labeled field and the number of objects. Off pixels are 0 and ids are
/// contiguous in `1..=count`.
pub fn label(mask: &Mask) -> (LabeledField, usize) {
    let (nx, ny) = (mask.nx(), mask.ny());
    let mut labels = LabeledField::new(nx, ny, 0);

    // Element 0 stands for the background
    let mut sets = UnionFind::new(1);

    // First pass: provisional labels and equivalences
    for y in 0..ny {
        for x in 0..nx {
            if !*mask.get(x, y) {
                continue;
            }

            let mut assigned = 0;
            for &(dx, dy) in &PRIOR_NEIGHBOURS {
                let neighbour = labels
                    .get_signed(x as isize + dx, y as isize + dy)
                    .copied()
                    .unwrap_or(0);
                if neighbour == 0 {
                    continue;
                }
                if assigned == 0 {
                    assigned = neighbour;
                } else if neighbour != assigned {
                    sets.union(assigned, neighbour);
                }
            }

            if assigned == 0 {
                assigned = sets.push();
            }
            labels.set(x, y, assigned);
        }
    }

    // Resolve roots to consecutive ids in provisional order
    let mut relabel = vec![0; sets.len()];
    let mut count = 0;
    for provisional in 1..sets.len() {
        let root = sets.find(provisional);
        if relabel[root] == 0 {
            count += 1;
            relabel[root] = count;
        }
        relabel[provisional] = relabel[root];
    }

    // Second pass
    for l in labels.data_mut() {
        *l = relabel[*l];
    }

    (labels, count)
}

/// Pixel count of every object, indexed by `id - 1`
pub fn object_areas(labels: &LabeledField, count: usize) -> Vec<usize> {
    let mut areas = vec![0; count];
    for &l in labels.data() {
        if l > 0 && l <= count {
            areas[l - 1] += 1;
        }
    }
    areas
}

/// Switch off every connected region whose area fails `area_thresh`.
///
/// Returns the filtered mask and the number of regions removed.
pub fn filter_by_area(mask: &Mask, area_thresh: &Threshold) -> (Mask, usize) {
    let (labels, count) = label(mask);
    let areas = object_areas(&labels, count);
    let keep: Vec<bool> = areas
        .iter()
        .map(|&a| area_thresh.check(a as f64))
        .collect();
    let removed = keep.iter().filter(|&&k| !k).count();

    let mut filtered = mask.clone();
    for (on, &l) in filtered.data_mut().iter_mut().zip(labels.data()) {
        if l > 0 && !keep[l - 1] {
            *on = false;
        }
    }

    if removed > 0 {
        debug!(
            "Area filter {} removed {} of {} objects",
            area_thresh, removed, count
        );
    }

    (filtered, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThreshOp;

    /// Builds a mask from rows of 0/1 so the pattern is visible in the test
    fn mask_from(pattern: &[&[u8]]) -> Mask {
        let ny = pattern.len();
        let nx = pattern[0].len();
        let data = pattern
            .iter()
            .flat_map(|row| row.iter().map(|&v| v != 0))
            .collect();
        Mask::from_vec(nx, ny, data).unwrap()
    }

    fn assert_labels(labels: &LabeledField, expected: &[&[usize]]) {
        for (y, row) in expected.iter().enumerate() {
            for (x, &value) in row.iter().enumerate() {
                assert_eq!(
                    *labels.get(x, y),
                    value,
                    "Mismatch at ({}, {}): expected {}, got {}",
                    x,
                    y,
                    value,
                    labels.get(x, y)
                );
            }
        }
    }

    #[test]
    fn test_empty_mask() {
        let mask = Mask::new(4, 3, false);
        let (labels, count) = label(&mask);
        assert_eq!(count, 0);
        assert!(labels.data().iter().all(|&l| l == 0));
    }

    #[test]
    fn test_diagonal_pixels_connect() {
        let mask = mask_from(&[
            &[1, 0, 0],
            &[0, 1, 0],
            &[0, 0, 1],
        ]);
        let (labels, count) = label(&mask);
        assert_eq!(count, 1);
        assert_labels(&labels, &[&[1, 0, 0], &[0, 1, 0], &[0, 0, 1]]);
    }

    #[test]
    fn test_anti_diagonal_via_up_right() {
        let mask = mask_from(&[
            &[0, 0, 1],
            &[0, 1, 0],
            &[1, 0, 0],
        ]);
        let (_, count) = label(&mask);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_ids_follow_first_pixel_order() {
        // The U shape is discovered first through its left arm; its right arm gets a
        // provisional label after the lone pixel, but must resolve back to id 1.
        let mask = mask_from(&[
            &[1, 0, 0, 1, 0, 1],
            &[1, 0, 0, 1, 0, 0],
            &[1, 1, 1, 1, 0, 0],
        ]);
        let (labels, count) = label(&mask);
        assert_eq!(count, 2);
        assert_labels(
            &labels,
            &[&[1, 0, 0, 1, 0, 2], &[1, 0, 0, 1, 0, 0], &[1, 1, 1, 1, 0, 0]],
        );
    }

    #[test]
    fn test_areas_sum_to_on_count() {
        let mask = mask_from(&[
            &[1, 1, 0, 0, 1],
            &[0, 0, 0, 1, 1],
            &[1, 0, 0, 0, 0],
            &[1, 1, 0, 1, 0],
        ]);
        let (labels, count) = label(&mask);
        let areas = object_areas(&labels, count);
        assert_eq!(count, 4);
        assert_eq!(areas, vec![2, 3, 3, 1]);
        assert_eq!(areas.iter().sum::<usize>(), mask.count_on());
    }

    #[test]
    fn test_filter_by_area() {
        let mask = mask_from(&[
            &[1, 1, 0, 0, 1],
            &[1, 1, 0, 0, 0],
        ]);
        let (filtered, removed) = filter_by_area(&mask, &Threshold::new(ThreshOp::Ge, 2.0));
        assert_eq!(removed, 1);
        assert_eq!(filtered.count_on(), 4);
        assert!(!*filtered.get(4, 0));
    }
}
