use log::debug;
use nalgebra::{Matrix2, SymmetricEigen};
use rayon::prelude::*;
use serde::Serialize;

use crate::boundary::{trace_boundaries, BoundaryLoop};
use crate::config::Threshold;
use crate::errors::{ModeError, Result};
use crate::field::{FieldTag, LabeledField, RawField};
use crate::hull::{convex_hull, hull_pixel_count};
use crate::intensity::IntensityDistribution;
use crate::polyline::{Point, Polyline};

/// Second moments closer than this are treated as isotropic
const MOMENT_EPS: f64 = 1e-9;

const ANGLE_EPS: f64 = 1e-9;

/// Whether an object is a labeled region or a union of matched regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Simple,
    Cluster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x_min: usize,
    pub x_max: usize,
    pub y_min: usize,
    pub y_max: usize,
}

/// Geometric and statistical description of one object.
///
/// Clusters carry the same attributes computed over the union of their members.
#[derive(Debug, Clone)]
pub struct SimpleObject {
    pub id: usize,
    pub tag: FieldTag,
    pub kind: ObjectKind,
    /// Sorted row-major pixel indices
    pub pixels: Vec<usize>,
    pub area: usize,
    pub centroid: Point,
    /// Outer loops first, then holes
    pub boundary: Vec<BoundaryLoop>,
    pub convex_hull: Polyline,
    pub hull_pixel_count: f64,
    pub intensity: IntensityDistribution,
    /// Principal axis angle in degrees, in (-90, 90]
    pub orientation: f64,
    pub length: f64,
    pub width: f64,
    pub aspect_ratio: Option<f64>,
    pub complexity: f64,
    /// Pixels whose raw value passes the field threshold
    pub threshold_area: usize,
    pub bbox: BoundingBox,
}

impl SimpleObject {
    /// Build the attributes of an arbitrary pixel set.
    pub fn from_pixels(
        raw: &RawField,
        mut pixels: Vec<usize>,
        id: usize,
        tag: FieldTag,
        kind: ObjectKind,
        raw_thresh: &Threshold,
    ) -> Result<Self> {
        let nx = raw.nx();
        if pixels.is_empty() {
            return Err(ModeError::InvalidField(format!(
                "{} object {} has no pixels",
                tag, id
            )));
        }
        if let Some(&idx) = pixels.iter().find(|&&idx| idx >= raw.data().len()) {
            return Err(ModeError::InvalidField(format!(
                "{} object {} references pixel {} outside the {}x{} grid",
                tag,
                id,
                idx,
                nx,
                raw.ny()
            )));
        }
        pixels.sort_unstable();

        let area = pixels.len();
        let n = area as f64;

        let coords: Vec<(f64, f64)> = pixels
            .iter()
            .map(|&idx| ((idx % nx) as f64, (idx / nx) as f64))
            .collect();

        let cx = coords.iter().map(|c| c.0).sum::<f64>() / n;
        let cy = coords.iter().map(|c| c.1).sum::<f64>() / n;

        let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
        for &(x, y) in &coords {
            sxx += (x - cx) * (x - cx);
            syy += (y - cy) * (y - cy);
            sxy += (x - cx) * (y - cy);
        }
        let orientation = principal_angle(sxx / n, syy / n, sxy / n);
        let (length, width) = axis_extents(&coords, orientation);
        let aspect_ratio = if length > 0.0 { Some(width / length) } else { None };

        let boundary = trace_boundaries(&pixels, nx);
        let hull = convex_hull(&pixels, nx);
        let hull_count = hull_pixel_count(&hull);
        let complexity = if hull_count > 0.0 {
            (1.0 - n / hull_count).max(0.0)
        } else {
            0.0
        };

        let intensity = IntensityDistribution::from_pixels(raw, &pixels);
        let threshold_area = pixels
            .iter()
            .filter(|&&idx| raw.valid_at(idx).map_or(false, |v| raw_thresh.check(v)))
            .count();

        let bbox = BoundingBox {
            x_min: pixels.iter().map(|&i| i % nx).min().unwrap_or(0),
            x_max: pixels.iter().map(|&i| i % nx).max().unwrap_or(0),
            y_min: pixels[0] / nx,
            y_max: pixels[area - 1] / nx,
        };

        Ok(Self {
            id,
            tag,
            kind,
            pixels,
            area,
            centroid: Point::new(cx, cy),
            boundary,
            convex_hull: hull,
            hull_pixel_count: hull_count,
            intensity,
            orientation,
            length,
            width,
            aspect_ratio,
            complexity,
            threshold_area,
            bbox,
        })
    }

    /// Boundary loops as plain polylines
    pub fn boundary_polylines(&self) -> impl Iterator<Item = &Polyline> {
        self.boundary.iter().map(|b| &b.points)
    }

    pub fn same_object(&self, other: &SimpleObject) -> bool {
        self.tag == other.tag && self.kind == other.kind && self.id == other.id
    }
}

/// Angle of the major principal axis of the central second moments, in (-90, 90]
fn principal_angle(sxx: f64, syy: f64, sxy: f64) -> f64 {
    if (sxx - syy).abs() < MOMENT_EPS && sxy.abs() < MOMENT_EPS {
        return 0.0;
    }

    let eigen = SymmetricEigen::new(Matrix2::new(sxx, sxy, sxy, syy));
    let major = if eigen.eigenvalues[0] >= eigen.eigenvalues[1] { 0 } else { 1 };
    let v = eigen.eigenvectors.column(major);

    // Axes are undirected; fold into (-90, 90] with a little slack for rounding at -90
    let mut angle = v[1].atan2(v[0]).to_degrees();
    while angle <= -90.0 + ANGLE_EPS {
        angle += 180.0;
    }
    while angle > 90.0 + ANGLE_EPS {
        angle -= 180.0;
    }
    angle
}

/// Extent of the pixel centres along the major and minor axes
fn axis_extents(coords: &[(f64, f64)], angle_deg: f64) -> (f64, f64) {
    let (sin, cos) = angle_deg.to_radians().sin_cos();

    let (mut u_min, mut u_max) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut w_min, mut w_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for &(x, y) in coords {
        let u = x * cos + y * sin;
        let w = -x * sin + y * cos;
        u_min = u_min.min(u);
        u_max = u_max.max(u);
        w_min = w_min.min(w);
        w_max = w_max.max(w);
    }

    (u_max - u_min, w_max - w_min)
}

/// Number of pixels two sorted pixel lists share
pub fn intersection_area(a: &[usize], b: &[usize]) -> usize {
    let (mut i, mut j, mut count) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                count += 1;
                i += 1;
                j += 1;
            }
        }
    }
    count
}

/// Attributes of a single labeled object
pub fn compute(
    raw: &RawField,
    labels: &LabeledField,
    count: usize,
    id: usize,
    tag: FieldTag,
    raw_thresh: &Threshold,
) -> Result<SimpleObject> {
    if id == 0 || id > count {
        return Err(ModeError::UnknownObject { tag, id, count });
    }
    let pixels: Vec<usize> = labels
        .data()
        .iter()
        .enumerate()
        .filter(|(_, &l)| l == id)
        .map(|(idx, _)| idx)
        .collect();

    SimpleObject::from_pixels(raw, pixels, id, tag, ObjectKind::Simple, raw_thresh)
}

/// Attributes of every labeled object, in id order
pub fn compute_all(
    raw: &RawField,
    labels: &LabeledField,
    count: usize,
    tag: FieldTag,
    raw_thresh: &Threshold,
    parallel: bool,
) -> Result<Vec<SimpleObject>> {
    if !labels.same_shape(raw.grid()) {
        return Err(ModeError::InvalidField(format!(
            "{} labels are {}x{} but the raw field is {}x{}",
            tag,
            labels.nx(),
            labels.ny(),
            raw.nx(),
            raw.ny()
        )));
    }

    let pixel_sets = labels.pixels_by_label(count);
    let build = |(i, pixels): (usize, Vec<usize>)| {
        SimpleObject::from_pixels(raw, pixels, i + 1, tag, ObjectKind::Simple, raw_thresh)
    };

    let objects: Vec<SimpleObject> = if parallel {
        pixel_sets
            .into_par_iter()
            .enumerate()
            .map(build)
            .collect::<Result<Vec<_>>>()?
    } else {
        pixel_sets
            .into_iter()
            .enumerate()
            .map(build)
            .collect::<Result<Vec<_>>>()?
    };

    debug!("Computed attributes for {} {} objects", objects.len(), tag);
    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThreshOp;
    use crate::field::DEFAULT_BAD_DATA;
    use crate::labeling::label;
    use crate::polyline::is_inside;
    use assert_approx_eq::assert_approx_eq;

    fn ge(v: f64) -> Threshold {
        Threshold::new(ThreshOp::Ge, v)
    }

    fn object(nx: usize, ny: usize, pixels: &[usize]) -> SimpleObject {
        let raw = RawField::filled(nx, ny, 1.0, DEFAULT_BAD_DATA);
        SimpleObject::from_pixels(&raw, pixels.to_vec(), 1, FieldTag::Fcst, ObjectKind::Simple, &ge(0.5))
            .unwrap()
    }

    #[test]
    fn test_single_pixel_object() {
        let obj = object(10, 10, &[34]);
        assert_eq!(obj.area, 1);
        assert_approx_eq!(obj.centroid.x, 4.0);
        assert_approx_eq!(obj.centroid.y, 3.0);
        assert_eq!(obj.convex_hull.len(), 1);
        assert_approx_eq!(obj.complexity, 0.0);
        assert_approx_eq!(obj.orientation, 0.0);
        assert_eq!(obj.aspect_ratio, None);
        assert_eq!(obj.boundary.len(), 1);
    }

    #[test]
    fn test_horizontal_bar_orientation() {
        // 5x1 bar on a 10-wide grid
        let obj = object(10, 3, &[11, 12, 13, 14, 15]);
        assert_approx_eq!(obj.orientation, 0.0);
        assert_approx_eq!(obj.length, 4.0);
        assert_approx_eq!(obj.width, 0.0);
        assert_approx_eq!(obj.aspect_ratio.unwrap(), 0.0);
    }

    #[test]
    fn test_vertical_bar_orientation() {
        let obj = object(3, 5, &[1, 4, 7, 10, 13]);
        assert_approx_eq!(obj.orientation, 90.0);
        assert_approx_eq!(obj.length, 4.0);
    }

    #[test]
    fn test_diagonal_orientation() {
        let obj = object(4, 4, &[0, 5, 10, 15]);
        assert_approx_eq!(obj.orientation.abs(), 45.0);
    }

    #[test]
    fn test_annulus_attributes() {
        let obj = object(3, 3, &[0, 1, 2, 3, 5, 6, 7, 8]);
        assert_eq!(obj.area, 8);
        assert_eq!(obj.boundary.len(), 2);
        assert!(obj.boundary[1].is_hole);
        assert_approx_eq!(obj.hull_pixel_count, 9.0);
        assert_approx_eq!(obj.complexity, 1.0 / 9.0);
        assert_eq!(
            obj.bbox,
            BoundingBox { x_min: 0, x_max: 2, y_min: 0, y_max: 2 }
        );
    }

    #[test]
    fn test_centroid_inside_hull() {
        let obj = object(5, 5, &[0, 5, 10, 11, 12, 20]);
        assert!(is_inside(&obj.convex_hull, obj.centroid));
    }

    #[test]
    fn test_threshold_area_and_bad_data() {
        let raw = RawField::new(4, 1, vec![1.0, 5.0, DEFAULT_BAD_DATA, 7.0], DEFAULT_BAD_DATA).unwrap();
        let obj = SimpleObject::from_pixels(&raw, vec![0, 1, 2, 3], 1, FieldTag::Obs, ObjectKind::Simple, &ge(5.0))
            .unwrap();
        assert_eq!(obj.threshold_area, 2);
        assert_eq!(obj.intensity.len(), 3);
    }

    #[test]
    fn test_intersection_area() {
        assert_eq!(intersection_area(&[1, 3, 5, 7], &[2, 3, 4, 7, 9]), 2);
        assert_eq!(intersection_area(&[], &[1]), 0);
    }

    #[test]
    fn test_compute_all_matches_compute() {
        let mask = crate::field::Mask::from_vec(
            4,
            2,
            vec![true, true, false, true, false, false, false, true],
        )
        .unwrap();
        let (labels, count) = label(&mask);
        let raw = RawField::filled(4, 2, 2.0, DEFAULT_BAD_DATA);

        let all = compute_all(&raw, &labels, count, FieldTag::Fcst, &ge(1.0), true).unwrap();
        assert_eq!(all.len(), 2);
        let second = compute(&raw, &labels, count, 2, FieldTag::Fcst, &ge(1.0)).unwrap();
        assert_eq!(all[1].pixels, second.pixels);
        assert_eq!(all[1].area, 2);

        assert!(matches!(
            compute(&raw, &labels, count, 3, FieldTag::Fcst, &ge(1.0)),
            Err(ModeError::UnknownObject { id: 3, .. })
        ));
    }
}
