//! Fuzzy interest between pairs of objects.
//!
//! Each of eight attribute comparisons is mapped through its membership function and
//! the weighted mean of those memberships is the total interest. Every component is
//! symmetric in its two objects, so the total is too.

use rayon::prelude::*;
use serde::Serialize;

use crate::attributes::{intersection_area, ObjectKind, SimpleObject};
use crate::config::FuzzyConfig;
use crate::errors::{ModeError, Result};
use crate::field::FieldTag;
use crate::polyline::polyline_distance;

/// Which collections a pair table compares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonKind {
    FcstObs,
    FcstFcst,
    ObsObs,
}

impl ComparisonKind {
    pub fn tags(&self) -> (FieldTag, FieldTag) {
        match self {
            ComparisonKind::FcstObs => (FieldTag::Fcst, FieldTag::Obs),
            ComparisonKind::FcstFcst => (FieldTag::Fcst, FieldTag::Fcst),
            ComparisonKind::ObsObs => (FieldTag::Obs, FieldTag::Obs),
        }
    }

    pub fn for_field(tag: FieldTag) -> Self {
        match tag {
            FieldTag::Fcst => ComparisonKind::FcstFcst,
            FieldTag::Obs => ComparisonKind::ObsObs,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ComparisonKind::FcstObs => "forecast-observation",
            ComparisonKind::FcstFcst => "forecast-forecast",
            ComparisonKind::ObsObs => "observation-observation",
        }
    }
}

/// Raw attribute comparisons, before the membership functions
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComponentDistances {
    pub centroid_dist: f64,
    pub boundary_dist: f64,
    pub convex_hull_dist: f64,
    pub angle_diff: f64,
    pub area_ratio: f64,
    pub int_area_ratio: f64,
    pub complexity_ratio: f64,
    pub intensity_ratio: f64,
}

impl ComponentDistances {
    /// Distances of an object compared with itself
    pub fn identity() -> Self {
        Self {
            centroid_dist: 0.0,
            boundary_dist: 0.0,
            convex_hull_dist: 0.0,
            angle_diff: 0.0,
            area_ratio: 1.0,
            int_area_ratio: 1.0,
            complexity_ratio: 1.0,
            intensity_ratio: 1.0,
        }
    }
}

/// One evaluated pair of objects
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectPair {
    pub kind: ComparisonKind,
    pub id_a: usize,
    pub id_b: usize,
    pub distances: ComponentDistances,
    pub interest: f64,
    /// Centroids too far apart to be scored; interest is 0
    pub skipped: bool,
    pub intersection_area: usize,
    pub union_area: usize,
    pub symmetric_diff: usize,
}

/// Interest engine over an immutable configuration
#[derive(Debug, Clone, Copy)]
pub struct InterestEngine<'a> {
    config: &'a FuzzyConfig,
}

impl<'a> InterestEngine<'a> {
    pub fn new(config: &'a FuzzyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FuzzyConfig {
        self.config
    }

    /// Compute every component distance of a pair.
    ///
    /// With `skip_geometry` the boundary and hull distances are not evaluated and are
    /// reported as NaN.
    pub fn distances(
        &self,
        a: &SimpleObject,
        b: &SimpleObject,
        skip_geometry: bool,
    ) -> Result<ComponentDistances> {
        let centroid_dist = a.centroid.distance(&b.centroid);

        let (boundary_dist, convex_hull_dist) = if skip_geometry {
            (f64::NAN, f64::NAN)
        } else {
            let boundary = a
                .boundary_polylines()
                .flat_map(|pa| b.boundary_polylines().map(move |pb| polyline_distance(pa, pb)))
                .fold(f64::INFINITY, f64::min);
            (boundary, polyline_distance(&a.convex_hull, &b.convex_hull))
        };

        let mut angle_diff = (a.orientation - b.orientation).abs() % 180.0;
        if angle_diff > 90.0 {
            angle_diff = 180.0 - angle_diff;
        }

        let (small, large) = if a.area <= b.area {
            (a.area, b.area)
        } else {
            (b.area, a.area)
        };
        let area_ratio = small as f64 / large as f64;
        let int_area_ratio = intersection_area(&a.pixels, &b.pixels) as f64 / small as f64;

        let complexity_ratio = if a.complexity > 0.0 && b.complexity > 0.0 {
            a.complexity.min(b.complexity) / a.complexity.max(b.complexity)
        } else {
            1.0 - a.complexity.max(b.complexity)
        };

        let stat = self.config.intensity_percentile;
        let intensity_ratio = match (a.intensity.stat(stat), b.intensity.stat(stat)) {
            (Some(va), Some(vb)) => intensity_ratio(va, vb),
            _ => 0.0,
        };

        Ok(ComponentDistances {
            centroid_dist,
            boundary_dist,
            convex_hull_dist,
            angle_diff,
            area_ratio,
            int_area_ratio,
            complexity_ratio,
            intensity_ratio,
        })
    }

    /// Weighted mean of the membership values, clamped to [0, 1]
    pub fn total_interest(&self, d: &ComponentDistances) -> f64 {
        let w = &self.config.weight;
        let f = &self.config.interest_function;

        let terms = [
            (w.centroid_dist, f.centroid_dist.eval(d.centroid_dist)),
            (w.boundary_dist, f.boundary_dist.eval(d.boundary_dist)),
            (w.convex_hull_dist, f.convex_hull_dist.eval(d.convex_hull_dist)),
            (w.angle_diff, f.angle_diff.eval(d.angle_diff)),
            (w.area_ratio, f.area_ratio.eval(d.area_ratio)),
            (w.int_area_ratio, f.int_area_ratio.eval(d.int_area_ratio)),
            (w.complexity_ratio, f.complexity_ratio.eval(d.complexity_ratio)),
            (w.inten_perc_ratio, f.inten_perc_ratio.eval(d.intensity_ratio)),
        ];

        let (mut num, mut den) = (0.0, 0.0);
        for (weight, value) in terms {
            if weight > 0.0 {
                num += weight * value;
                den += weight;
            }
        }

        if den > 0.0 {
            (num / den).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Evaluate a pair of objects. An object compared with itself has interest 1.
    ///
    /// Any other pair that gets scored fails when either object has no valid raw
    /// value, whatever the intensity weight.
    pub fn interest(&self, a: &SimpleObject, b: &SimpleObject) -> Result<ObjectPair> {
        let kind = match (a.tag, b.tag) {
            (FieldTag::Fcst, FieldTag::Obs) | (FieldTag::Obs, FieldTag::Fcst) => ComparisonKind::FcstObs,
            (FieldTag::Fcst, FieldTag::Fcst) => ComparisonKind::FcstFcst,
            (FieldTag::Obs, FieldTag::Obs) => ComparisonKind::ObsObs,
        };

        let inter = intersection_area(&a.pixels, &b.pixels);
        let union = a.area + b.area - inter;
        let mut pair = ObjectPair {
            kind,
            id_a: a.id,
            id_b: b.id,
            distances: ComponentDistances::identity(),
            interest: 1.0,
            skipped: false,
            intersection_area: inter,
            union_area: union,
            symmetric_diff: union - inter,
        };

        if a.same_object(b) {
            return Ok(pair);
        }

        let skipped = kind == ComparisonKind::FcstObs
            && a.kind == ObjectKind::Simple
            && b.kind == ObjectKind::Simple
            && a.centroid.distance(&b.centroid) > self.config.max_centroid_dist;

        if !skipped {
            if let Some(empty) = [a, b].into_iter().find(|o| o.intensity.is_empty()) {
                return Err(ModeError::NoValidIntensity {
                    tag: empty.tag,
                    id: empty.id,
                });
            }
        }

        pair.distances = self.distances(a, b, skipped)?;
        pair.skipped = skipped;
        pair.interest = if skipped {
            0.0
        } else {
            self.total_interest(&pair.distances)
        };

        Ok(pair)
    }

    /// Pair table between two collections.
    ///
    /// For `FcstObs` every (a, b) combination is evaluated in row-major order. For the
    /// self comparisons `b` must be the same collection and only pairs with `i < j` are
    /// evaluated.
    pub fn compare(
        &self,
        kind: ComparisonKind,
        a: &[SimpleObject],
        b: &[SimpleObject],
    ) -> Result<Vec<ObjectPair>> {
        let (tag_a, tag_b) = kind.tags();
        for (objects, expected) in [(a, tag_a), (b, tag_b)] {
            if let Some(obj) = objects.iter().find(|o| o.tag != expected) {
                return Err(ModeError::FieldMismatch {
                    comparison: kind.name(),
                    expected,
                    found: obj.tag,
                    id: obj.id,
                });
            }
        }

        let index_pairs: Vec<(usize, usize)> = match kind {
            ComparisonKind::FcstObs => (0..a.len())
                .flat_map(|i| (0..b.len()).map(move |j| (i, j)))
                .collect(),
            _ => (0..a.len())
                .flat_map(|i| (i + 1..b.len()).map(move |j| (i, j)))
                .collect(),
        };

        let evaluate = |&(i, j): &(usize, usize)| self.interest(&a[i], &b[j]);

        if self.config.use_parallel {
            index_pairs.par_iter().map(evaluate).collect()
        } else {
            index_pairs.iter().map(evaluate).collect()
        }
    }
}

/// Ratio of two intensity statistics in [0, 1]; 0 unless both are positive
fn intensity_ratio(a: f64, b: f64) -> f64 {
    if a > 0.0 && b > 0.0 {
        a.min(b) / a.max(b)
    } else {
        0.0
    }
}

/// Interest of a single pair under a configuration
pub fn interest(a: &SimpleObject, b: &SimpleObject, config: &FuzzyConfig) -> Result<ObjectPair> {
    InterestEngine::new(config).interest(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IntensityStat, ThreshOp, Threshold};
    use crate::field::{RawField, DEFAULT_BAD_DATA};
    use assert_approx_eq::assert_approx_eq;

    fn make(
        raw: &RawField,
        pixels: &[usize],
        id: usize,
        tag: FieldTag,
    ) -> SimpleObject {
        SimpleObject::from_pixels(
            raw,
            pixels.to_vec(),
            id,
            tag,
            ObjectKind::Simple,
            &Threshold::new(ThreshOp::Gt, 0.0),
        )
        .unwrap()
    }

    fn raw(nx: usize, ny: usize) -> RawField {
        RawField::filled(nx, ny, 3.0, DEFAULT_BAD_DATA)
    }

    #[test]
    fn test_identical_objects_interest_one() {
        let field = raw(10, 10);
        let pixels = [11, 12, 13, 21, 22, 23];
        let f = make(&field, &pixels, 1, FieldTag::Fcst);
        let o = make(&field, &pixels, 1, FieldTag::Obs);

        let config = FuzzyConfig::default();
        let pair = interest(&f, &o, &config).unwrap();
        assert_approx_eq!(pair.distances.centroid_dist, 0.0);
        assert_approx_eq!(pair.distances.area_ratio, 1.0);
        assert_approx_eq!(pair.distances.int_area_ratio, 1.0);
        assert_approx_eq!(pair.distances.angle_diff, 0.0);
        assert_approx_eq!(pair.interest, 1.0);
        assert_eq!(pair.symmetric_diff, 0);
    }

    #[test]
    fn test_self_pair_short_circuits() {
        let field = raw(5, 5);
        let a = make(&field, &[0, 1], 1, FieldTag::Fcst);
        let pair = interest(&a, &a, &FuzzyConfig::default()).unwrap();
        assert_eq!(pair.interest, 1.0);
        assert_eq!(pair.kind, ComparisonKind::FcstFcst);
    }

    #[test]
    fn test_distant_single_pixels() {
        let field = raw(120, 3);
        let f = make(&field, &[120 + 5], 1, FieldTag::Fcst);
        let o = make(&field, &[120 + 105], 1, FieldTag::Obs);

        let pair = interest(&f, &o, &FuzzyConfig::default()).unwrap();
        assert_approx_eq!(pair.distances.centroid_dist, 100.0);
        assert_approx_eq!(pair.distances.boundary_dist, 99.0);
        // centroid, boundary, angle, area ratio and zero overlap over a weight sum of 10
        let expected = (2.0 * (1.0 - 85.0 / 135.0) + 4.0 * 0.01 + 1.0 + 1.0) / 10.0;
        assert_approx_eq!(pair.interest, expected);
        assert!(pair.interest < 0.3);
    }

    #[test]
    fn test_symmetry() {
        let field = raw(20, 20);
        let a = make(&field, &[21, 22, 23, 41, 42], 1, FieldTag::Fcst);
        let b = make(&field, &[25, 45, 65, 66], 2, FieldTag::Obs);

        let engine_config = FuzzyConfig::default();
        let engine = InterestEngine::new(&engine_config);
        let ab = engine.interest(&a, &b).unwrap();
        let ba = engine.interest(&b, &a).unwrap();
        assert_eq!(ab.interest, ba.interest);
        assert!((0.0..=1.0).contains(&ab.interest));
    }

    #[test]
    fn test_max_centroid_dist_skips_pair() {
        let field = raw(100, 1);
        let f = make(&field, &[0], 1, FieldTag::Fcst);
        let o = make(&field, &[60], 1, FieldTag::Obs);

        let mut config = FuzzyConfig::default();
        config.max_centroid_dist = 50.0;
        let pair = interest(&f, &o, &config).unwrap();
        assert!(pair.skipped);
        assert_eq!(pair.interest, 0.0);
        assert!(pair.distances.boundary_dist.is_nan());
    }

    #[test]
    fn test_missing_intensity_is_error_for_any_weights() {
        let mut field = raw(4, 1);
        field.set_bad(0, 0);
        let f = make(&field, &[0], 1, FieldTag::Fcst);
        let o = make(&field, &[1], 1, FieldTag::Obs);

        let mut config = FuzzyConfig::default();
        assert_eq!(config.weight.inten_perc_ratio, 0.0);
        assert!(matches!(
            interest(&f, &o, &config),
            Err(ModeError::NoValidIntensity { tag: FieldTag::Fcst, id: 1 })
        ));
        assert!(matches!(
            interest(&o, &f, &config),
            Err(ModeError::NoValidIntensity { tag: FieldTag::Fcst, id: 1 })
        ));

        config.weight.inten_perc_ratio = 1.0;
        assert!(matches!(
            interest(&f, &o, &config),
            Err(ModeError::NoValidIntensity { tag: FieldTag::Fcst, id: 1 })
        ));

        // an unscored pair never reads the intensities
        config.max_centroid_dist = 0.5;
        assert!(interest(&f, &o, &config).unwrap().skipped);
    }

    #[test]
    fn test_intensity_ratio_rules() {
        assert_approx_eq!(intensity_ratio(2.0, 4.0), 0.5);
        assert_approx_eq!(intensity_ratio(3.0, 3.0), 1.0);
        assert_approx_eq!(intensity_ratio(0.0, 0.0), 0.0);
        assert_approx_eq!(intensity_ratio(-2.0, -2.0), 0.0);
        assert_approx_eq!(intensity_ratio(-1.0, 3.0), 0.0);

        let field = raw(4, 1);
        let mut config = FuzzyConfig::default();
        config.intensity_percentile = IntensityStat::Sum;
        let a = make(&field, &[0], 1, FieldTag::Fcst);
        let b = make(&field, &[2, 3], 1, FieldTag::Obs);
        let d = InterestEngine::new(&config).distances(&a, &b, false).unwrap();
        assert_approx_eq!(d.intensity_ratio, 0.5);
    }

    #[test]
    fn test_compare_checks_fields() {
        let field = raw(6, 1);
        let fcst = vec![make(&field, &[0], 1, FieldTag::Fcst), make(&field, &[2], 2, FieldTag::Fcst)];
        let obs = vec![make(&field, &[4], 1, FieldTag::Obs)];

        let config = FuzzyConfig::default();
        let engine = InterestEngine::new(&config);

        let pairs = engine.compare(ComparisonKind::FcstObs, &fcst, &obs).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!((pairs[1].id_a, pairs[1].id_b), (2, 1));

        let self_pairs = engine.compare(ComparisonKind::FcstFcst, &fcst, &fcst).unwrap();
        assert_eq!(self_pairs.len(), 1);

        match engine.compare(ComparisonKind::FcstObs, &obs, &fcst) {
            Err(ModeError::FieldMismatch {
                comparison,
                expected,
                found,
                id,
            }) => {
                assert_eq!(comparison, "forecast-observation");
                assert_eq!(expected, FieldTag::Fcst);
                assert_eq!(found, FieldTag::Obs);
                assert_eq!(id, 1);
            }
            other => panic!("expected a field mismatch, got {:?}", other),
        }

        let err = engine.compare(ComparisonKind::ObsObs, &obs, &fcst).unwrap_err();
        assert_eq!(
            err.to_string(),
            "The observation-observation comparison expects obs objects but got fcst object 1"
        );
    }
}
