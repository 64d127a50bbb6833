mod common;

use assert_approx_eq::assert_approx_eq;
use mode_objects_lib::field::FieldTag;
use mode_objects_lib::merge::merge_field;
use mode_objects_lib::polyline::{is_inside, point_segment_distance, Point};
use mode_objects_lib::{interest, run_mode, MergeFlag, ModeResult, SimpleObject};

use common::{field_with_blocks, field_with_pixels, unsmoothed_config};

/// Fields with a mix of shapes: an L, a bar, a diagonal line, a lone pixel and a ring
fn busy_run() -> ModeResult {
    busy_run_with(true)
}

fn busy_run_with(use_parallel: bool) -> ModeResult {
    let mut fcst_pixels = Vec::new();
    for y in 2..8 {
        fcst_pixels.push((2, y));
    }
    for x in 3..7 {
        fcst_pixels.push((x, 7));
    }
    for i in 0..5 {
        fcst_pixels.push((12 + i, 2 + i));
    }
    fcst_pixels.push((25, 3));
    for y in 10..15 {
        for x in 20..25 {
            if !(x == 22 && y == 12) {
                fcst_pixels.push((x, y));
            }
        }
    }
    let fcst = field_with_pixels(32, 18, &fcst_pixels, 4.0);

    let obs = field_with_blocks(
        32,
        18,
        &[
            (3, 3, 3, 5, 6.0),
            (13, 3, 2, 4, 2.0),
            (19, 11, 6, 4, 9.0),
            (28, 14, 2, 2, 1.5),
        ],
    );

    let mut config = unsmoothed_config();
    config.fcst.merge_flag = MergeFlag::Both;
    config.obs.merge_flag = MergeFlag::Engine;
    config.use_parallel = use_parallel;
    run_mode(&fcst, &obs, &config).unwrap()
}

fn all_objects(result: &ModeResult) -> impl Iterator<Item = &SimpleObject> {
    result.fcst.objects.iter().chain(result.obs.objects.iter())
}

#[test]
fn object_areas_sum_to_mask_count() {
    let result = busy_run();
    for tag in [FieldTag::Fcst, FieldTag::Obs] {
        let field = result.field(tag);
        let total: usize = field.objects.iter().map(|o| o.area).sum();
        assert_eq!(total, field.mask.count_on());

        for (&on, &id) in field.mask.data().iter().zip(field.labels.data()) {
            assert_eq!(on, id > 0);
        }
    }
}

#[test]
fn centroid_lies_in_convex_hull() {
    let result = busy_run();
    for object in all_objects(&result) {
        let hull = &object.convex_hull;
        let c = object.centroid;
        let on_edge = (0..hull.len())
            .map(|i| point_segment_distance(c, hull[i], hull[(i + 1) % hull.len()]))
            .fold(f64::INFINITY, f64::min)
            < 1e-9;
        assert!(
            is_inside(hull, c) || on_edge,
            "{} object {} centroid ({}, {}) outside its hull",
            object.tag,
            object.id,
            c.x,
            c.y
        );
    }
}

#[test]
fn single_pixel_object_is_degenerate() {
    let result = busy_run();
    let lone = result
        .fcst
        .objects
        .iter()
        .find(|o| o.area == 1)
        .expect("the lone forecast pixel is an object");
    assert_eq!(lone.convex_hull, vec![Point::new(25.0, 3.0)]);
    assert_eq!(lone.centroid, Point::new(25.0, 3.0));
    assert_eq!(lone.aspect_ratio, None);
}

#[test]
fn interest_is_bounded_symmetric_and_reflexive() {
    let result = busy_run();
    let config = unsmoothed_config();
    let objects: Vec<&SimpleObject> = all_objects(&result).collect();

    for a in &objects {
        let own = interest(a, a, &config).unwrap();
        assert_eq!(own.interest, 1.0);

        for b in &objects {
            let ab = interest(a, b, &config).unwrap().interest;
            let ba = interest(b, a, &config).unwrap().interest;
            assert!((0.0..=1.0).contains(&ab));
            assert_approx_eq!(ab, ba, 1e-12);
        }
    }

    for pair in &result.pairs {
        assert!((0.0..=1.0).contains(&pair.interest));
    }
}

#[test]
fn merging_is_idempotent() {
    let result = busy_run();
    let mut config = unsmoothed_config();
    config.fcst.merge_flag = MergeFlag::Both;
    config.obs.merge_flag = MergeFlag::Engine;

    for tag in [FieldTag::Fcst, FieldTag::Obs] {
        let field = result.field(tag);
        let again = merge_field(
            tag,
            &field.objects,
            &field.labels,
            &field.convolved,
            field.merge.flag,
            &config,
            Some(&field.merge.partition),
        )
        .unwrap();
        assert_eq!(again.partition, field.merge.partition);
    }
}

#[test]
fn cluster_area_is_sum_of_members() {
    let result = busy_run();
    assert!(!result.clusters.pairs.is_empty());

    for cluster in &result.clusters.pairs {
        let fcst_area: usize = cluster
            .fcst
            .members
            .iter()
            .map(|&id| result.fcst.objects[id - 1].area)
            .sum();
        let obs_area: usize = cluster
            .obs
            .members
            .iter()
            .map(|&id| result.obs.objects[id - 1].area)
            .sum();
        assert_eq!(cluster.fcst.object.area, fcst_area);
        assert_eq!(cluster.obs.object.area, obs_area);
        assert_eq!(
            cluster.pair.union_area,
            fcst_area + obs_area - cluster.pair.intersection_area
        );
    }
}

#[test]
fn summary_accounts_for_every_object() {
    let result = busy_run();
    for (summary, field) in [(&result.summary.fcst, &result.fcst), (&result.summary.obs, &result.obs)] {
        assert_eq!(summary.n_matched + summary.n_unmatched, field.count());
        assert_eq!(summary.matched_area + summary.unmatched_area, summary.total_area);
    }

    let clustered: usize = result.clusters.pairs.iter().map(|c| c.fcst.members.len()).sum();
    assert_eq!(clustered, result.summary.fcst.n_matched);
}

#[test]
fn parallel_and_sequential_runs_agree() {
    let parallel = busy_run_with(true);
    let sequential = busy_run_with(false);

    for tag in [FieldTag::Fcst, FieldTag::Obs] {
        let (p, s) = (parallel.field(tag), sequential.field(tag));
        assert_eq!(p.labels, s.labels);
        assert_eq!(p.count(), s.count());
        for (a, b) in p.objects.iter().zip(&s.objects) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.pixels, b.pixels);
            assert_eq!(a.centroid, b.centroid);
            assert_eq!(a.boundary, b.boundary);
            assert_eq!(a.convex_hull, b.convex_hull);
            assert_eq!(a.intensity, b.intensity);
            assert_eq!(a.orientation, b.orientation);
            assert_eq!(a.complexity, b.complexity);
        }
        assert_eq!(p.merge.partition, s.merge.partition);
        assert_eq!(p.merge.self_pairs, s.merge.self_pairs);
        assert_eq!(parallel.merge_groups(tag), sequential.merge_groups(tag));
    }

    // nothing on this grid is beyond the centroid cutoff, so no NaN distances
    assert!(parallel.pairs.iter().all(|p| !p.skipped));
    assert_eq!(parallel.pairs, sequential.pairs);
    assert_eq!(parallel.matches, sequential.matches);
    assert_eq!(parallel.clusters.pairs.len(), sequential.clusters.pairs.len());
    assert_eq!(parallel.summary.mmi_all, sequential.summary.mmi_all);
}
