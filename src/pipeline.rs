use log::{debug, info};
use serde::Serialize;

use crate::attributes::{compute_all, SimpleObject};
use crate::cluster::{build_clusters, ClusterSet};
use crate::config::{FuzzyConfig, MergeFlag};
use crate::errors::{ModeError, Result};
use crate::field::{FieldTag, LabeledField, Mask, RawField};
use crate::interest::ObjectPair;
use crate::labeling::{filter_by_area, label};
use crate::matching::{match_objects, MatchGraph};
use crate::merge::{merge_field, FieldMerge, MergePartition};
use crate::preprocess::preprocess;

/// Everything derived from one field
#[derive(Debug, Clone)]
pub struct FieldObjects {
    pub tag: FieldTag,
    pub convolved: RawField,
    pub mask: Mask,
    pub labels: LabeledField,
    pub objects: Vec<SimpleObject>,
    pub merge: FieldMerge,
}

impl FieldObjects {
    pub fn count(&self) -> usize {
        self.objects.len()
    }
}

/// Per-field counts and areas
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSummary {
    pub n_simple: usize,
    /// Merged groups holding more than one simple object
    pub n_merged: usize,
    pub n_matched: usize,
    pub n_unmatched: usize,
    pub total_area: usize,
    pub matched_area: usize,
    pub unmatched_area: usize,
}

/// Run-level statistics written to `summary.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeSummary {
    pub nx: usize,
    pub ny: usize,
    pub match_flag: &'static str,
    pub fcst: FieldSummary,
    pub obs: FieldSummary,
    pub n_pairs: usize,
    pub n_matches: usize,
    pub n_clusters: usize,
    /// Median of maximum interest over forecast objects
    pub mmi_fcst: Option<f64>,
    pub mmi_obs: Option<f64>,
    pub mmi_all: Option<f64>,
}

/// Complete result of one verification run
#[derive(Debug, Clone)]
pub struct ModeResult {
    pub fcst: FieldObjects,
    pub obs: FieldObjects,
    /// Cross-field pair table; empty when matching is disabled
    pub pairs: Vec<ObjectPair>,
    pub matches: Vec<(usize, usize)>,
    pub graph: MatchGraph,
    pub clusters: ClusterSet,
    pub summary: ModeSummary,
}

impl ModeResult {
    pub fn field(&self, tag: FieldTag) -> &FieldObjects {
        match tag {
            FieldTag::Fcst => &self.fcst,
            FieldTag::Obs => &self.obs,
        }
    }

    /// Whether each object of a field belongs to a cluster pair, indexed by id - 1
    pub fn matched_flags(&self, tag: FieldTag) -> Vec<bool> {
        self.graph.matched_flags(tag)
    }

    /// Index of the merged group of each object, indexed by id - 1
    pub fn merge_groups(&self, tag: FieldTag) -> Vec<usize> {
        let partition = &self.field(tag).merge.partition;
        (1..=partition.n_objects())
            .map(|id| partition.group_of(id).map_or(0, |g| g + 1))
            .collect()
    }
}

/// Convolve, threshold, filter, label and describe one field, then merge it
fn process_field(raw: &RawField, tag: FieldTag, config: &FuzzyConfig) -> Result<FieldObjects> {
    let field_config = config.field(tag);

    // Step 1: Convolution, zero border and threshold
    let (convolved, mask) = preprocess(
        raw,
        field_config.conv_radius,
        &field_config.conv_thresh,
        config.zero_border_size,
        field_config.vld_thresh,
    )?;

    // Step 2: Optional area filter before labeling
    let mask = match &field_config.area_thresh {
        Some(area_thresh) => filter_by_area(&mask, area_thresh).0,
        None => mask,
    };

    // Step 3: Labeling and attributes
    let (labels, count) = label(&mask);
    let objects = compute_all(
        raw,
        &labels,
        count,
        tag,
        &field_config.conv_thresh,
        config.use_parallel,
    )?;

    // Step 4: Merging with the flag the match mode allows
    let flag = config.effective_merge_flag(tag);
    let merge = if flag == MergeFlag::None {
        FieldMerge {
            tag,
            flag,
            partition: MergePartition::singletons(count),
            self_pairs: Vec::new(),
        }
    } else {
        merge_field(tag, &objects, &labels, &convolved, flag, config, None)?
    };

    info!(
        "{} field: {} objects ({} on pixels), {} merged groups",
        tag,
        count,
        mask.count_on(),
        merge.partition.n_merged()
    );

    Ok(FieldObjects {
        tag,
        convolved,
        mask,
        labels,
        objects,
        merge,
    })
}

/// Median of a list of values; the mean of the two middle values for even lengths
fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        Some(values[n / 2])
    } else {
        Some((values[n / 2 - 1] + values[n / 2]) / 2.0)
    }
}

/// Maximum cross-field interest of every object of one field, indexed by id - 1
fn max_interest(pairs: &[ObjectPair], tag: FieldTag, count: usize) -> Vec<f64> {
    let mut best = vec![0.0_f64; count];
    for pair in pairs {
        let id = match tag {
            FieldTag::Fcst => pair.id_a,
            FieldTag::Obs => pair.id_b,
        };
        if let Some(slot) = best.get_mut(id.wrapping_sub(1)) {
            *slot = slot.max(pair.interest);
        }
    }
    best
}

fn field_summary(field: &FieldObjects, matched: &[bool]) -> FieldSummary {
    let mut summary = FieldSummary {
        n_simple: field.count(),
        n_merged: field.merge.partition.n_merged(),
        n_matched: 0,
        n_unmatched: 0,
        total_area: 0,
        matched_area: 0,
        unmatched_area: 0,
    };

    for (object, &is_matched) in field.objects.iter().zip(matched) {
        summary.total_area += object.area;
        if is_matched {
            summary.n_matched += 1;
            summary.matched_area += object.area;
        } else {
            summary.n_unmatched += 1;
            summary.unmatched_area += object.area;
        }
    }

    summary
}

/// Run the full verification on a forecast and an observation field.
///
/// The configuration is validated before either field is touched; any error aborts
/// the run.
pub fn run_mode(fcst_raw: &RawField, obs_raw: &RawField, config: &FuzzyConfig) -> Result<ModeResult> {
    config.validate()?;

    if !fcst_raw.same_grid(obs_raw) {
        return Err(ModeError::GridMismatch {
            fcst_nx: fcst_raw.nx(),
            fcst_ny: fcst_raw.ny(),
            obs_nx: obs_raw.nx(),
            obs_ny: obs_raw.ny(),
        });
    }

    info!(
        "Running object verification on a {}x{} grid (match flag {})",
        fcst_raw.nx(),
        fcst_raw.ny(),
        config.match_flag.as_str()
    );

    let fcst = process_field(fcst_raw, FieldTag::Fcst, config)?;
    let obs = process_field(obs_raw, FieldTag::Obs, config)?;

    // Cross-field matching
    let matching = match_objects(&fcst.objects, &obs.objects, config)?;

    let mut graph = MatchGraph::new(fcst.count(), obs.count());
    graph.add_partition(FieldTag::Fcst, &fcst.merge.partition)?;
    graph.add_partition(FieldTag::Obs, &obs.merge.partition)?;
    for &(f, o) in &matching.matches {
        graph.add_match(f, o)?;
    }
    debug!("Match graph holds {} edges", graph.n_edges());

    let clusters = build_clusters(&graph, fcst_raw, &fcst.objects, obs_raw, &obs.objects, config)?;

    // Summary
    let fcst_matched = graph.matched_flags(FieldTag::Fcst);
    let obs_matched = graph.matched_flags(FieldTag::Obs);

    let (mmi_fcst, mmi_obs, mmi_all) = if matching.pairs.is_empty() {
        (None, None, None)
    } else {
        let fcst_max = max_interest(&matching.pairs, FieldTag::Fcst, fcst.count());
        let obs_max = max_interest(&matching.pairs, FieldTag::Obs, obs.count());
        let all: Vec<f64> = fcst_max.iter().chain(&obs_max).copied().collect();
        (median(fcst_max), median(obs_max), median(all))
    };

    let summary = ModeSummary {
        nx: fcst_raw.nx(),
        ny: fcst_raw.ny(),
        match_flag: config.match_flag.as_str(),
        fcst: field_summary(&fcst, &fcst_matched),
        obs: field_summary(&obs, &obs_matched),
        n_pairs: matching.pairs.len(),
        n_matches: matching.matches.len(),
        n_clusters: clusters.pairs.len(),
        mmi_fcst,
        mmi_obs,
        mmi_all,
    };

    info!(
        "{} cluster pairs; matched fcst {}/{}, obs {}/{}",
        summary.n_clusters,
        summary.fcst.n_matched,
        summary.fcst.n_simple,
        summary.obs.n_matched,
        summary.obs.n_simple
    );

    Ok(ModeResult {
        fcst,
        obs,
        pairs: matching.pairs,
        matches: matching.matches,
        graph,
        clusters,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::DEFAULT_BAD_DATA;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_median() {
        assert_eq!(median(Vec::new()), None);
        assert_approx_eq!(median(vec![3.0, 1.0, 2.0]).unwrap(), 2.0);
        assert_approx_eq!(median(vec![0.4, 0.1, 0.9, 0.2]).unwrap(), 0.3);
    }

    #[test]
    fn test_empty_fields_give_empty_result() {
        let fcst = RawField::filled(12, 12, 0.0, DEFAULT_BAD_DATA);
        let obs = fcst.clone();
        let result = run_mode(&fcst, &obs, &FuzzyConfig::default()).unwrap();

        assert_eq!(result.fcst.count(), 0);
        assert_eq!(result.obs.count(), 0);
        assert!(result.pairs.is_empty());
        assert!(result.clusters.pairs.is_empty());
        assert_eq!(result.summary.mmi_all, None);
    }

    #[test]
    fn test_grid_mismatch() {
        let fcst = RawField::filled(10, 10, 0.0, DEFAULT_BAD_DATA);
        let obs = RawField::filled(10, 11, 0.0, DEFAULT_BAD_DATA);
        assert!(matches!(
            run_mode(&fcst, &obs, &FuzzyConfig::default()),
            Err(ModeError::GridMismatch { obs_ny: 11, .. })
        ));
    }
}
