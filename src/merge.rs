//! Merging of fragmented objects within one field.
//!
//! Threshold merging groups simple objects that lie entirely inside one connected
//! region of the convolved field re-thresholded at the merge threshold. Engine merging
//! groups objects whose self-comparison interest reaches the merge cutoff. Both produce
//! edges between object ids; the merged groups are the connected components of all
//! edges together, found with union-find.

use log::debug;
use serde::Serialize;

use crate::attributes::SimpleObject;
use crate::config::{FuzzyConfig, MergeFlag, Threshold};
use crate::errors::{ModeError, Result};
use crate::field::{FieldTag, LabeledField, RawField};
use crate::interest::{ComparisonKind, InterestEngine, ObjectPair};
use crate::labeling::label;
use crate::preprocess::threshold_mask;
use crate::union_find::UnionFind;

/// Partition of a field's object ids `1..=n` into merged groups.
///
/// Every group is sorted and the groups are ordered by their smallest id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergePartition {
    n_objects: usize,
    groups: Vec<Vec<usize>>,
    /// Group index of each id, offset by one
    #[serde(skip)]
    group_index: Vec<usize>,
}

impl MergePartition {
    fn with_groups(n_objects: usize, groups: Vec<Vec<usize>>) -> Self {
        let mut group_index = vec![0; n_objects];
        for (g, group) in groups.iter().enumerate() {
            for &id in group {
                group_index[id - 1] = g;
            }
        }
        Self {
            n_objects,
            groups,
            group_index,
        }
    }

    /// Every object in its own group
    pub fn singletons(n_objects: usize) -> Self {
        Self::with_groups(n_objects, (1..=n_objects).map(|id| vec![id]).collect())
    }

    /// Connected components of `edges` over ids `1..=n_objects`, optionally on top of
    /// an existing partition
    pub fn from_edges(
        n_objects: usize,
        edges: &[(usize, usize)],
        prior: Option<&MergePartition>,
        tag: FieldTag,
    ) -> Result<Self> {
        // Element 0 is unused so ids index directly
        let mut sets = UnionFind::new(n_objects + 1);

        if let Some(prior) = prior {
            if prior.n_objects != n_objects {
                return Err(ModeError::InvalidField(format!(
                    "{} merge partition covers {} objects but the field has {}",
                    tag, prior.n_objects, n_objects
                )));
            }
            for group in &prior.groups {
                for pair in group.windows(2) {
                    sets.union(pair[0], pair[1]);
                }
            }
        }

        for &(a, b) in edges {
            for id in [a, b] {
                if id == 0 || id > n_objects {
                    return Err(ModeError::UnknownObject {
                        tag,
                        id,
                        count: n_objects,
                    });
                }
            }
            sets.union(a, b);
        }

        let groups = sets.groups().into_iter().filter(|g| g[0] != 0).collect();
        Ok(Self::with_groups(n_objects, groups))
    }

    pub fn n_objects(&self) -> usize {
        self.n_objects
    }

    pub fn groups(&self) -> &[Vec<usize>] {
        &self.groups
    }

    /// Number of groups with more than one member
    pub fn n_merged(&self) -> usize {
        self.groups.iter().filter(|g| g.len() > 1).count()
    }

    /// Index of the group holding `id`
    pub fn group_of(&self, id: usize) -> Option<usize> {
        id.checked_sub(1).and_then(|i| self.group_index.get(i)).copied()
    }

    /// Chain edges linking the members of each group
    pub fn edges(&self) -> Vec<(usize, usize)> {
        self.groups
            .iter()
            .flat_map(|g| g.windows(2).map(|w| (w[0], w[1])))
            .collect()
    }
}

/// Result of merging one field
#[derive(Debug, Clone)]
pub struct FieldMerge {
    pub tag: FieldTag,
    pub flag: MergeFlag,
    pub partition: MergePartition,
    /// Self-comparison pair table; empty unless engine merging ran
    pub self_pairs: Vec<ObjectPair>,
}

/// Pairs of objects that lie entirely inside the same merge-threshold region
pub fn threshold_merge_edges(
    labels: &LabeledField,
    count: usize,
    convolved: &RawField,
    merge_thresh: &Threshold,
) -> Vec<(usize, usize)> {
    let merge_mask = threshold_mask(convolved, merge_thresh);
    let (merge_labels, n_regions) = label(&merge_mask);

    // Region holding every pixel of each object, or None when it spills outside
    let mut region: Vec<Option<Option<usize>>> = vec![None; count + 1];
    for (&id, &m) in labels.data().iter().zip(merge_labels.data()) {
        if id == 0 {
            continue;
        }
        region[id] = match region[id] {
            None if m > 0 => Some(Some(m)),
            None => Some(None),
            Some(Some(r)) if r == m => Some(Some(r)),
            _ => Some(None),
        };
    }

    let mut members: Vec<Vec<usize>> = vec![Vec::new(); n_regions + 1];
    for id in 1..=count {
        if let Some(Some(r)) = region[id] {
            members[r].push(id);
        }
    }

    members
        .iter()
        .flat_map(|m| m.windows(2).map(|w| (w[0], w[1])))
        .collect()
}

/// Pairs whose self-comparison interest reaches the cutoff
pub fn engine_merge_edges(pairs: &[ObjectPair], cutoff: f64) -> Vec<(usize, usize)> {
    pairs
        .iter()
        .filter(|p| p.interest >= cutoff)
        .map(|p| (p.id_a, p.id_b))
        .collect()
}

/// Merge the simple objects of one field according to `flag`.
///
/// `prior` seeds the union-find with an existing partition, so merging an already
/// merged field reproduces the same groups.
pub fn merge_field(
    tag: FieldTag,
    objects: &[SimpleObject],
    labels: &LabeledField,
    convolved: &RawField,
    flag: MergeFlag,
    config: &FuzzyConfig,
    prior: Option<&MergePartition>,
) -> Result<FieldMerge> {
    let count = objects.len();
    let mut edges = Vec::new();

    if flag.uses_thresh() {
        let thresh_edges = threshold_merge_edges(labels, count, convolved, &config.field(tag).merge_thresh);
        debug!(
            "{} threshold merging at {}: {} edges",
            tag,
            config.field(tag).merge_thresh,
            thresh_edges.len()
        );
        edges.extend(thresh_edges);
    }

    let mut self_pairs = Vec::new();
    if flag.uses_engine() {
        let engine = InterestEngine::new(config);
        self_pairs = engine.compare(ComparisonKind::for_field(tag), objects, objects)?;
        let cutoff = config.merge_interest_thresh(tag);
        let engine_edges = engine_merge_edges(&self_pairs, cutoff);
        debug!(
            "{} engine merging at interest {:.3}: {} of {} pairs linked",
            tag,
            cutoff,
            engine_edges.len(),
            self_pairs.len()
        );
        edges.extend(engine_edges);
    }

    let partition = MergePartition::from_edges(count, &edges, prior, tag)?;
    debug!(
        "{} merging ({}): {} objects in {} groups, {} merged",
        tag,
        flag.as_str(),
        count,
        partition.groups().len(),
        partition.n_merged()
    );

    Ok(FieldMerge {
        tag,
        flag,
        partition,
        self_pairs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::compute_all;
    use crate::config::ThreshOp;
    use crate::field::{Mask, DEFAULT_BAD_DATA};

    #[test]
    fn test_partition_from_edges() {
        let p = MergePartition::from_edges(5, &[(4, 2), (5, 4)], None, FieldTag::Fcst).unwrap();
        assert_eq!(p.groups(), &[vec![1], vec![2, 4, 5], vec![3]]);
        assert_eq!(p.n_merged(), 1);
        assert_eq!(p.group_of(5), Some(1));
        assert_eq!(p.edges(), vec![(2, 4), (4, 5)]);
    }

    #[test]
    fn test_group_lookup_covers_every_id() {
        let p = MergePartition::from_edges(6, &[(6, 1), (3, 5)], None, FieldTag::Obs).unwrap();
        assert_eq!(p.groups(), &[vec![1, 6], vec![2], vec![3, 5], vec![4]]);
        let lookup: Vec<Option<usize>> = (0..=7).map(|id| p.group_of(id)).collect();
        assert_eq!(
            lookup,
            vec![None, Some(0), Some(1), Some(2), Some(3), Some(2), Some(0), None]
        );

        let single = MergePartition::singletons(3);
        assert_eq!(single.group_of(3), Some(2));
        assert_eq!(MergePartition::singletons(0).group_of(1), None);
    }

    #[test]
    fn test_partition_rejects_unknown_ids() {
        let result = MergePartition::from_edges(2, &[(1, 3)], None, FieldTag::Obs);
        assert!(matches!(result, Err(ModeError::UnknownObject { id: 3, .. })));
    }

    #[test]
    fn test_prior_partition_is_kept() {
        let first = MergePartition::from_edges(4, &[(1, 3)], None, FieldTag::Fcst).unwrap();
        let again = MergePartition::from_edges(4, &[(1, 3)], Some(&first), FieldTag::Fcst).unwrap();
        assert_eq!(first, again);

        let extended = MergePartition::from_edges(4, &[(2, 4)], Some(&first), FieldTag::Fcst).unwrap();
        assert_eq!(extended.groups(), &[vec![1, 3], vec![2, 4]]);
    }

    #[test]
    fn test_threshold_merge_groups_by_region() {
        // convolved values: two high blobs joined by a medium bridge, a third blob cut
        // off by a zero gap
        let values = vec![
            9.0, 9.0, 2.0, 9.0, 0.0, 9.0,
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
        ];
        let convolved = RawField::new(6, 2, values, DEFAULT_BAD_DATA).unwrap();
        let mask = threshold_mask(&convolved, &Threshold::new(ThreshOp::Ge, 5.0));
        let (labels, count) = label(&mask);
        assert_eq!(count, 3);

        let edges = threshold_merge_edges(&labels, count, &convolved, &Threshold::new(ThreshOp::Ge, 1.0));
        assert_eq!(edges, vec![(1, 2)]);
    }

    #[test]
    fn test_merge_field_engine() {
        let nx = 40;
        let raw = RawField::filled(nx, 1, 4.0, DEFAULT_BAD_DATA);
        let mut on = vec![false; nx];
        on[0] = true;
        on[2] = true;
        on[39] = true;
        let mask = Mask::from_vec(nx, 1, on).unwrap();
        let (labels, count) = label(&mask);
        let thresh = Threshold::new(ThreshOp::Gt, 0.0);
        let objects = compute_all(&raw, &labels, count, FieldTag::Obs, &thresh, false).unwrap();

        let config = FuzzyConfig::default();
        let merged = merge_field(FieldTag::Obs, &objects, &labels, &raw, MergeFlag::Engine, &config, None).unwrap();

        // three pairs evaluated; only the two pixels two cells apart pass 0.7
        assert_eq!(merged.self_pairs.len(), 3);
        assert!(merged.self_pairs[0].interest > 0.7);
        assert!(merged.self_pairs[1].interest < 0.7);
        assert_eq!(merged.partition.groups(), &[vec![1, 2], vec![3]]);
    }

    #[test]
    fn test_merge_field_both_combines_edge_sets() {
        // 1 and 2 sit at either end of a long bridge above the merge threshold; 3 and 4
        // are close together but split by a zero gap
        let nx = 100;
        let mut values = vec![0.0; nx];
        for v in &mut values[1..39] {
            *v = 2.0;
        }
        for x in [0, 39, 70, 72] {
            values[x] = 5.0;
        }
        let raw = RawField::new(nx, 1, values, DEFAULT_BAD_DATA).unwrap();
        let (labels, count) = label(&threshold_mask(&raw, &Threshold::new(ThreshOp::Ge, 5.0)));
        assert_eq!(count, 4);
        let objects = compute_all(&raw, &labels, count, FieldTag::Fcst, &Threshold::new(ThreshOp::Gt, 0.0), false).unwrap();

        let mut config = FuzzyConfig::default();
        config.fcst.merge_thresh = Threshold::new(ThreshOp::Ge, 1.0);

        let merge = |flag| merge_field(FieldTag::Fcst, &objects, &labels, &raw, flag, &config, None).unwrap();

        let thresh = merge(MergeFlag::Thresh);
        assert_eq!(thresh.partition.groups(), &[vec![1, 2], vec![3], vec![4]]);
        assert!(thresh.self_pairs.is_empty());

        let engine = merge(MergeFlag::Engine);
        assert_eq!(engine.partition.groups(), &[vec![1], vec![2], vec![3, 4]]);
        let bridged = engine.self_pairs.iter().find(|p| (p.id_a, p.id_b) == (1, 2)).unwrap();
        assert!(bridged.interest < config.merge_interest_thresh(FieldTag::Fcst));

        let both = merge(MergeFlag::Both);
        assert_eq!(both.partition.groups(), &[vec![1, 2], vec![3, 4]]);
        assert_eq!(both.partition.n_merged(), 2);
        assert_eq!(both.self_pairs.len(), 6);
    }
}
