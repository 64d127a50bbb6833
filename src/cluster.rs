//! Cluster objects built from the components of the match graph.

use log::debug;
use serde::Serialize;

use crate::attributes::{intersection_area, ObjectKind, SimpleObject};
use crate::config::FuzzyConfig;
use crate::errors::{ModeError, Result};
use crate::field::{FieldTag, RawField};
use crate::interest::{InterestEngine, ObjectPair};
use crate::matching::MatchGraph;

/// Union of one field's members of a component, with its own attributes
#[derive(Debug, Clone)]
pub struct Cluster {
    pub members: Vec<usize>,
    pub object: SimpleObject,
}

/// Matched forecast and observation clusters
#[derive(Debug, Clone)]
pub struct ClusterPair {
    /// 1-based, in order of the smallest forecast member
    pub id: usize,
    pub fcst: Cluster,
    pub obs: Cluster,
    pub pair: ObjectPair,
}

impl ClusterPair {
    /// Pixels shared by the two clusters; equal to `pair.intersection_area`
    pub fn overlap(&self) -> usize {
        intersection_area(&self.fcst.object.pixels, &self.obs.object.pixels)
    }
}

/// Objects of one field left without a counterpart, grouped by merging
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmatchedGroup {
    pub tag: FieldTag,
    pub members: Vec<usize>,
    pub area: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ClusterSet {
    pub pairs: Vec<ClusterPair>,
    pub unmatched: Vec<UnmatchedGroup>,
}

impl ClusterSet {
    pub fn unmatched_in(&self, tag: FieldTag) -> impl Iterator<Item = &UnmatchedGroup> {
        self.unmatched.iter().filter(move |g| g.tag == tag)
    }
}

fn member_objects<'a>(
    objects: &'a [SimpleObject],
    ids: &[usize],
    tag: FieldTag,
) -> Result<Vec<&'a SimpleObject>> {
    ids.iter()
        .map(|&id| {
            objects
                .get(id.wrapping_sub(1))
                .filter(|o| o.id == id)
                .ok_or(ModeError::UnknownObject {
                    tag,
                    id,
                    count: objects.len(),
                })
        })
        .collect()
}

/// Attributes of the union of `ids` as a cluster object
pub fn cluster_object(
    raw: &RawField,
    objects: &[SimpleObject],
    ids: &[usize],
    cluster_id: usize,
    tag: FieldTag,
    config: &FuzzyConfig,
) -> Result<Cluster> {
    let members = member_objects(objects, ids, tag)?;
    let pixels: Vec<usize> = members.iter().flat_map(|o| o.pixels.iter().copied()).collect();

    let object = SimpleObject::from_pixels(
        raw,
        pixels,
        cluster_id,
        tag,
        ObjectKind::Cluster,
        &config.field(tag).conv_thresh,
    )?;

    Ok(Cluster {
        members: ids.to_vec(),
        object,
    })
}

/// Build every cluster pair and unmatched group of the match graph
pub fn build_clusters(
    graph: &MatchGraph,
    fcst_raw: &RawField,
    fcst_objects: &[SimpleObject],
    obs_raw: &RawField,
    obs_objects: &[SimpleObject],
    config: &FuzzyConfig,
) -> Result<ClusterSet> {
    let engine = InterestEngine::new(config);
    let mut set = ClusterSet::default();

    for component in graph.components() {
        if component.is_matched() {
            let id = set.pairs.len() + 1;
            let fcst = cluster_object(fcst_raw, fcst_objects, &component.fcst, id, FieldTag::Fcst, config)?;
            let obs = cluster_object(obs_raw, obs_objects, &component.obs, id, FieldTag::Obs, config)?;
            let pair = engine.interest(&fcst.object, &obs.object)?;

            debug!(
                "Cluster {}: fcst {:?} obs {:?} interest {:.4}",
                id, fcst.members, obs.members, pair.interest
            );
            set.pairs.push(ClusterPair { id, fcst, obs, pair });
            continue;
        }

        let (tag, ids, objects) = if component.obs.is_empty() {
            (FieldTag::Fcst, component.fcst, fcst_objects)
        } else {
            (FieldTag::Obs, component.obs, obs_objects)
        };
        let area = member_objects(objects, &ids, tag)?.iter().map(|o| o.area).sum();
        set.unmatched.push(UnmatchedGroup {
            tag,
            members: ids,
            area,
        });
    }

    Ok(set)
}
