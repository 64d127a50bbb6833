//! Forecast to observation matching.
//!
//! Candidate pairs are the scored forecast/observation pairs that reach the total
//! interest threshold. They are visited from the highest interest down and accepted
//! according to the match flag. Accepted matches and the merge partitions of both
//! fields form an undirected graph over all objects whose connected components become
//! clusters.

use std::cmp::Ordering;

use log::debug;
use serde::Serialize;

use crate::attributes::SimpleObject;
use crate::config::{FuzzyConfig, MatchFlag};
use crate::errors::{ModeError, Result};
use crate::field::FieldTag;
use crate::interest::{ComparisonKind, InterestEngine, ObjectPair};
use crate::merge::MergePartition;
use crate::union_find::UnionFind;

/// Forecast/observation pair table and the matches accepted from it
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    /// Every scored pair, forecast-major
    pub pairs: Vec<ObjectPair>,
    /// Accepted (fcst id, obs id) matches in acceptance order
    pub matches: Vec<(usize, usize)>,
}

/// Pairs eligible for matching, highest interest first.
///
/// Ties are broken by forecast id and then observation id so the order never depends
/// on how the table was built.
pub fn ranked_candidates(pairs: &[ObjectPair], interest_thresh: f64) -> Vec<&ObjectPair> {
    let mut candidates: Vec<&ObjectPair> = pairs
        .iter()
        .filter(|p| p.kind == ComparisonKind::FcstObs && !p.skipped && p.interest >= interest_thresh)
        .collect();

    candidates.sort_by(|a, b| {
        b.interest
            .partial_cmp(&a.interest)
            .unwrap_or(Ordering::Equal)
            .then(a.id_a.cmp(&b.id_a))
            .then(a.id_b.cmp(&b.id_b))
    });
    candidates
}

/// Greedy acceptance of ranked candidates under a match flag
pub fn select_matches(
    pairs: &[ObjectPair],
    flag: MatchFlag,
    interest_thresh: f64,
    n_fcst: usize,
    n_obs: usize,
) -> Vec<(usize, usize)> {
    if flag == MatchFlag::None {
        return Vec::new();
    }

    let mut fcst_taken = vec![false; n_fcst + 1];
    let mut obs_taken = vec![false; n_obs + 1];
    let mut accepted = Vec::new();

    for pair in ranked_candidates(pairs, interest_thresh) {
        let (f, o) = (pair.id_a, pair.id_b);
        if f > n_fcst || o > n_obs {
            continue;
        }

        let allowed = match flag {
            MatchFlag::MergeBoth => true,
            MatchFlag::MergeFcst => !fcst_taken[f],
            MatchFlag::NoMerge => !fcst_taken[f] && !obs_taken[o],
            MatchFlag::None => false,
        };

        if allowed {
            fcst_taken[f] = true;
            obs_taken[o] = true;
            accepted.push((f, o));
        }
    }

    accepted
}

/// Score every forecast/observation pair and select the matches
pub fn match_objects(
    fcst: &[SimpleObject],
    obs: &[SimpleObject],
    config: &FuzzyConfig,
) -> Result<MatchResult> {
    if config.match_flag == MatchFlag::None {
        debug!("Matching disabled; every object stays unmatched");
        return Ok(MatchResult::default());
    }

    let engine = InterestEngine::new(config);
    let pairs = engine.compare(ComparisonKind::FcstObs, fcst, obs)?;
    let matches = select_matches(
        &pairs,
        config.match_flag,
        config.total_interest_thresh,
        fcst.len(),
        obs.len(),
    );

    debug!(
        "Matching ({}): {} pairs scored, {} skipped, {} accepted at interest {:.3}",
        config.match_flag.as_str(),
        pairs.len(),
        pairs.iter().filter(|p| p.skipped).count(),
        matches.len(),
        config.total_interest_thresh
    );

    Ok(MatchResult { pairs, matches })
}

/// Connected group of the match graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Component {
    pub fcst: Vec<usize>,
    pub obs: Vec<usize>,
}

impl Component {
    pub fn is_matched(&self) -> bool {
        !self.fcst.is_empty() && !self.obs.is_empty()
    }
}

/// Undirected graph over every forecast and observation object.
///
/// Forecast id `f` is node `f - 1` and observation id `o` is node `n_fcst + o - 1`.
#[derive(Debug, Clone)]
pub struct MatchGraph {
    n_fcst: usize,
    n_obs: usize,
    sets: UnionFind,
    edges: Vec<(usize, usize)>,
}

impl MatchGraph {
    pub fn new(n_fcst: usize, n_obs: usize) -> Self {
        Self {
            n_fcst,
            n_obs,
            sets: UnionFind::new(n_fcst + n_obs),
            edges: Vec::new(),
        }
    }

    pub fn n_fcst(&self) -> usize {
        self.n_fcst
    }

    pub fn n_obs(&self) -> usize {
        self.n_obs
    }

    fn node(&self, tag: FieldTag, id: usize) -> Result<usize> {
        let count = match tag {
            FieldTag::Fcst => self.n_fcst,
            FieldTag::Obs => self.n_obs,
        };
        if id == 0 || id > count {
            return Err(ModeError::UnknownObject { tag, id, count });
        }
        Ok(match tag {
            FieldTag::Fcst => id - 1,
            FieldTag::Obs => self.n_fcst + id - 1,
        })
    }

    fn link(&mut self, a: usize, b: usize) {
        self.sets.union(a, b);
        self.edges.push((a, b));
    }

    /// Link the members of every merged group of one field
    pub fn add_partition(&mut self, tag: FieldTag, partition: &MergePartition) -> Result<()> {
        for (a, b) in partition.edges() {
            let (na, nb) = (self.node(tag, a)?, self.node(tag, b)?);
            self.link(na, nb);
        }
        Ok(())
    }

    pub fn add_match(&mut self, fcst_id: usize, obs_id: usize) -> Result<()> {
        let (f, o) = (self.node(FieldTag::Fcst, fcst_id)?, self.node(FieldTag::Obs, obs_id)?);
        self.link(f, o);
        Ok(())
    }

    pub fn n_edges(&self) -> usize {
        self.edges.len()
    }

    /// Components ordered by their smallest node, so groups holding forecast objects
    /// come first in forecast id order
    pub fn components(&self) -> Vec<Component> {
        self.sets
            .clone()
            .groups()
            .into_iter()
            .map(|nodes| {
                let mut component = Component {
                    fcst: Vec::new(),
                    obs: Vec::new(),
                };
                for node in nodes {
                    if node < self.n_fcst {
                        component.fcst.push(node + 1);
                    } else {
                        component.obs.push(node - self.n_fcst + 1);
                    }
                }
                component
            })
            .collect()
    }

    /// Whether each object of a field ends up in a component with both fields,
    /// indexed by id - 1
    pub fn matched_flags(&self, tag: FieldTag) -> Vec<bool> {
        let count = match tag {
            FieldTag::Fcst => self.n_fcst,
            FieldTag::Obs => self.n_obs,
        };
        let mut flags = vec![false; count];
        for component in self.components().iter().filter(|c| c.is_matched()) {
            let ids = match tag {
                FieldTag::Fcst => &component.fcst,
                FieldTag::Obs => &component.obs,
            };
            for &id in ids {
                flags[id - 1] = true;
            }
        }
        flags
    }
}
