//! Spreading activation retrieval engine for graph-based search.
//!
//! Activation starts at the seed tags and flows hop by hop over the tag
//! graph, losing strength at every edge. Tags that end up activated are
//! then turned into note scores through the notes' tag assignments.

use std::collections::{HashMap, HashSet};

use time::OffsetDateTime;
use tracing::{debug, trace};

use crate::config::ActivationConfig;
use crate::deadline::Deadline;
use crate::error::RetrievalResult;
use crate::graph::GraphStore;
use crate::models::clamp_unit;
use crate::{Edge, HierarchyKind, NoteId, TagId};

/// Best activation seen per tag during one call, with the hop it was reached at.
#[derive(Debug, Default)]
pub struct ActivationState {
    best: HashMap<TagId, (f64, usize)>,
}

impl ActivationState {
    fn seeded(seeds: &HashMap<TagId, f64>) -> Self {
        Self {
            best: seeds
                .iter()
                .map(|(&tag, &weight)| (tag, (weight, 0)))
                .collect(),
        }
    }

    /// Records `activation` for `tag` if it beats everything recorded so far.
    ///
    /// Traversal is breadth-first, so every earlier record sits at an equal
    /// or shallower hop. Returns whether the tag should spread further.
    fn improve(&mut self, tag: TagId, activation: f64, hop: usize) -> bool {
        match self.best.get(&tag) {
            Some(&(recorded, _)) if activation <= recorded => false,
            _ => {
                self.best.insert(tag, (activation, hop));
                true
            }
        }
    }

    pub fn activation(&self, tag: TagId) -> Option<f64> {
        self.best.get(&tag).map(|&(activation, _)| activation)
    }

    pub fn hop(&self, tag: TagId) -> Option<usize> {
        self.best.get(&tag).map(|&(_, hop)| hop)
    }

    pub fn len(&self) -> usize {
        self.best.len()
    }

    pub fn is_empty(&self) -> bool {
        self.best.is_empty()
    }
}

/// Spreads activation from `seeds` through the tag graph.
///
/// # Algorithm
///
/// 1. Every seed starts at hop 0 with its own weight
/// 2. Each hop visits the edges incident to the frontier in both directions,
///    skipping edges whose validity window does not cover `now`
/// 3. `next = activation * confidence * decay_factor * kind_multiplier`, where the
///    kind multiplier is `partitive_multiplier` for partitive edges and 1.0 otherwise
/// 4. Values below `threshold` are pruned; a tag keeps the maximum it was reached
///    with and only spreads again when that maximum improves
/// 5. Stops after `max_hops` or when the frontier empties
/// 6. Each activated tag is boosted once by `1 + degree / max_degree * centrality_boost`
///
/// Returns an empty map on cold start: no seeds, or nothing beyond the seeds reached.
///
/// # Examples
///
/// ```
/// use notegraph::{ActivationConfig, Database, Deadline, SqliteGraphStore, TagId};
/// use notegraph::spreading_activation::spread_activation;
/// use std::collections::HashMap;
/// use std::time::Duration;
///
/// # fn main() -> anyhow::Result<()> {
/// let db = Database::in_memory()?;
/// let store = SqliteGraphStore::new(db.connection());
/// let seeds = HashMap::from([(TagId::new(1), 1.0)]);
///
/// let activated = spread_activation(
///     &store,
///     &seeds,
///     &ActivationConfig::default(),
///     time::OffsetDateTime::now_utc(),
///     &Deadline::after(Duration::from_secs(2)),
/// )?;
/// assert!(activated.is_empty()); // no edges yet
/// # Ok(())
/// # }
/// ```
pub fn spread_activation<S: GraphStore + ?Sized>(
    store: &S,
    seeds: &HashMap<TagId, f64>,
    config: &ActivationConfig,
    now: OffsetDateTime,
    deadline: &Deadline,
) -> RetrievalResult<HashMap<TagId, f64>> {
    config.validate()?;
    if seeds.is_empty() {
        return Ok(HashMap::new());
    }

    let mut state = ActivationState::seeded(seeds);
    let mut edge_cache: HashMap<TagId, Vec<Edge>> = HashMap::new();
    let mut frontier = sorted_frontier(seeds.iter().map(|(&tag, &weight)| (tag, weight)));
    let mut hop = 0;

    while !frontier.is_empty() && hop < config.max_hops {
        let mut next_frontier: HashMap<TagId, f64> = HashMap::new();

        for (tag, activation) in frontier {
            deadline.check()?;

            if !edge_cache.contains_key(&tag) {
                edge_cache.insert(tag, store.incident_edges(tag, now)?);
            }
            let edges = edge_cache.get(&tag).map(Vec::as_slice).unwrap_or_default();

            for edge in edges {
                let Some(neighbor) = edge.other_endpoint(tag) else {
                    continue;
                };
                if neighbor == tag {
                    continue;
                }

                let next = activation * edge.weight() * config.decay_factor * kind_multiplier(edge, config);
                if next < config.threshold {
                    continue;
                }
                if state.improve(neighbor, next, hop + 1) {
                    let entry = next_frontier.entry(neighbor).or_insert(next);
                    *entry = entry.max(next);
                }
            }
        }

        hop += 1;
        trace!(hop, frontier = next_frontier.len(), "activation hop");
        frontier = sorted_frontier(next_frontier.into_iter());
    }

    let seed_tags: HashSet<TagId> = seeds.keys().copied().collect();
    if state.best.keys().all(|tag| seed_tags.contains(tag)) {
        debug!(seeds = seeds.len(), "cold start: activation did not leave the seeds");
        return Ok(HashMap::new());
    }

    let mut activations: HashMap<TagId, f64> = state
        .best
        .into_iter()
        .map(|(tag, (activation, _))| (tag, activation))
        .collect();
    apply_centrality_boost(store, &mut activations, config)?;

    debug!(
        seeds = seeds.len(),
        activated = activations.len(),
        hops = hop,
        elapsed_ms = deadline.elapsed().as_millis() as u64,
        "spread activation"
    );
    Ok(activations)
}

fn kind_multiplier(edge: &Edge, config: &ActivationConfig) -> f64 {
    match edge.hierarchy_kind() {
        Some(HierarchyKind::Partitive) => config.partitive_multiplier,
        Some(HierarchyKind::Generic) | None => 1.0,
    }
}

/// Orders a frontier by tag id so traversal does not depend on hash order.
fn sorted_frontier(entries: impl Iterator<Item = (TagId, f64)>) -> Vec<(TagId, f64)> {
    let mut frontier: Vec<(TagId, f64)> = entries.collect();
    frontier.sort_by_key(|&(tag, _)| tag);
    frontier
}

fn apply_centrality_boost<S: GraphStore + ?Sized>(
    store: &S,
    activations: &mut HashMap<TagId, f64>,
    config: &ActivationConfig,
) -> RetrievalResult<()> {
    if config.centrality_boost == 0.0 {
        return Ok(());
    }
    let max_degree = store.max_degree_centrality()?;
    if max_degree == 0 {
        return Ok(());
    }

    let tags: Vec<TagId> = activations.keys().copied().collect();
    let degrees = store.degree_centrality(&tags)?;
    for (tag, activation) in activations.iter_mut() {
        let degree = degrees.get(tag).copied().unwrap_or(0);
        *activation *= 1.0 + (f64::from(degree) / f64::from(max_degree)) * config.centrality_boost;
    }
    Ok(())
}

/// Scores notes by the activation of the tags assigned to them.
///
/// A note's raw score is the sum of `activation * assignment confidence` over
/// its activated tags; scores are then divided by the maximum so the best
/// note gets 1.0. `exclude` drops a note before normalization.
pub fn score_notes<S: GraphStore + ?Sized>(
    store: &S,
    activations: &HashMap<TagId, f64>,
    exclude: Option<NoteId>,
) -> RetrievalResult<HashMap<NoteId, f64>> {
    if activations.is_empty() {
        return Ok(HashMap::new());
    }

    let mut tags: Vec<TagId> = activations.keys().copied().collect();
    tags.sort();

    let mut scores: HashMap<NoteId, f64> = HashMap::new();
    for assignment in store.assignments_for_tags(&tags)? {
        if Some(assignment.note_id) == exclude {
            continue;
        }
        let activation = activations.get(&assignment.tag_id).copied().unwrap_or(0.0);
        let contribution = activation * clamp_unit(assignment.confidence);
        if contribution > 0.0 {
            *scores.entry(assignment.note_id).or_insert(0.0) += contribution;
        }
    }

    Ok(normalize_by_max(scores))
}

/// Divides every score by the largest one. Empty or all-zero input yields an empty map.
pub(crate) fn normalize_by_max<K: std::hash::Hash + Eq>(scores: HashMap<K, f64>) -> HashMap<K, f64> {
    let max = scores.values().copied().fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return HashMap::new();
    }
    scores
        .into_iter()
        .map(|(key, score)| (key, score / max))
        .collect()
}
