//! Query expansion: query text to weighted seed tags.
//!
//! Every token goes through alias resolution. Short queries additionally
//! pull in the broader concepts of each resolved tag at a reduced weight,
//! since a one- or two-word query rarely names the exact tag a note carries.

use std::cmp::Ordering;
use std::collections::HashMap;

use time::OffsetDateTime;
use tracing::debug;

use crate::config::ExpansionConfig;
use crate::error::{RetrievalError, RetrievalResult};
use crate::graph::GraphStore;
use crate::models::clamp_unit;
use crate::{HierarchyKind, NoteId, Tag, TagId, TagNormalizer};

/// Keyword alternatives for one query token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordGroup {
    /// The normalized token as typed.
    pub token: String,
    /// The token itself first, then canonical name, trusted aliases and broader names.
    pub alternatives: Vec<String>,
}

/// Output of [`QueryExpander::expand`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightedTermSet {
    seeds: HashMap<TagId, f64>,
    keyword_groups: Vec<KeywordGroup>,
}

impl WeightedTermSet {
    /// Seed tags and their initial activation. Each tag appears once.
    pub fn seeds(&self) -> &HashMap<TagId, f64> {
        &self.seeds
    }

    pub fn keyword_groups(&self) -> &[KeywordGroup] {
        &self.keyword_groups
    }

    /// True when no tag could be resolved.
    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    pub fn weight(&self, tag: TagId) -> Option<f64> {
        self.seeds.get(&tag).copied()
    }

    /// Keyword groups from the bare tokens, without seeds. Needs no store access.
    pub(crate) fn from_tokens(query: &str) -> Self {
        let mut keyword_groups: Vec<KeywordGroup> = Vec::new();
        for term in TagNormalizer::query_terms(query) {
            if keyword_groups.iter().all(|group| group.token != term) {
                keyword_groups.push(KeywordGroup {
                    alternatives: vec![term.clone()],
                    token: term,
                });
            }
        }
        Self {
            seeds: HashMap::new(),
            keyword_groups,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    weight: f64,
    direct: bool,
}

/// Turns a query string or a reference note into seeds for spreading activation.
pub struct QueryExpander<'a, S: GraphStore + ?Sized> {
    store: &'a S,
    config: &'a ExpansionConfig,
}

impl<'a, S: GraphStore + ?Sized> QueryExpander<'a, S> {
    pub fn new(store: &'a S, config: &'a ExpansionConfig) -> Self {
        Self { store, config }
    }

    /// Expands a query, or seeds from a note when `seed_note` is given.
    ///
    /// With a seed note the query text is ignored and the note's tags are the
    /// seeds, weighted by their clamped assignment confidence. An unresolvable
    /// query yields an empty set rather than an error.
    pub fn expand(
        &self,
        query: &str,
        seed_note: Option<NoteId>,
        now: OffsetDateTime,
    ) -> RetrievalResult<WeightedTermSet> {
        self.config.validate()?;
        match seed_note {
            Some(note) => self.seed_from_note(note),
            None => self.expand_query(query, now),
        }
    }

    fn seed_from_note(&self, note: NoteId) -> RetrievalResult<WeightedTermSet> {
        let assignments = self
            .store
            .note_tags(note)?
            .ok_or(RetrievalError::NoteNotFound(note))?;

        let mut seeds = HashMap::new();
        for assignment in assignments {
            let weight = assignment.weight();
            if weight > 0.0 {
                let entry = seeds.entry(assignment.tag_id()).or_insert(weight);
                *entry = entry.max(weight);
            }
        }

        debug!(%note, seeds = seeds.len(), "seeded from note tags");
        Ok(WeightedTermSet {
            seeds,
            keyword_groups: Vec::new(),
        })
    }

    fn expand_query(&self, query: &str, now: OffsetDateTime) -> RetrievalResult<WeightedTermSet> {
        let terms = TagNormalizer::query_terms(query);
        if terms.is_empty() {
            return Ok(WeightedTermSet::default());
        }

        let short_query = terms.len() < self.config.short_query_threshold;
        let mut candidates: HashMap<TagId, Candidate> = HashMap::new();
        let mut keyword_groups: Vec<KeywordGroup> = Vec::new();

        for term in &terms {
            if keyword_groups.iter().any(|group| &group.token == term) {
                continue;
            }
            let mut group = KeywordGroup {
                token: term.clone(),
                alternatives: vec![term.clone()],
            };

            if let Some(tag) = self.resolve(term)? {
                admit(&mut candidates, tag.id(), 1.0, true);
                push_unique(&mut group.alternatives, tag.name());

                for alias in self.store.aliases_for_tag(tag.id())? {
                    if alias.is_trusted() {
                        push_unique(&mut group.alternatives, alias.alias());
                    }
                }

                if short_query {
                    for broader in self.broader_tags(tag.id(), now)? {
                        admit(&mut candidates, broader.id(), self.config.broader_weight, false);
                        push_unique(&mut group.alternatives, broader.name());
                    }
                }
            }

            keyword_groups.push(group);
        }

        if terms.len() > 1 {
            let phrase = terms.join("-");
            if let Some(tag) = self.resolve(&phrase)? {
                admit(&mut candidates, tag.id(), 1.0, true);
                if short_query {
                    for broader in self.broader_tags(tag.id(), now)? {
                        admit(&mut candidates, broader.id(), self.config.broader_weight, false);
                    }
                }
            }
        }

        let seeds = self.cap(candidates);
        debug!(
            terms = terms.len(),
            seeds = seeds.len(),
            short_query,
            "expanded query"
        );

        Ok(WeightedTermSet {
            seeds,
            keyword_groups,
        })
    }

    /// Alias first, then exact tag name.
    fn resolve(&self, term: &str) -> RetrievalResult<Option<Tag>> {
        if let Some(id) = self.store.resolve_alias(term)? {
            if let Some(tag) = self.store.tag(id)? {
                return Ok(Some(tag));
            }
        }
        self.store.find_tag_by_name(term)
    }

    /// Parents of `tag` over valid generic edges at or above `broader_min_confidence`.
    fn broader_tags(&self, tag: TagId, now: OffsetDateTime) -> RetrievalResult<Vec<Tag>> {
        let mut broader = Vec::new();
        for edge in self.store.incident_edges(tag, now)? {
            if edge.source() != tag
                || edge.target() == tag
                || edge.hierarchy_kind() != Some(HierarchyKind::Generic)
                || edge.weight() < self.config.broader_min_confidence
            {
                continue;
            }
            if let Some(parent) = self.store.tag(edge.target())? {
                broader.push(parent);
            }
        }
        Ok(broader)
    }

    /// Keeps at most `max_expanded_terms` seeds, dropping the lowest weights first.
    fn cap(&self, candidates: HashMap<TagId, Candidate>) -> HashMap<TagId, f64> {
        let mut ranked: Vec<(TagId, Candidate)> = candidates.into_iter().collect();
        ranked.sort_by(|(a_id, a), (b_id, b)| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.direct.cmp(&a.direct))
                .then_with(|| a_id.cmp(b_id))
        });

        if ranked.len() > self.config.max_expanded_terms {
            debug!(
                dropped = ranked.len() - self.config.max_expanded_terms,
                "capped expanded terms"
            );
            ranked.truncate(self.config.max_expanded_terms);
        }

        ranked
            .into_iter()
            .map(|(id, candidate)| (id, clamp_unit(candidate.weight)))
            .collect()
    }
}

/// Records a candidate, keeping the maximum weight when the tag is already present.
fn admit(candidates: &mut HashMap<TagId, Candidate>, tag: TagId, weight: f64, direct: bool) {
    candidates
        .entry(tag)
        .and_modify(|existing| {
            if weight > existing.weight {
                existing.weight = weight;
            }
            existing.direct |= direct;
        })
        .or_insert(Candidate { weight, direct });
}

fn push_unique(alternatives: &mut Vec<String>, value: &str) {
    if !alternatives.iter().any(|existing| existing.eq_ignore_ascii_case(value)) {
        alternatives.push(value.to_string());
    }
}
