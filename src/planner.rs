//! Two-stage candidate retrieval for the planner
//!
//! Top-down: rank destinations, then rank experiences inside each one.
//! Bottom-up: rank experiences everywhere, then resolve the destinations they
//! belong to.
//!
//! After retrieval the planner either reports a conflict (two anchor events
//! competing inside one destination) or trims each destination to a short,
//! role-diverse list of experiences.

use crate::error::{Result, RoamerError};
use crate::index::{field_str, CollectionKind, Document};
use crate::toolkit::{DestinationQuery, RetrievalToolkit};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

/// Profile words that name a specific experience rather than a kind of place.
pub const ANCHOR_KEYWORDS: [&str; 9] = [
    "concert", "festival", "k-pop", "event", "show", "elephant", "safari", "diving", "skiing",
];

const ROLE_FIELD: &str = "itinerary_role";
const DEFAULT_ROLE: &str = "Add-On";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Start from destinations matching `query`.
    TopDown { query: String },
    /// Start from experiences matching `query`.
    BottomUp { query: String },
}

impl Strategy {
    /// Bottom-up when the profile mentions an anchor keyword, top-down
    /// otherwise. The profile itself is the search text.
    pub fn auto(profile: &str) -> Self {
        let lowered = profile.to_lowercase();
        let query = profile.to_string();
        if ANCHOR_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            Strategy::BottomUp { query }
        } else {
            Strategy::TopDown { query }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::TopDown { .. } => "top-down",
            Strategy::BottomUp { .. } => "bottom-up",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerLimits {
    pub destinations: usize,
    pub experiences_per_destination: usize,
    /// Experience pool size for bottom-up search.
    pub experience_pool: usize,
    /// Experiences kept per destination in the final plan.
    pub selected_per_destination: usize,
}

impl Default for PlannerLimits {
    fn default() -> Self {
        Self {
            destinations: 3,
            experiences_per_destination: 7,
            experience_pool: 15,
            selected_per_destination: 4,
        }
    }
}

impl PlannerLimits {
    pub fn validate(&self) -> Result<()> {
        let limits = [
            ("destinations", self.destinations),
            ("experiences_per_destination", self.experiences_per_destination),
            ("experience_pool", self.experience_pool),
            ("selected_per_destination", self.selected_per_destination),
        ];
        match limits.iter().find(|(_, v)| *v == 0) {
            Some((name, _)) => Err(RoamerError::Configuration(format!(
                "planner.{} must be at least 1",
                name
            ))),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DestinationCandidates {
    pub destination: Document,
    pub experiences: Vec<Document>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Candidates {
    pub strategy: &'static str,
    pub destinations: Vec<DestinationCandidates>,
}

impl Candidates {
    pub fn experience_count(&self) -> usize {
        self.destinations.iter().map(|d| d.experiences.len()).sum()
    }
}

/// Competing anchor events inside one destination. The question comes from
/// the first anchor's `conflict_solver` and is meant for the traveller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conflict {
    pub destination_id: String,
    pub conflict_question: String,
    pub competing_experiences: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanOutcome {
    Success(Candidates),
    Conflict(Conflict),
}

pub struct CandidatePlanner<'a> {
    toolkit: &'a RetrievalToolkit,
    limits: PlannerLimits,
}

impl<'a> CandidatePlanner<'a> {
    pub fn new(toolkit: &'a RetrievalToolkit) -> Self {
        Self {
            toolkit,
            limits: PlannerLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: PlannerLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Retrieve, check for anchor conflicts, then select experiences.
    pub async fn plan(&self, strategy: &Strategy, profile: &str) -> Result<PlanOutcome> {
        if profile.trim().is_empty() {
            return Err(RoamerError::invalid_call("no traveller profile to plan from"));
        }

        let candidates = self.gather(strategy, Some(profile)).await?;
        if let Some(conflict) = detect_conflict(&candidates) {
            info!(
                destination = %conflict.destination_id,
                competing = conflict.competing_experiences.len(),
                "Anchor events conflict"
            );
            return Ok(PlanOutcome::Conflict(conflict));
        }

        Ok(PlanOutcome::Success(select(
            candidates,
            self.limits.selected_per_destination,
        )))
    }

    /// `profile` is the traveller summary used to rank experiences inside a
    /// destination during top-down retrieval; it falls back to the query.
    pub async fn gather(&self, strategy: &Strategy, profile: Option<&str>) -> Result<Candidates> {
        let candidates = match strategy {
            Strategy::TopDown { query } => self.top_down(query, profile.unwrap_or(query)).await?,
            Strategy::BottomUp { query } => self.bottom_up(query).await?,
        };

        info!(
            strategy = strategy.name(),
            destinations = candidates.destinations.len(),
            experiences = candidates.experience_count(),
            "Gathered planning candidates"
        );
        Ok(candidates)
    }

    async fn top_down(&self, query: &str, profile: &str) -> Result<Candidates> {
        let destinations = self
            .toolkit
            .search_destinations(DestinationQuery::Semantic {
                query: query.to_string(),
                top_k: self.limits.destinations,
            })
            .await?;

        let mut out = Vec::with_capacity(destinations.len());
        for destination in destinations {
            let experiences = match field_str(&destination, CollectionKind::Destination.id_field()) {
                Some(id) => {
                    self.toolkit
                        .search_experiences(profile, Some(id), Some(self.limits.experiences_per_destination))
                        .await?
                }
                None => Vec::new(),
            };
            out.push(DestinationCandidates {
                destination,
                experiences,
            });
        }

        Ok(Candidates {
            strategy: "top-down",
            destinations: out,
        })
    }

    async fn bottom_up(&self, query: &str) -> Result<Candidates> {
        let experiences = self
            .toolkit
            .search_experiences(query, None, Some(self.limits.experience_pool))
            .await?;

        let destination_ids = parent_destinations(&experiences, self.limits.destinations);
        let destinations = self
            .toolkit
            .search_destinations(DestinationQuery::lookup(destination_ids.iter()))
            .await?;

        // Lookup returns index order; present destinations in experience rank order.
        let mut out = Vec::with_capacity(destinations.len());
        for id in &destination_ids {
            let Some(destination) = destinations
                .iter()
                .find(|d| field_str(d, CollectionKind::Destination.id_field()) == Some(id.as_str()))
            else {
                continue;
            };
            let scoped = experiences
                .iter()
                .filter(|e| field_str(e, "parent_destination_id") == Some(id.as_str()))
                .cloned()
                .collect();
            out.push(DestinationCandidates {
                destination: destination.clone(),
                experiences: scoped,
            });
        }

        Ok(Candidates {
            strategy: "bottom-up",
            destinations: out,
        })
    }
}

/// Unique `parent_destination_id`s in first-seen order, at most `limit`.
pub fn parent_destinations(experiences: &[Document], limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    experiences
        .iter()
        .filter_map(|e| field_str(e, "parent_destination_id"))
        .filter(|id| seen.insert(*id))
        .take(limit)
        .map(str::to_string)
        .collect()
}

fn role_of(doc: &Document) -> &str {
    field_str(doc, ROLE_FIELD).unwrap_or(DEFAULT_ROLE)
}

fn role_priority(role: &str) -> u8 {
    match role {
        "Anchor-Event" => 0,
        "Secondary-Highlight" => 1,
        "Add-On" => 2,
        _ => 3,
    }
}

/// Up to `count` experiences: one per distinct role first, in role priority
/// order (anchor, secondary, add-on), then the remaining slots by priority.
/// Equal priorities keep their rank order.
pub fn select_experiences(experiences: &[Document], count: usize) -> Vec<Document> {
    let mut order: Vec<usize> = (0..experiences.len()).collect();
    order.sort_by_key(|&i| role_priority(role_of(&experiences[i])));

    let mut picked: Vec<usize> = Vec::with_capacity(count.min(order.len()));
    let mut roles = HashSet::new();
    for &i in &order {
        if picked.len() >= count {
            break;
        }
        if roles.insert(role_of(&experiences[i])) {
            picked.push(i);
        }
    }
    for &i in &order {
        if picked.len() >= count {
            break;
        }
        if !picked.contains(&i) {
            picked.push(i);
        }
    }

    picked.into_iter().map(|i| experiences[i].clone()).collect()
}

/// Apply [`select_experiences`] to every destination.
pub fn select(mut candidates: Candidates, count: usize) -> Candidates {
    for group in &mut candidates.destinations {
        group.experiences = select_experiences(&group.experiences, count);
    }
    candidates
}

/// First destination (in candidate order) holding two or more anchor events
/// whose first anchor carries a `conflict_solver.conflict_question`.
pub fn detect_conflict(candidates: &Candidates) -> Option<Conflict> {
    let mut groups: Vec<(&str, Vec<&Document>)> = Vec::new();
    for exp in candidates.destinations.iter().flat_map(|d| &d.experiences) {
        if field_str(exp, ROLE_FIELD) != Some("Anchor-Event") {
            continue;
        }
        let Some(parent) = field_str(exp, "parent_destination_id") else {
            continue;
        };
        match groups.iter_mut().find(|(id, _)| *id == parent) {
            Some((_, anchors)) => anchors.push(exp),
            None => groups.push((parent, vec![exp])),
        }
    }

    groups
        .into_iter()
        .filter(|(_, anchors)| anchors.len() >= 2)
        .find_map(|(destination_id, anchors)| {
            let question = anchors[0]
                .get("conflict_solver")
                .and_then(|solver| solver.get("conflict_question"))
                .and_then(|q| q.as_str())?;
            Some(Conflict {
                destination_id: destination_id.to_string(),
                conflict_question: question.to_string(),
                competing_experiences: anchors
                    .iter()
                    .filter_map(|e| field_str(e, CollectionKind::Experience.id_field()))
                    .map(str::to_string)
                    .collect(),
            })
        })
}
