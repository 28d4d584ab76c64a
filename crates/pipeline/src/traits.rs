//! Core traits for the ranking pipeline.

use crate::types::{Candidate, EffectiveConstraints};
use anyhow::Result;
use data_loader::{MovieId, UserId};
use std::collections::{BTreeSet, HashSet};

/// Per-query state every filter may consult
#[derive(Debug, Clone, Default)]
pub struct RankingContext {
    pub user_id: UserId,
    pub constraints: EffectiveConstraints,
    /// Movies the user has already rated
    pub rated: HashSet<MovieId>,
    /// Movies the user explicitly disliked
    pub disliked: BTreeSet<MovieId>,
}

impl RankingContext {
    pub fn new(user_id: UserId, constraints: EffectiveConstraints) -> Self {
        Self {
            user_id,
            constraints,
            ..Default::default()
        }
    }

    pub fn with_rated(mut self, rated: impl IntoIterator<Item = MovieId>) -> Self {
        self.rated.extend(rated);
        self
    }

    pub fn with_disliked(mut self, disliked: impl IntoIterator<Item = MovieId>) -> Self {
        self.disliked.extend(disliked);
        self
    }
}

/// Core trait for filtering candidates.
///
/// Filters take ownership of the candidate list and return the survivors in
/// their original order. `Send + Sync` lets one pipeline serve concurrent
/// queries.
pub trait Filter: Send + Sync {
    /// Returns the name of this filter (for logging/debugging)
    fn name(&self) -> &str;

    /// Apply this filter to a set of candidates.
    fn apply(&self, candidates: Vec<Candidate>, context: &RankingContext) -> Result<Vec<Candidate>>;
}
