//! Genre constraints.
//!
//! Candidates whose movie is missing from the catalog are dropped, since
//! their genres cannot be checked.

use crate::traits::{Filter, RankingContext};
use crate::types::Candidate;
use anyhow::Result;
use data_loader::DataIndex;
use std::sync::Arc;

/// Removes any candidate carrying an excluded genre.
pub struct ExcludedGenreFilter {
    data_index: Arc<DataIndex>,
}

impl ExcludedGenreFilter {
    pub fn new(data_index: Arc<DataIndex>) -> Self {
        Self { data_index }
    }
}

impl Filter for ExcludedGenreFilter {
    fn name(&self) -> &str {
        "ExcludedGenreFilter"
    }

    fn apply(&self, candidates: Vec<Candidate>, context: &RankingContext) -> Result<Vec<Candidate>> {
        let excluded = &context.constraints.exclude;
        Ok(candidates
            .into_iter()
            .filter(|candidate| match self.data_index.get_movie(candidate.movie_id) {
                Some(movie) => movie.genres.is_disjoint(excluded),
                None => false,
            })
            .collect())
    }
}

/// Keeps only candidates sharing at least one genre with the include set.
///
/// With no include set every candidate passes; with an empty one nothing
/// does.
pub struct IncludedGenreFilter {
    data_index: Arc<DataIndex>,
}

impl IncludedGenreFilter {
    pub fn new(data_index: Arc<DataIndex>) -> Self {
        Self { data_index }
    }
}

impl Filter for IncludedGenreFilter {
    fn name(&self) -> &str {
        "IncludedGenreFilter"
    }

    fn apply(&self, candidates: Vec<Candidate>, context: &RankingContext) -> Result<Vec<Candidate>> {
        let Some(included) = &context.constraints.include else {
            return Ok(candidates);
        };
        Ok(candidates
            .into_iter()
            .filter(|candidate| {
                self.data_index
                    .get_movie(candidate.movie_id)
                    .is_some_and(|movie| !movie.genres.is_disjoint(included))
            })
            .collect())
    }
}
