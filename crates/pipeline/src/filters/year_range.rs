//! Release-year constraint.

use crate::traits::{Filter, RankingContext};
use crate::types::Candidate;
use anyhow::Result;
use data_loader::DataIndex;
use std::sync::Arc;

/// Keeps candidates released inside the inclusive year range.
///
/// When a range is set, movies with an unknown year are removed.
pub struct YearRangeFilter {
    data_index: Arc<DataIndex>,
}

impl YearRangeFilter {
    pub fn new(data_index: Arc<DataIndex>) -> Self {
        Self { data_index }
    }
}

impl Filter for YearRangeFilter {
    fn name(&self) -> &str {
        "YearRangeFilter"
    }

    fn apply(&self, candidates: Vec<Candidate>, context: &RankingContext) -> Result<Vec<Candidate>> {
        let Some((from, to)) = context.constraints.year_range else {
            return Ok(candidates);
        };
        Ok(candidates
            .into_iter()
            .filter(|candidate| {
                self.data_index
                    .get_movie(candidate.movie_id)
                    .and_then(|movie| movie.year)
                    .is_some_and(|year| (from..=to).contains(&year))
            })
            .collect())
    }
}
