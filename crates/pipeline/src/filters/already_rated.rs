//! Filters on the user's own history.

use crate::traits::{Filter, RankingContext};
use crate::types::Candidate;
use anyhow::Result;

/// Removes candidates the user has already rated.
pub struct AlreadyRatedFilter;

impl Filter for AlreadyRatedFilter {
    fn name(&self) -> &str {
        "AlreadyRatedFilter"
    }

    fn apply(&self, candidates: Vec<Candidate>, context: &RankingContext) -> Result<Vec<Candidate>> {
        Ok(candidates
            .into_iter()
            .filter(|candidate| !context.rated.contains(&candidate.movie_id))
            .collect())
    }
}

/// Removes candidates the user explicitly disliked.
pub struct DislikedFilter;

impl Filter for DislikedFilter {
    fn name(&self) -> &str {
        "DislikedFilter"
    }

    fn apply(&self, candidates: Vec<Candidate>, context: &RankingContext) -> Result<Vec<Candidate>> {
        if context.disliked.is_empty() {
            return Ok(candidates);
        }
        Ok(candidates
            .into_iter()
            .filter(|candidate| !context.disliked.contains(&candidate.movie_id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EffectiveConstraints;

    #[test]
    fn test_already_rated_filter() {
        let context = RankingContext::new(1, EffectiveConstraints::default()).with_rated([100, 200]);

        let candidates = vec![
            Candidate::new(100),
            Candidate::new(101),
            Candidate::new(200),
            Candidate::new(300),
        ];

        let filtered = AlreadyRatedFilter.apply(candidates, &context).unwrap();
        let ids: Vec<u32> = filtered.iter().map(|c| c.movie_id).collect();
        assert_eq!(ids, vec![101, 300]);
    }

    #[test]
    fn test_disliked_filter() {
        let context = RankingContext::new(1, EffectiveConstraints::default()).with_disliked([7]);
        let filtered = DislikedFilter
            .apply(vec![Candidate::new(7), Candidate::new(8)], &context)
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].movie_id, 8);
    }
}
