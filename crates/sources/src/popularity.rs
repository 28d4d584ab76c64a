//! Popularity ranking - the catalog ordered by quality score.
//!
//! This is the fallback ranking for users with no usable signal, and the
//! source of the popularity score during fusion.

use data_loader::{DataIndex, MovieId, MovieStats};
use std::collections::HashMap;
use tracing::debug;

/// Every catalog movie, best first
#[derive(Debug, Clone, Default)]
pub struct PopularityRanking {
    ranked: Vec<MovieId>,
    stats: HashMap<MovieId, MovieStats>,
}

impl PopularityRanking {
    /// Order by quality score desc, rating count desc, then movie id asc
    pub fn build(data_index: &DataIndex) -> Self {
        let mut entries: Vec<(MovieId, MovieStats)> = data_index
            .get_all_movie_ids()
            .into_iter()
            .map(|id| {
                let stats = data_index
                    .get_movie_stats(id)
                    .copied()
                    .unwrap_or(MovieStats::UNRATED);
                (id, stats)
            })
            .collect();

        entries.sort_by(|(id_a, a), (id_b, b)| {
            b.quality_score
                .total_cmp(&a.quality_score)
                .then_with(|| b.rating_count.cmp(&a.rating_count))
                .then_with(|| id_a.cmp(id_b))
        });

        debug!("Popularity ranking built over {} movies", entries.len());
        Self {
            ranked: entries.iter().map(|(id, _)| *id).collect(),
            stats: entries.into_iter().collect(),
        }
    }

    /// Movie ids, best first
    pub fn ranked(&self) -> &[MovieId] {
        &self.ranked
    }

    /// Quality score in [0, 1]; `None` for movies outside the catalog
    pub fn quality(&self, movie_id: MovieId) -> Option<f32> {
        self.stats.get(&movie_id).map(|s| s.quality_score)
    }

    pub fn rating_count(&self, movie_id: MovieId) -> u32 {
        self.stats.get(&movie_id).map(|s| s.rating_count).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }
}
