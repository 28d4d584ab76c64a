//! Interaction Matrix - Collaborative Filtering Neighbors
//!
//! Sparse user x item rating matrix with precomputed user-user and item-item
//! neighbor lists.
//!
//! ## Similarity
//! - user-user: Pearson correlation over co-rated items (ratings centered on
//!   each user's mean) or plain cosine, selectable by configuration
//! - item-item: adjusted cosine (ratings centered on the rating user's mean)
//!
//! Both are shrunk toward zero by `n / (n + shrinkage)` where `n` is the
//! number of co-rated items (or co-rating users), so two users who happen to
//! agree on a single movie do not look like perfect neighbors.
//!
//! ## Prediction
//! `mean(u) + sum(sim(u,v) * (r(v,i) - mean(v))) / sum(|sim(u,v)|)` over
//! neighbor users `v` who rated `i`. When none of them did, the item's
//! interaction neighbors among the user's own ratings are used instead.

use crate::types::{Neighbor, top_k_neighbors};
use data_loader::{DataIndex, MAX_RATING, MIN_RATING, MovieId, UserId};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument};

/// User-user similarity measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    #[default]
    Pearson,
    Cosine,
}

/// Tuning for the interaction neighbor index
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaborativeConfig {
    /// Neighbors precomputed per user and per item
    pub top_k: usize,
    /// Co-rating count at which similarity is shrunk by half
    pub shrinkage: f32,
    pub metric: SimilarityMetric,
    /// Neighbor ratings at or above their own mean count as "liked"
    pub min_neighbor_rating_delta: f32,
}

impl Default for CollaborativeConfig {
    fn default() -> Self {
        Self {
            top_k: 30,
            shrinkage: 10.0,
            metric: SimilarityMetric::Pearson,
            min_neighbor_rating_delta: 0.0,
        }
    }
}

/// What drove a collaborative prediction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CollaborativeEvidence {
    /// A similar user rated the item
    NeighborUser { user_id: UserId, similarity: f32 },
    /// The item resembles something the user rated
    NeighborItem { movie_id: MovieId, similarity: f32 },
}

/// Predicted rating with its strongest supporting neighbor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollaborativePrediction {
    pub rating: f32,
    pub evidence: CollaborativeEvidence,
}

/// Running sums for one pair of rows
#[derive(Default, Clone, Copy)]
struct PairStats {
    dot: f32,
    norm_a: f32,
    norm_b: f32,
    count: u32,
}

impl PairStats {
    fn add(&mut self, a: f32, b: f32) {
        self.dot += a * b;
        self.norm_a += a * a;
        self.norm_b += b * b;
        self.count += 1;
    }

    fn shrunk_similarity(&self, shrinkage: f32) -> f32 {
        let denom = (self.norm_a * self.norm_b).sqrt();
        if denom <= f32::EPSILON {
            return 0.0;
        }
        let n = self.count as f32;
        (self.dot / denom) * (n / (n + shrinkage))
    }
}

/// Published, read-only rating matrix with neighbor lists
#[derive(Debug, Clone)]
pub struct InteractionMatrix {
    version: u64,
    /// user -> (movie, rating), sorted by movie
    rows: HashMap<UserId, Vec<(MovieId, f32)>>,
    /// movie -> (user, rating), sorted by user
    columns: HashMap<MovieId, Vec<(UserId, f32)>>,
    user_means: HashMap<UserId, f32>,
    user_neighbors: HashMap<UserId, Vec<Neighbor>>,
    item_neighbors: HashMap<MovieId, Vec<Neighbor>>,
    config: CollaborativeConfig,
}

impl InteractionMatrix {
    /// Snapshot the ratings in `data_index` and precompute neighbor lists
    ///
    /// `version` tags the snapshot; models trained from it must carry a
    /// version no greater than this.
    #[instrument(skip(data_index, config))]
    pub fn build(data_index: &DataIndex, config: &CollaborativeConfig, version: u64) -> Self {
        let user_ids = data_index.get_all_user_ids();

        let rows: HashMap<UserId, Vec<(MovieId, f32)>> = user_ids
            .par_iter()
            .map(|&user_id| {
                let mut row: Vec<(MovieId, f32)> = data_index
                    .get_user_ratings(user_id)
                    .iter()
                    .map(|r| (r.movie_id, r.rating))
                    .collect();
                row.sort_unstable_by_key(|&(movie_id, _)| movie_id);
                (user_id, row)
            })
            .collect();

        let mut columns: HashMap<MovieId, Vec<(UserId, f32)>> = HashMap::new();
        for &user_id in &user_ids {
            for &(movie_id, rating) in &rows[&user_id] {
                columns.entry(movie_id).or_default().push((user_id, rating));
            }
        }

        let user_means = rows
            .iter()
            .map(|(&user_id, row)| {
                let mean = row.iter().map(|(_, r)| r).sum::<f32>() / row.len().max(1) as f32;
                (user_id, mean)
            })
            .collect();

        let mut matrix = Self {
            version,
            rows,
            columns,
            user_means,
            user_neighbors: HashMap::new(),
            item_neighbors: HashMap::new(),
            config: config.clone(),
        };

        let user_neighbors: HashMap<UserId, Vec<Neighbor>> = user_ids
            .par_iter()
            .map(|&user_id| (user_id, matrix.compute_user_neighbors(user_id, config.top_k)))
            .collect();

        let mut item_ids: Vec<MovieId> = matrix.columns.keys().copied().collect();
        item_ids.sort_unstable();
        let item_neighbors: HashMap<MovieId, Vec<Neighbor>> = item_ids
            .par_iter()
            .map(|&movie_id| (movie_id, matrix.compute_item_neighbors(movie_id, config.top_k)))
            .collect();

        matrix.user_neighbors = user_neighbors;
        matrix.item_neighbors = item_neighbors;

        info!(
            "Interaction matrix v{} built: {} users, {} items, {} ratings",
            version,
            matrix.rows.len(),
            matrix.columns.len(),
            matrix.rating_count()
        );
        matrix
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn config(&self) -> &CollaborativeConfig {
        &self.config
    }

    /// Number of stored (user, item) entries
    pub fn rating_count(&self) -> usize {
        self.rows.values().map(|row| row.len()).sum()
    }

    pub fn user_count(&self) -> usize {
        self.rows.len()
    }

    /// Users in ascending id order
    pub fn user_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.rows.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Items with at least one rating, ascending id order
    pub fn item_ids(&self) -> Vec<MovieId> {
        let mut ids: Vec<MovieId> = self.columns.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// A user's ratings, sorted by movie id
    pub fn row(&self, user_id: UserId) -> &[(MovieId, f32)] {
        self.rows.get(&user_id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn rating(&self, user_id: UserId, movie_id: MovieId) -> Option<f32> {
        let row = self.row(user_id);
        row.binary_search_by_key(&movie_id, |&(id, _)| id)
            .ok()
            .map(|pos| row[pos].1)
    }

    pub fn user_mean(&self, user_id: UserId) -> Option<f32> {
        self.user_means.get(&user_id).copied()
    }

    /// Up to `k` most similar users, descending similarity then ascending id
    pub fn user_neighbors(&self, user_id: UserId, k: usize) -> Vec<Neighbor> {
        if k <= self.config.top_k {
            return self
                .user_neighbors
                .get(&user_id)
                .map(|list| list.iter().take(k).copied().collect())
                .unwrap_or_default();
        }
        debug!(user_id, k, "Recomputing user neighbors beyond precomputed depth");
        self.compute_user_neighbors(user_id, k)
    }

    /// Up to `k` items with the most similar rating patterns
    pub fn item_neighbors(&self, movie_id: MovieId, k: usize) -> Vec<Neighbor> {
        if k <= self.config.top_k {
            return self
                .item_neighbors
                .get(&movie_id)
                .map(|list| list.iter().take(k).copied().collect())
                .unwrap_or_default();
        }
        debug!(movie_id, k, "Recomputing item neighbors beyond precomputed depth");
        self.compute_item_neighbors(movie_id, k)
    }

    /// Items that the user's neighbors liked and the user has not rated
    ///
    /// Ranked by summed neighbor similarity, ties by ascending id.
    pub fn neighbor_candidates(
        &self,
        user_id: UserId,
        exclude: &HashSet<MovieId>,
        limit: usize,
    ) -> Vec<MovieId> {
        let mut votes: HashMap<MovieId, f32> = HashMap::new();
        for neighbor in self.user_neighbors.get(&user_id).into_iter().flatten() {
            let mean = self.user_means.get(&neighbor.id).copied().unwrap_or(0.0);
            for &(movie_id, rating) in self.row(neighbor.id) {
                if rating - mean >= self.config.min_neighbor_rating_delta
                    && self.rating(user_id, movie_id).is_none()
                    && !exclude.contains(&movie_id)
                {
                    *votes.entry(movie_id).or_insert(0.0) += neighbor.similarity;
                }
            }
        }
        top_k_neighbors(votes, limit)
            .into_iter()
            .map(|n| n.id)
            .collect()
    }

    /// Predict a user's rating of an item from its neighbors
    ///
    /// `None` when the user is absent from this snapshot or no neighbor
    /// evidence exists for the item.
    pub fn predict(&self, user_id: UserId, movie_id: MovieId) -> Option<CollaborativePrediction> {
        let user_mean = self.user_mean(user_id)?;
        self.predict_from_users(user_id, user_mean, movie_id)
            .or_else(|| self.predict_from_items(user_id, user_mean, movie_id))
    }

    fn predict_from_users(
        &self,
        user_id: UserId,
        user_mean: f32,
        movie_id: MovieId,
    ) -> Option<CollaborativePrediction> {
        let mut weighted = 0.0;
        let mut total = 0.0;
        let mut strongest: Option<Neighbor> = None;

        for neighbor in self.user_neighbors.get(&user_id)? {
            let Some(rating) = self.rating(neighbor.id, movie_id) else {
                continue;
            };
            let mean = self.user_means.get(&neighbor.id).copied().unwrap_or(rating);
            weighted += neighbor.similarity * (rating - mean);
            total += neighbor.similarity.abs();
            // Lists are in descending order, so the first hit is the strongest
            strongest.get_or_insert(*neighbor);
        }

        let strongest = strongest?;
        if total <= f32::EPSILON {
            return None;
        }
        Some(CollaborativePrediction {
            rating: (user_mean + weighted / total).clamp(MIN_RATING, MAX_RATING),
            evidence: CollaborativeEvidence::NeighborUser {
                user_id: strongest.id,
                similarity: strongest.similarity,
            },
        })
    }

    fn predict_from_items(
        &self,
        user_id: UserId,
        user_mean: f32,
        movie_id: MovieId,
    ) -> Option<CollaborativePrediction> {
        let mut weighted = 0.0;
        let mut total = 0.0;
        let mut strongest: Option<Neighbor> = None;

        for neighbor in self.item_neighbors.get(&movie_id)? {
            let Some(rating) = self.rating(user_id, neighbor.id) else {
                continue;
            };
            weighted += neighbor.similarity * (rating - user_mean);
            total += neighbor.similarity.abs();
            strongest.get_or_insert(*neighbor);
        }

        let strongest = strongest?;
        if total <= f32::EPSILON {
            return None;
        }
        Some(CollaborativePrediction {
            rating: (user_mean + weighted / total).clamp(MIN_RATING, MAX_RATING),
            evidence: CollaborativeEvidence::NeighborItem {
                movie_id: strongest.id,
                similarity: strongest.similarity,
            },
        })
    }

    fn compute_user_neighbors(&self, user_id: UserId, k: usize) -> Vec<Neighbor> {
        let Some(row) = self.rows.get(&user_id) else {
            return Vec::new();
        };
        let center = self.config.metric == SimilarityMetric::Pearson;
        let own_mean = if center { self.user_means[&user_id] } else { 0.0 };

        let mut pairs: HashMap<UserId, PairStats> = HashMap::new();
        for &(movie_id, rating) in row {
            for &(other, other_rating) in &self.columns[&movie_id] {
                if other == user_id {
                    continue;
                }
                let other_mean = if center { self.user_means[&other] } else { 0.0 };
                pairs
                    .entry(other)
                    .or_default()
                    .add(rating - own_mean, other_rating - other_mean);
            }
        }

        let shrinkage = self.config.shrinkage;
        top_k_neighbors(
            pairs
                .into_iter()
                .map(|(other, stats)| (other, stats.shrunk_similarity(shrinkage))),
            k,
        )
    }

    fn compute_item_neighbors(&self, movie_id: MovieId, k: usize) -> Vec<Neighbor> {
        let Some(column) = self.columns.get(&movie_id) else {
            return Vec::new();
        };

        let mut pairs: HashMap<MovieId, PairStats> = HashMap::new();
        for &(user_id, rating) in column {
            let mean = self.user_means[&user_id];
            for &(other, other_rating) in &self.rows[&user_id] {
                if other == movie_id {
                    continue;
                }
                pairs
                    .entry(other)
                    .or_default()
                    .add(rating - mean, other_rating - mean);
            }
        }

        let shrinkage = self.config.shrinkage;
        top_k_neighbors(
            pairs
                .into_iter()
                .map(|(other, stats)| (other, stats.shrunk_similarity(shrinkage))),
            k,
        )
    }
}
