//! Latent Factor Model
//!
//! Low-rank factorization of the interaction matrix trained with alternating
//! least squares. Each half-step fixes one side and solves, per row,
//!
//! ```text
//! (Vᵀ V + λ n I) x = Vᵀ r
//! ```
//!
//! with a Cholesky decomposition, where `n` is the row's rating count
//! (weighted-λ regularization). Rows are solved in parallel and independently,
//! so a fixed snapshot and seed always produce the same factors.

use crate::collaborative::InteractionMatrix;
use anyhow::{Context, Result, anyhow, bail};
use data_loader::{MAX_RATING, MIN_RATING, MovieId, UserId};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument};

/// Hyperparameters for ALS training
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LatentConfig {
    /// Embedding dimension shared by user and item factors
    pub rank: usize,
    /// L2 regularization strength
    pub regularization: f64,
    pub iterations: usize,
    /// Seed for factor initialization
    pub seed: u64,
}

impl Default for LatentConfig {
    fn default() -> Self {
        Self {
            rank: 16,
            regularization: 0.1,
            iterations: 12,
            seed: 42,
        }
    }
}

/// Trained user and item embeddings for one interaction snapshot
#[derive(Debug, Clone)]
pub struct LatentModel {
    version: u64,
    matrix_version: u64,
    user_index: HashMap<UserId, usize>,
    item_index: HashMap<MovieId, usize>,
    item_ids: Vec<MovieId>,
    /// users x rank
    user_factors: DMatrix<f64>,
    /// items x rank
    item_factors: DMatrix<f64>,
    /// Training ratings per user as (item row, rating)
    user_items: Vec<Vec<(usize, f64)>>,
    train_rmse: f64,
}

impl LatentModel {
    /// Train a model against a published interaction snapshot
    ///
    /// Fails if the snapshot is empty, if `version` is newer than the
    /// snapshot, or if the solve produces non-finite factors.
    #[instrument(skip(matrix, config), fields(matrix_version = matrix.version()))]
    pub fn train(matrix: &InteractionMatrix, config: &LatentConfig, version: u64) -> Result<Self> {
        if version > matrix.version() {
            bail!(
                "model version {} is newer than interaction snapshot {}",
                version,
                matrix.version()
            );
        }
        if config.rank == 0 {
            bail!("latent rank must be positive");
        }

        let user_ids = matrix.user_ids();
        let item_ids = matrix.item_ids();
        if user_ids.is_empty() || item_ids.is_empty() {
            bail!("interaction snapshot {} has no ratings", matrix.version());
        }

        let user_index: HashMap<UserId, usize> =
            user_ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let item_index: HashMap<MovieId, usize> =
            item_ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        let user_items: Vec<Vec<(usize, f64)>> = user_ids
            .iter()
            .map(|&user_id| {
                matrix
                    .row(user_id)
                    .iter()
                    .filter_map(|&(movie_id, rating)| {
                        item_index.get(&movie_id).map(|&j| (j, rating as f64))
                    })
                    .collect()
            })
            .collect();

        let mut item_users: Vec<Vec<(usize, f64)>> = vec![Vec::new(); item_ids.len()];
        for (u, entries) in user_items.iter().enumerate() {
            for &(j, rating) in entries {
                item_users[j].push((u, rating));
            }
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let scale = 1.0 / (config.rank as f64).sqrt();
        let mut user_factors =
            DMatrix::from_fn(user_ids.len(), config.rank, |_, _| rng.random_range(0.0..scale));
        let mut item_factors =
            DMatrix::from_fn(item_ids.len(), config.rank, |_, _| rng.random_range(0.0..scale));

        for iteration in 0..config.iterations {
            user_factors = solve_side(&user_items, &item_factors, config)
                .with_context(|| format!("user half-step of iteration {}", iteration))?;
            item_factors = solve_side(&item_users, &user_factors, config)
                .with_context(|| format!("item half-step of iteration {}", iteration))?;

            debug!(
                iteration,
                rmse = rmse(&user_items, &user_factors, &item_factors),
                "ALS iteration complete"
            );
        }

        if !user_factors.iter().chain(item_factors.iter()).all(|x| x.is_finite()) {
            bail!("ALS produced non-finite factors");
        }

        let train_rmse = rmse(&user_items, &user_factors, &item_factors);
        info!(
            "Latent model v{} trained: {} users, {} items, rank {}, rmse {:.4}",
            version,
            user_ids.len(),
            item_ids.len(),
            config.rank,
            train_rmse
        );

        Ok(Self {
            version,
            matrix_version: matrix.version(),
            user_index,
            item_index,
            item_ids,
            user_factors,
            item_factors,
            user_items,
            train_rmse,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Version of the interaction snapshot this model was trained on
    pub fn matrix_version(&self) -> u64 {
        self.matrix_version
    }

    pub fn rank(&self) -> usize {
        self.user_factors.ncols()
    }

    /// Root mean squared error on the training ratings
    pub fn train_rmse(&self) -> f64 {
        self.train_rmse
    }

    pub fn knows_user(&self, user_id: UserId) -> bool {
        self.user_index.contains_key(&user_id)
    }

    /// Predicted rating, clamped to the rating scale
    ///
    /// `None` when either id was absent from the training snapshot. That is
    /// "no estimate", not a low score.
    pub fn predict(&self, user_id: UserId, movie_id: MovieId) -> Option<f32> {
        let u = *self.user_index.get(&user_id)?;
        let j = *self.item_index.get(&movie_id)?;
        Some(self.score(u, j))
    }

    /// Best `k` items the user has not rated in the training snapshot
    ///
    /// Ordered by predicted rating descending, then ascending movie id.
    pub fn top_candidates(&self, user_id: UserId, k: usize) -> Vec<(MovieId, f32)> {
        let Some(&u) = self.user_index.get(&user_id) else {
            return Vec::new();
        };
        let rated: HashSet<usize> = self.user_items[u].iter().map(|&(j, _)| j).collect();

        let mut scored: Vec<(MovieId, f32)> = (0..self.item_ids.len())
            .filter(|j| !rated.contains(j))
            .map(|j| (self.item_ids[j], self.score(u, j)))
            .collect();
        scored.sort_unstable_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);
        scored
    }

    fn score(&self, u: usize, j: usize) -> f32 {
        let dot = self.user_factors.row(u).dot(&self.item_factors.row(j));
        (dot as f32).clamp(MIN_RATING, MAX_RATING)
    }
}

/// Solve every row of one side against the fixed factors of the other
fn solve_side(
    rows: &[Vec<(usize, f64)>],
    fixed: &DMatrix<f64>,
    config: &LatentConfig,
) -> Result<DMatrix<f64>> {
    let rank = config.rank;
    let solved: Vec<DVector<f64>> = rows
        .par_iter()
        .enumerate()
        .map(|(row, entries)| {
            let lambda = config.regularization * entries.len().max(1) as f64;
            let mut gram = DMatrix::<f64>::identity(rank, rank) * lambda;
            let mut rhs = DVector::<f64>::zeros(rank);
            for &(j, rating) in entries {
                let v = fixed.row(j).transpose();
                gram += &v * v.transpose();
                rhs += &v * rating;
            }
            gram.cholesky()
                .map(|chol| chol.solve(&rhs))
                .ok_or_else(|| anyhow!("normal equations for row {} are not positive definite", row))
        })
        .collect::<Result<_>>()?;

    Ok(DMatrix::from_fn(rows.len(), rank, |i, c| solved[i][c]))
}

fn rmse(user_items: &[Vec<(usize, f64)>], users: &DMatrix<f64>, items: &DMatrix<f64>) -> f64 {
    let (sum, count) = user_items
        .iter()
        .enumerate()
        .flat_map(|(u, entries)| entries.iter().map(move |&(j, r)| (u, j, r)))
        .fold((0.0, 0usize), |(sum, count), (u, j, r)| {
            let err = users.row(u).dot(&items.row(j)) - r;
            (sum + err * err, count + 1)
        });
    if count == 0 {
        0.0
    } else {
        (sum / count as f64).sqrt()
    }
}
