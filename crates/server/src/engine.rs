//! # Recommendation Engine
//!
//! Serves queries against the current snapshot and routes writes to the
//! catalog store and the profile manager.
//!
//! ## Query path
//! 1. Validate the query and resolve the user's profile
//! 2. Return a cached result if the fingerprint matches
//! 3. Gather candidates from content neighbors of liked items,
//!    collaborative neighbors and the latent model, in parallel
//! 4. Score every available signal per candidate (absent signals stay absent)
//! 5. Fuse, apply decay, filter by hard constraints, rank
//! 6. Fall back to the popularity ranking when nothing survives
//!
//! ## Write path
//! Interactions, movies and tags go to the append-only store and become
//! visible to the indexes at the next rebuild. Seeds and the already-rated
//! filter read the user's history from the live store, so a new rating
//! counts immediately and survives a profile reset. Every write that can
//! change a user's results invalidates that user's cache entries before it
//! returns.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use tracing::{debug, error, info, instrument, warn};

use data_loader::{DataIndex, DataLoadError, Movie, MovieId, Rating, Tag, UserId, validate_rating_value};
use pipeline::{
    Candidate, EffectiveConstraints, Explanation, Ranker, RankingContext, RecommendationQuery,
    RecommendationResult, content_score,
};
use profile::{FusionWeights, PreferenceDelta, ProfileError, ProfileManager, UserProfile};
use sources::{CollaborativeEvidence, Neighbor};

use crate::cache::{CacheStats, Fingerprint, ResultCache};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::rebuild::{initial_snapshot, rebuild_and_publish};
use crate::snapshot::{Snapshot, SnapshotHandle};

pub struct RecommendationEngine {
    config: EngineConfig,
    /// Append-only catalog; snapshots are built from copies of it
    store: RwLock<DataIndex>,
    snapshots: SnapshotHandle,
    profiles: ProfileManager,
    cache: ResultCache,
    ranker: Ranker,
    /// Held for the duration of a rebuild so only one runs at a time
    rebuild_lock: Mutex<()>,
}

impl RecommendationEngine {
    /// Build the first snapshot from `catalog` and start serving
    pub fn new(mut catalog: DataIndex, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        catalog.compute_movie_stats();

        let start = Instant::now();
        let snapshot = initial_snapshot(Arc::new(catalog.clone()), &config)?;
        info!("Initial snapshot ready in {:.2?}", start.elapsed());

        Ok(Self {
            store: RwLock::new(catalog),
            snapshots: SnapshotHandle::new(snapshot),
            profiles: ProfileManager::new(config.profile.clone()),
            cache: ResultCache::new(config.cache.ttl(), config.cache.max_entries),
            ranker: Ranker::new(config.decay.clone()),
            rebuild_lock: Mutex::new(()),
            config,
        })
    }

    /// Load a MovieLens directory and start serving
    pub fn from_dir(data_dir: &Path, config: EngineConfig) -> Result<Self> {
        let catalog = DataIndex::load_from_dir(data_dir)?;
        Self::new(catalog, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Query API
    // ------------------------------------------------------------------

    /// Ranked, explained recommendations for one query
    ///
    /// Only malformed queries are rejected; every other problem degrades to
    /// the popularity fallback.
    #[instrument(skip(self, query), fields(user_id = query.user_id, count = query.count))]
    pub fn recommend(&self, query: &RecommendationQuery) -> Result<RecommendationResult> {
        query
            .validate()
            .map_err(|e| EngineError::InvalidQuery(e.to_string()))?;

        let snapshot = self.snapshots.current();
        let profile = self.profiles.get_profile(query.user_id);
        check_against_profile(query, &profile)?;
        let fingerprint = Fingerprint::new(
            query,
            profile.version,
            snapshot.version,
            snapshot.model_version(),
        );

        if let Some(hit) = self.cache.get(&fingerprint) {
            debug!("Cache hit");
            return Ok(hit);
        }

        let result = self.compute(&snapshot, &profile, query);
        self.cache.put(fingerprint, result.clone());
        Ok(result)
    }

    /// Same as `recommend` but never reads or fills the cache
    pub fn recommend_uncached(&self, query: &RecommendationQuery) -> Result<RecommendationResult> {
        query
            .validate()
            .map_err(|e| EngineError::InvalidQuery(e.to_string()))?;
        let snapshot = self.snapshots.current();
        let profile = self.profiles.get_profile(query.user_id);
        check_against_profile(query, &profile)?;
        Ok(self.compute(&snapshot, &profile, query))
    }

    /// Run `recommend` on the blocking pool
    pub async fn recommend_async(
        self: &Arc<Self>,
        query: RecommendationQuery,
    ) -> anyhow::Result<RecommendationResult> {
        let engine = Arc::clone(self);
        let result = tokio::task::spawn_blocking(move || engine.recommend(&query))
            .await
            .context("Recommendation task panicked")??;
        Ok(result)
    }

    fn compute(
        &self,
        snapshot: &Snapshot,
        profile: &UserProfile,
        query: &RecommendationQuery,
    ) -> RecommendationResult {
        let start = Instant::now();
        let user_id = query.user_id;
        let weights = profile.weights_or(self.config.fusion.weights);

        let history = user_history(&self.store.read(), user_id);
        let seeds = self.seed_items(&history, profile);
        let context = RankingContext::new(user_id, query.constraints.resolve(profile))
            .with_rated(history.keys().chain(profile.liked_items.iter()).copied())
            .with_disliked(profile.disliked_items.iter().copied());

        let candidate_ids = self.gather_candidates(snapshot, user_id, &seeds, &context.rated);
        if candidate_ids.is_empty() {
            info!(user_id, "No personalized candidates, using popularity fallback");
            return self.popularity_fallback(snapshot, query, &context, &weights);
        }

        let candidates = self.score_signals(snapshot, profile, &seeds, &context.constraints, &candidate_ids);
        let scored = self.ranker.score(candidates, &weights, &snapshot.catalog);
        let survivors = match snapshot.filters.apply(scored, &context) {
            Ok(survivors) => survivors,
            Err(e) => {
                warn!(user_id, "Filtering failed, using popularity fallback: {:#}", e);
                Vec::new()
            }
        };
        if survivors.is_empty() {
            info!(user_id, "Constraints removed every candidate, using popularity fallback");
            return self.popularity_fallback(snapshot, query, &context, &weights);
        }

        let items = self.ranker.rank(survivors, &weights, query.count);
        info!(
            user_id,
            candidates = candidate_ids.len(),
            returned = items.len(),
            "Served recommendations in {:.2?}",
            start.elapsed()
        );

        RecommendationResult {
            user_id,
            items,
            fallback: false,
            snapshot_version: snapshot.version,
            model_version: snapshot.model_version(),
        }
    }

    /// Liked items to seed content neighbors, explicit likes first, then
    /// highly rated items from most recent
    fn seed_items(&self, history: &HashMap<MovieId, (f32, i64)>, profile: &UserProfile) -> Vec<MovieId> {
        let mut rated: Vec<(MovieId, i64)> = history
            .iter()
            .filter(|(_, (rating, _))| *rating >= self.config.fusion.seed_min_rating)
            .map(|(&movie_id, &(_, timestamp))| (movie_id, timestamp))
            .collect();
        rated.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut seen = HashSet::new();
        profile
            .liked_items
            .iter()
            .copied()
            .chain(rated.into_iter().map(|(movie_id, _)| movie_id))
            .filter(|movie_id| !profile.disliked_items.contains(movie_id))
            .filter(|movie_id| seen.insert(*movie_id))
            .take(self.config.fusion.max_seeds)
            .collect()
    }

    /// Union of candidate ids from every source, in ascending id order
    fn gather_candidates(
        &self,
        snapshot: &Snapshot,
        user_id: UserId,
        seeds: &[MovieId],
        rated: &HashSet<MovieId>,
    ) -> Vec<MovieId> {
        let fusion = &self.config.fusion;
        let (content, (collaborative, latent)) = rayon::join(
            || {
                seeds
                    .iter()
                    .flat_map(|&seed| snapshot.content.neighbors(seed, fusion.neighbors_per_seed))
                    .map(|neighbor| neighbor.id)
                    .collect::<Vec<MovieId>>()
            },
            || {
                rayon::join(
                    || {
                        snapshot
                            .matrix
                            .neighbor_candidates(user_id, rated, fusion.collaborative_candidates)
                    },
                    || {
                        snapshot
                            .latent
                            .as_ref()
                            .map(|model| {
                                model
                                    .top_candidates(user_id, fusion.latent_candidates)
                                    .into_iter()
                                    .map(|(movie_id, _)| movie_id)
                                    .collect::<Vec<MovieId>>()
                            })
                            .unwrap_or_default()
                    },
                )
            },
        );
        debug!(
            content = content.len(),
            collaborative = collaborative.len(),
            latent = latent.len(),
            "Gathered candidates"
        );

        let merged: BTreeSet<MovieId> = content
            .into_iter()
            .chain(collaborative)
            .chain(latent)
            .filter(|&movie_id| snapshot.catalog.get_movie(movie_id).is_some())
            .collect();
        merged.into_iter().collect()
    }

    /// Every available signal and its evidence, per candidate
    fn score_signals(
        &self,
        snapshot: &Snapshot,
        profile: &UserProfile,
        seeds: &[MovieId],
        constraints: &EffectiveConstraints,
        candidate_ids: &[MovieId],
    ) -> Vec<Candidate> {
        let user_id = profile.user_id;
        let affinity_blend = self.config.fusion.affinity_blend;

        candidate_ids
            .par_iter()
            .map(|&movie_id| {
                let mut candidate = Candidate::new(movie_id);
                let movie = snapshot.catalog.get_movie(movie_id);

                // Strongest seed wins; equal similarities go to the lower seed id
                let best_seed = seeds
                    .iter()
                    .filter(|&&seed| seed != movie_id)
                    .filter_map(|&seed| {
                        snapshot
                            .content
                            .similarity(seed, movie_id)
                            .map(|similarity| (seed, similarity))
                    })
                    .filter(|(_, similarity)| *similarity > 0.0)
                    .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(&a.0)));
                if let Some((seed, similarity)) = best_seed {
                    let affinity = movie.and_then(|m| profile.genre_affinity_score(&m.genres));
                    candidate.signals.content = Some(content_score(similarity, affinity, affinity_blend));
                    candidate.evidence.push(Explanation::Content {
                        because_of: seed,
                        similarity,
                    });
                }

                if let Some(prediction) = snapshot.matrix.predict(user_id, movie_id) {
                    candidate.signals.collaborative = Some(prediction.rating);
                    candidate.evidence.push(match prediction.evidence {
                        CollaborativeEvidence::NeighborUser { user_id, similarity } => {
                            Explanation::CollaborativeUser { user_id, similarity }
                        }
                        CollaborativeEvidence::NeighborItem { movie_id, similarity } => {
                            Explanation::CollaborativeItem { movie_id, similarity }
                        }
                    });
                }

                if let Some(model) = &snapshot.latent
                    && let Some(predicted_rating) = model.predict(user_id, movie_id)
                {
                    candidate.signals.latent = Some(predicted_rating);
                    candidate.evidence.push(Explanation::Latent { predicted_rating });
                }

                if let Some(quality_score) = snapshot.popularity.quality(movie_id) {
                    candidate.signals.popularity = Some(quality_score);
                    candidate.evidence.push(Explanation::Popularity {
                        quality_score,
                        rating_count: snapshot.popularity.rating_count(movie_id),
                    });
                }

                if let Some(movie) = movie {
                    push_declared_genres(&mut candidate, movie, constraints);
                }
                candidate
            })
            .collect()
    }

    /// Catalog by quality score, respecting hard constraints
    ///
    /// Never fails: a filter error yields an empty list.
    fn popularity_fallback(
        &self,
        snapshot: &Snapshot,
        query: &RecommendationQuery,
        context: &RankingContext,
        weights: &FusionWeights,
    ) -> RecommendationResult {
        let candidates: Vec<Candidate> = snapshot
            .popularity
            .ranked()
            .iter()
            .map(|&movie_id| {
                let quality_score = snapshot.popularity.quality(movie_id).unwrap_or(0.0);
                let rating_count = snapshot.popularity.rating_count(movie_id);

                let mut candidate = Candidate::new(movie_id);
                candidate.signals.popularity = Some(quality_score);
                candidate.evidence.push(Explanation::Popularity {
                    quality_score,
                    rating_count,
                });
                if let Some(movie) = snapshot.catalog.get_movie(movie_id) {
                    push_declared_genres(&mut candidate, movie, &context.constraints);
                }
                candidate.rating_count = rating_count;
                candidate.fused = quality_score;
                candidate.score = quality_score;
                candidate
            })
            .collect();

        let survivors = snapshot.filters.apply(candidates, context).unwrap_or_else(|e| {
            error!(user_id = query.user_id, "Fallback filtering failed: {:#}", e);
            Vec::new()
        });
        let items = self.ranker.rank(survivors, weights, query.count);

        RecommendationResult {
            user_id: query.user_id,
            items,
            fallback: true,
            snapshot_version: snapshot.version,
            model_version: snapshot.model_version(),
        }
    }

    // ------------------------------------------------------------------
    // Write paths
    // ------------------------------------------------------------------

    /// Append a rating and fold it into the user's profile
    ///
    /// Returns the user's profile version afterwards. A rating older than
    /// the stored one for the same movie is ignored.
    #[instrument(skip(self, rating), fields(user_id = rating.user_id, movie_id = rating.movie_id))]
    pub fn record_interaction(&self, rating: Rating) -> Result<u64> {
        validate_rating_value(rating.rating)?;

        let (accepted, genres) = {
            let mut store = self.store.write();
            let genres = store
                .get_movie(rating.movie_id)
                .map(|movie| movie.genres.clone())
                .ok_or(EngineError::UnknownEntity {
                    entity: "movie",
                    id: rating.movie_id,
                })?;
            let accepted = store.insert_rating(rating);
            if accepted {
                store.refresh_movie_stats(rating.movie_id);
            }
            (accepted, genres)
        };

        if !accepted {
            debug!("Ignored interaction older than the stored rating");
            return Ok(self.profiles.version(rating.user_id));
        }

        let version = self.profiles.record_interaction(&rating, &genres);
        let removed = self.cache.invalidate_user(rating.user_id);
        debug!(version, removed, "Recorded interaction");
        Ok(version)
    }

    /// Apply one structured preference event
    pub fn apply_preference_delta(&self, user_id: UserId, delta: &PreferenceDelta) -> Result<u64> {
        self.apply_preference_deltas(user_id, std::slice::from_ref(delta))
    }

    /// Apply a batch of preference events; all or nothing
    #[instrument(skip(self, deltas), fields(count = deltas.len()))]
    pub fn apply_preference_deltas(&self, user_id: UserId, deltas: &[PreferenceDelta]) -> Result<u64> {
        let version = self
            .profiles
            .apply_preference_deltas(user_id, deltas)
            .map_err(|e| match e {
                ProfileError::InvalidWeights(reason) => EngineError::InvalidQuery(reason),
                other => EngineError::Profile(other),
            })?;
        self.cache.invalidate_user(user_id);
        Ok(version)
    }

    /// Reset a user's preferences
    pub fn clear_preferences(&self, user_id: UserId) -> u64 {
        let version = self.profiles.clear(user_id);
        self.cache.invalidate_user(user_id);
        version
    }

    /// Add a new movie to the catalog; indexed at the next rebuild
    pub fn ingest_movie(&self, movie: Movie) -> Result<()> {
        let mut store = self.store.write();
        if store.get_movie(movie.id).is_some() {
            return Err(EngineError::Data(DataLoadError::InvalidValue {
                field: "movie_id".to_string(),
                value: format!("{} already exists", movie.id),
            }));
        }
        let movie_id = movie.id;
        store.insert_movie(movie);
        store.refresh_movie_stats(movie_id);
        debug!(movie_id, "Ingested movie");
        Ok(())
    }

    /// Attach a free-text tag to a movie; indexed at the next rebuild
    pub fn add_tag(&self, movie_id: MovieId, tag: Tag) -> Result<()> {
        if self.store.write().add_tag(movie_id, tag) {
            Ok(())
        } else {
            Err(EngineError::UnknownEntity {
                entity: "movie",
                id: movie_id,
            })
        }
    }

    // ------------------------------------------------------------------
    // Offline rebuild
    // ------------------------------------------------------------------

    /// Rebuild every index from the current store and publish the result
    ///
    /// On failure the previous snapshot keeps serving.
    pub fn rebuild_now(&self) -> Result<u64> {
        let _guard = self.rebuild_lock.lock();
        let catalog = Arc::new(self.store.read().clone());
        let version = rebuild_and_publish(&self.snapshots, catalog, &self.config)?;
        let removed = self.cache.invalidate(|fingerprint| fingerprint.snapshot_version < version);
        debug!(version, removed, "Dropped results from older snapshots");
        Ok(version)
    }

    /// Rebuild only if the store changed since the current snapshot
    pub fn rebuild_if_stale(&self) -> Result<Option<u64>> {
        if self.store.read().revision() == self.snapshots.current().revision() {
            return Ok(None);
        }
        self.rebuild_now().map(Some)
    }

    /// Rebuild on a fixed period in the background
    pub fn spawn_rebuild_loop(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let engine = Arc::clone(&engine);
                match tokio::task::spawn_blocking(move || engine.rebuild_if_stale()).await {
                    Ok(Ok(Some(version))) => info!(version, "Scheduled rebuild published"),
                    Ok(Ok(None)) => debug!("Catalog unchanged, skipping rebuild"),
                    Ok(Err(e)) => error!("Scheduled rebuild failed: {}", e),
                    Err(e) => error!("Rebuild task panicked: {}", e),
                }
            }
        })
    }

    // ------------------------------------------------------------------
    // Read helpers
    // ------------------------------------------------------------------

    pub fn movie(&self, movie_id: MovieId) -> Option<Movie> {
        self.store.read().get_movie(movie_id).cloned()
    }

    pub fn search_title(&self, query: &str) -> Option<Movie> {
        self.store.read().find_by_title(query).cloned()
    }

    pub fn search_titles(&self, query: &str, limit: usize) -> Vec<Movie> {
        self.store
            .read()
            .search_titles(query, limit)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Content neighbors of a movie in the current snapshot
    pub fn similar_items(&self, movie_id: MovieId, k: usize) -> Vec<Neighbor> {
        self.snapshots.current().content.neighbors(movie_id, k)
    }

    /// Interaction neighbors of a user in the current snapshot
    pub fn similar_users(&self, user_id: UserId, k: usize) -> Vec<Neighbor> {
        self.snapshots.current().matrix.user_neighbors(user_id, k)
    }

    /// Movies matching free text against the content vocabulary
    pub fn search_text(&self, text: &str, k: usize) -> Vec<Neighbor> {
        self.snapshots.current().content.query_text(text, k)
    }

    /// Latent model estimate of a rating
    pub fn predict_rating(&self, user_id: UserId, movie_id: MovieId) -> Result<f32> {
        let snapshot = self.snapshots.current();
        let model = snapshot.latent.as_ref().ok_or(EngineError::ModelUnavailable)?;
        if !model.knows_user(user_id) {
            return Err(EngineError::UnknownEntity {
                entity: "user",
                id: user_id,
            });
        }
        model.predict(user_id, movie_id).ok_or(EngineError::UnknownEntity {
            entity: "movie",
            id: movie_id,
        })
    }

    /// A user's ratings, most recent first
    pub fn user_ratings(&self, user_id: UserId) -> Vec<Rating> {
        let mut ratings = self.store.read().get_user_ratings(user_id).to_vec();
        ratings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.movie_id.cmp(&b.movie_id)));
        ratings
    }

    pub fn profile(&self, user_id: UserId) -> UserProfile {
        self.profiles.get_profile(user_id)
    }

    pub fn profile_summary(&self, user_id: UserId) -> String {
        self.profiles.summary(user_id)
    }

    pub fn save_profiles(&self, dir: &Path) -> Result<usize> {
        Ok(self.profiles.save_to_dir(dir)?)
    }

    /// Load profiles from disk; cached results for every user are dropped
    pub fn load_profiles(&self, dir: &Path) -> Result<usize> {
        let loaded = self.profiles.load_from_dir(dir)?;
        self.cache.clear();
        Ok(loaded)
    }

    pub fn snapshot_version(&self) -> u64 {
        self.snapshots.version()
    }

    pub fn model_version(&self) -> Option<u64> {
        self.snapshots.current().model_version()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// (users, movies, ratings) in the live store
    pub fn counts(&self) -> (usize, usize, usize) {
        self.store.read().counts()
    }
}

/// Latest rating and timestamp per movie, including ratings recorded since
/// the last rebuild
fn user_history(store: &DataIndex, user_id: UserId) -> HashMap<MovieId, (f32, i64)> {
    store
        .get_user_ratings(user_id)
        .iter()
        .map(|r| (r.movie_id, (r.rating, r.timestamp)))
        .collect()
}

fn check_against_profile(query: &RecommendationQuery, profile: &UserProfile) -> Result<()> {
    query
        .constraints
        .validate_against(profile)
        .map_err(|e| EngineError::InvalidQuery(e.to_string()))
}

fn push_declared_genres(candidate: &mut Candidate, movie: &Movie, constraints: &EffectiveConstraints) {
    if let Some(include) = &constraints.include {
        candidate.evidence.extend(
            movie
                .genres
                .intersection(include)
                .map(|&genre| Explanation::DeclaredGenre { genre }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_loader::Genre;
    use pipeline::HardConstraints;

    fn build_test_data_index() -> DataIndex {
        let mut index = DataIndex::new();
        index.insert_movie(Movie::new(1, "The Matrix (1999)", Some(1999), &[Genre::Action, Genre::SciFi]));
        index.insert_movie(Movie::new(2, "Toy Story (1995)", Some(1995), &[Genre::Animation, Genre::Comedy, Genre::Children]));
        index.insert_movie(Movie::new(3, "Pulp Fiction (1994)", Some(1994), &[Genre::Crime, Genre::Drama]));
        index.insert_movie(Movie::new(4, "Forrest Gump (1994)", Some(1994), &[Genre::Drama, Genre::Romance]));
        index.insert_movie(Movie::new(5, "The Matrix Reloaded (2003)", Some(2003), &[Genre::Action, Genre::SciFi]));

        let ratings = [
            (1, 1, 5.0),
            (1, 2, 4.0),
            (1, 3, 5.0),
            (2, 1, 4.5),
            (2, 5, 4.0),
            (2, 4, 2.0),
            (3, 2, 3.0),
            (3, 4, 4.5),
        ];
        for (user_id, movie_id, rating) in ratings {
            index.insert_rating(Rating {
                user_id,
                movie_id,
                rating,
                timestamp: 978_300_760 + movie_id as i64,
            });
        }
        index
    }

    fn engine() -> RecommendationEngine {
        RecommendationEngine::new(build_test_data_index(), EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_recommend_excludes_rated() {
        let engine = engine();
        let result = engine.recommend(&RecommendationQuery::new(1, 10)).unwrap();
        assert!(!result.items.is_empty());
        for item in &result.items {
            assert!(![1, 2, 3].contains(&item.movie_id));
            assert!(!item.explanations.is_empty());
        }
    }

    #[test]
    fn test_invalid_query_rejected() {
        let engine = engine();
        let bad = RecommendationQuery::new(1, 5).with_constraints(
            HardConstraints::default()
                .with_include(Genre::Drama)
                .with_exclude(Genre::Drama),
        );
        assert!(matches!(engine.recommend(&bad), Err(EngineError::InvalidQuery(_))));
        assert!(matches!(
            engine.recommend(&RecommendationQuery::new(1, 0)),
            Err(EngineError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_record_interaction_validation() {
        let engine = engine();
        let unknown = Rating {
            user_id: 1,
            movie_id: 999,
            rating: 4.0,
            timestamp: 1,
        };
        assert!(matches!(
            engine.record_interaction(unknown),
            Err(EngineError::UnknownEntity { entity: "movie", id: 999 })
        ));

        let out_of_range = Rating {
            movie_id: 4,
            rating: 7.0,
            ..unknown
        };
        assert!(matches!(engine.record_interaction(out_of_range), Err(EngineError::Data(_))));
    }

    #[test]
    fn test_predict_rating_errors() {
        let engine = engine();
        assert!(engine.predict_rating(1, 4).is_ok());
        assert!(matches!(
            engine.predict_rating(77, 4),
            Err(EngineError::UnknownEntity { entity: "user", .. })
        ));

        let empty = RecommendationEngine::new(DataIndex::new(), EngineConfig::default()).unwrap();
        assert!(matches!(empty.predict_rating(1, 1), Err(EngineError::ModelUnavailable)));
    }

    #[test]
    fn test_rebuild_if_stale() {
        let engine = engine();
        assert_eq!(engine.rebuild_if_stale().unwrap(), None);

        engine
            .ingest_movie(Movie::new(6, "Heat (1995)", Some(1995), &[Genre::Crime, Genre::Thriller]))
            .unwrap();
        assert!(engine.ingest_movie(Movie::new(6, "Heat (1995)", Some(1995), &[])).is_err());
        assert_eq!(engine.rebuild_if_stale().unwrap(), Some(2));
        assert_eq!(engine.snapshot_version(), 2);
        assert_eq!(engine.model_version(), Some(2));
    }
}
