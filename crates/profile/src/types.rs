//! Profile state and the preference events that mutate it.

use crate::error::{ProfileError, Result};
use data_loader::{Genre, MovieId, UserId};
use serde::{Deserialize, Serialize};
use sources::SignalKind;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Relative contribution of each scoring signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub content: f32,
    pub collaborative: f32,
    pub latent: f32,
    pub popularity: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            content: 0.4,
            collaborative: 0.3,
            latent: 0.3,
            popularity: 0.0,
        }
    }
}

impl FusionWeights {
    /// Same weight on every signal
    pub fn uniform() -> Self {
        Self {
            content: 0.25,
            collaborative: 0.25,
            latent: 0.25,
            popularity: 0.25,
        }
    }

    pub fn get(&self, kind: SignalKind) -> f32 {
        match kind {
            SignalKind::Content => self.content,
            SignalKind::Collaborative => self.collaborative,
            SignalKind::Latent => self.latent,
            SignalKind::Popularity => self.popularity,
        }
    }

    /// Weights must be finite, non-negative, and not all zero
    pub fn validate(&self) -> Result<()> {
        let all = [self.content, self.collaborative, self.latent, self.popularity];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ProfileError::InvalidWeights(format!(
                "weights must be finite and non-negative: {:?}",
                self
            )));
        }
        if all.iter().sum::<f32>() <= 0.0 {
            return Err(ProfileError::InvalidWeights(
                "at least one weight must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// A rating the profile has seen since the last offline rebuild
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub movie_id: MovieId,
    pub rating: f32,
    pub timestamp: i64,
}

/// Structured preference event, as produced by an upstream language
/// understanding service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PreferenceDelta {
    IncludeGenre { genre: Genre },
    ExcludeGenre { genre: Genre },
    RemoveInclude { genre: Genre },
    RemoveExclude { genre: Genre },
    LikeItem { movie_id: MovieId },
    DislikeItem { movie_id: MovieId },
    SetWeights { weights: FusionWeights },
    ResetWeights,
    /// Drop every declared and learned preference
    Clear,
}

/// Durable preference state for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    /// Bumped on every mutation, including `Clear`
    pub version: u64,
    pub include_genres: BTreeSet<Genre>,
    pub exclude_genres: BTreeSet<Genre>,
    pub liked_items: BTreeSet<MovieId>,
    pub disliked_items: BTreeSet<MovieId>,
    /// Exponentially decayed genre affinity learned from ratings, in [-1, 1] per event
    pub genre_affinity: BTreeMap<Genre, f32>,
    /// Time the affinity vector was last decayed to
    pub affinity_timestamp: Option<i64>,
    pub weight_overrides: Option<FusionWeights>,
    pub recent_interactions: VecDeque<InteractionRecord>,
    /// Unix seconds of the last mutation
    pub updated_at: Option<i64>,
}

impl UserProfile {
    /// Empty profile: no constraints, no learned signal, configured weights
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            version: 0,
            include_genres: BTreeSet::new(),
            exclude_genres: BTreeSet::new(),
            liked_items: BTreeSet::new(),
            disliked_items: BTreeSet::new(),
            genre_affinity: BTreeMap::new(),
            affinity_timestamp: None,
            weight_overrides: None,
            recent_interactions: VecDeque::new(),
            updated_at: None,
        }
    }

    /// True if nothing has been declared or learned
    pub fn is_empty(&self) -> bool {
        self.include_genres.is_empty()
            && self.exclude_genres.is_empty()
            && self.liked_items.is_empty()
            && self.disliked_items.is_empty()
            && self.genre_affinity.is_empty()
            && self.recent_interactions.is_empty()
    }

    /// Included genres with every excluded genre removed
    ///
    /// Exclusion wins whenever both sets name a genre.
    pub fn effective_includes(&self) -> BTreeSet<Genre> {
        self.include_genres
            .difference(&self.exclude_genres)
            .copied()
            .collect()
    }

    pub fn is_excluded(&self, genre: Genre) -> bool {
        self.exclude_genres.contains(&genre)
    }

    /// Fusion weights to use for this user
    pub fn weights_or(&self, default: FusionWeights) -> FusionWeights {
        self.weight_overrides.unwrap_or(default)
    }

    /// Apply one preference event. Include and exclude sets stay disjoint:
    /// the later write removes the genre from the other set.
    pub fn apply(&mut self, delta: &PreferenceDelta) -> Result<()> {
        match delta {
            PreferenceDelta::IncludeGenre { genre } => {
                self.exclude_genres.remove(genre);
                self.include_genres.insert(*genre);
            }
            PreferenceDelta::ExcludeGenre { genre } => {
                self.include_genres.remove(genre);
                self.exclude_genres.insert(*genre);
            }
            PreferenceDelta::RemoveInclude { genre } => {
                self.include_genres.remove(genre);
            }
            PreferenceDelta::RemoveExclude { genre } => {
                self.exclude_genres.remove(genre);
            }
            PreferenceDelta::LikeItem { movie_id } => {
                self.disliked_items.remove(movie_id);
                self.liked_items.insert(*movie_id);
            }
            PreferenceDelta::DislikeItem { movie_id } => {
                self.liked_items.remove(movie_id);
                self.disliked_items.insert(*movie_id);
            }
            PreferenceDelta::SetWeights { weights } => {
                weights.validate()?;
                self.weight_overrides = Some(*weights);
            }
            PreferenceDelta::ResetWeights => {
                self.weight_overrides = None;
            }
            PreferenceDelta::Clear => {
                let version = self.version;
                *self = UserProfile::new(self.user_id);
                self.version = version;
            }
        }
        Ok(())
    }

    /// Fold a rating into the decayed genre affinity vector
    ///
    /// The vector is first decayed to the event time, then the centered
    /// rating (`(r - 3) / 2`, so 5 stars is +1 and 1 star is -1) is added to
    /// each of the movie's genres. An event older than the vector's timestamp
    /// is decayed by its own age instead.
    pub fn learn_from_rating(
        &mut self,
        rating: f32,
        timestamp: i64,
        genres: &BTreeSet<Genre>,
        half_life_secs: f64,
    ) {
        let signal = (rating - 3.0) / 2.0;
        let weight = match self.affinity_timestamp {
            Some(last) if timestamp < last => decay_factor((last - timestamp) as f64, half_life_secs),
            Some(last) => {
                let factor = decay_factor((timestamp - last) as f64, half_life_secs);
                for value in self.genre_affinity.values_mut() {
                    *value *= factor;
                }
                self.affinity_timestamp = Some(timestamp);
                1.0
            }
            None => {
                self.affinity_timestamp = Some(timestamp);
                1.0
            }
        };

        for genre in genres {
            *self.genre_affinity.entry(*genre).or_insert(0.0) += signal * weight;
        }
    }

    /// Remember a rating, keeping at most `capacity` most recent records and
    /// one record per movie
    pub fn push_interaction(&mut self, record: InteractionRecord, capacity: usize) {
        self.recent_interactions.retain(|r| r.movie_id != record.movie_id);
        self.recent_interactions.push_back(record);
        while self.recent_interactions.len() > capacity {
            self.recent_interactions.pop_front();
        }
    }

    /// Affinity scaled into [0, 1] for one movie's genres
    ///
    /// Mean of the genres' affinities mapped through `(x / max|x| + 1) / 2`;
    /// `None` when nothing has been learned.
    pub fn genre_affinity_score(&self, genres: &BTreeSet<Genre>) -> Option<f32> {
        let max = self
            .genre_affinity
            .values()
            .fold(0.0_f32, |acc, v| acc.max(v.abs()));
        if max <= f32::EPSILON || genres.is_empty() {
            return None;
        }
        let sum: f32 = genres
            .iter()
            .map(|g| self.genre_affinity.get(g).copied().unwrap_or(0.0) / max)
            .sum();
        Some(((sum / genres.len() as f32) + 1.0) / 2.0)
    }

    /// Genres with positive affinity, strongest first
    pub fn top_genres(&self, n: usize) -> Vec<(Genre, f32)> {
        let mut genres: Vec<(Genre, f32)> = self
            .genre_affinity
            .iter()
            .filter(|(_, v)| **v > 0.0)
            .map(|(g, v)| (*g, *v))
            .collect();
        genres.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        genres.truncate(n);
        genres
    }

    /// Human-readable description of declared and learned preferences
    pub fn summary(&self) -> String {
        fn join(genres: &BTreeSet<Genre>) -> String {
            genres
                .iter()
                .map(|g| g.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        }

        let mut parts = Vec::new();
        let includes = self.effective_includes();
        if !includes.is_empty() {
            parts.push(format!("Favorite genres: {}", join(&includes)));
        }
        if !self.exclude_genres.is_empty() {
            parts.push(format!("Excluded genres: {}", join(&self.exclude_genres)));
        }
        if !self.liked_items.is_empty() || !self.disliked_items.is_empty() {
            parts.push(format!(
                "Liked movies: {}, disliked movies: {}",
                self.liked_items.len(),
                self.disliked_items.len()
            ));
        }
        let top = self.top_genres(3);
        if !top.is_empty() {
            let learned: Vec<String> = top
                .iter()
                .map(|(g, v)| format!("{} ({:.2})", g, v))
                .collect();
            parts.push(format!("Learned taste: {}", learned.join(", ")));
        }
        if let Some(weights) = self.weight_overrides {
            parts.push(format!(
                "Signal weights: content {:.2}, collaborative {:.2}, latent {:.2}, popularity {:.2}",
                weights.content, weights.collaborative, weights.latent, weights.popularity
            ));
        }

        if parts.is_empty() {
            "No preferences recorded yet.".to_string()
        } else {
            parts.join("\n")
        }
    }
}

/// `0.5 ^ (elapsed / half_life)`; 1.0 for a non-positive half-life
pub fn decay_factor(elapsed_secs: f64, half_life_secs: f64) -> f32 {
    if half_life_secs <= 0.0 || elapsed_secs <= 0.0 {
        return 1.0;
    }
    0.5_f64.powf(elapsed_secs / half_life_secs) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: f64 = 86_400.0;

    fn genres(list: &[Genre]) -> BTreeSet<Genre> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_include_exclude_last_write_wins() {
        let mut profile = UserProfile::new(1);
        profile.apply(&PreferenceDelta::IncludeGenre { genre: Genre::Horror }).unwrap();
        profile.apply(&PreferenceDelta::ExcludeGenre { genre: Genre::Horror }).unwrap();
        assert!(profile.include_genres.is_empty());
        assert!(profile.is_excluded(Genre::Horror));

        profile.apply(&PreferenceDelta::IncludeGenre { genre: Genre::Horror }).unwrap();
        assert!(profile.exclude_genres.is_empty());
        assert_eq!(profile.effective_includes(), genres(&[Genre::Horror]));
    }

    #[test]
    fn test_exclusion_wins_at_read_time() {
        // A conflicting state loaded from disk still resolves to exclusion
        let mut profile = UserProfile::new(1);
        profile.include_genres.insert(Genre::Comedy);
        profile.exclude_genres.insert(Genre::Comedy);
        assert!(profile.effective_includes().is_empty());
        assert!(profile.is_excluded(Genre::Comedy));
    }

    #[test]
    fn test_like_dislike_toggle() {
        let mut profile = UserProfile::new(1);
        profile.apply(&PreferenceDelta::LikeItem { movie_id: 7 }).unwrap();
        profile.apply(&PreferenceDelta::DislikeItem { movie_id: 7 }).unwrap();
        assert!(profile.liked_items.is_empty());
        assert!(profile.disliked_items.contains(&7));
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let mut profile = UserProfile::new(1);
        let weights = FusionWeights {
            content: -1.0,
            ..Default::default()
        };
        assert!(profile.apply(&PreferenceDelta::SetWeights { weights }).is_err());
        let zero = FusionWeights {
            content: 0.0,
            collaborative: 0.0,
            latent: 0.0,
            popularity: 0.0,
        };
        assert!(profile.apply(&PreferenceDelta::SetWeights { weights: zero }).is_err());
        assert!(profile.weight_overrides.is_none());
    }

    #[test]
    fn test_decay_prefers_recent_ratings() {
        let half_life = 30.0 * DAY;
        let mut profile = UserProfile::new(1);
        // Loved comedy long ago, loved drama recently
        profile.learn_from_rating(5.0, 0, &genres(&[Genre::Comedy]), half_life);
        profile.learn_from_rating(5.0, (90.0 * DAY) as i64, &genres(&[Genre::Drama]), half_life);

        let comedy = profile.genre_affinity[&Genre::Comedy];
        let drama = profile.genre_affinity[&Genre::Drama];
        assert!((comedy - 0.125).abs() < 1e-4);
        assert!((drama - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_order_rating_is_decayed() {
        let half_life = 30.0 * DAY;
        let mut profile = UserProfile::new(1);
        profile.learn_from_rating(5.0, (30.0 * DAY) as i64, &genres(&[Genre::Drama]), half_life);
        profile.learn_from_rating(5.0, 0, &genres(&[Genre::Comedy]), half_life);

        assert!((profile.genre_affinity[&Genre::Comedy] - 0.5).abs() < 1e-4);
        assert_eq!(profile.affinity_timestamp, Some((30.0 * DAY) as i64));
    }

    #[test]
    fn test_recent_interactions_bounded() {
        let mut profile = UserProfile::new(1);
        for movie_id in 0..10 {
            profile.push_interaction(
                InteractionRecord {
                    movie_id,
                    rating: 4.0,
                    timestamp: movie_id as i64,
                },
                5,
            );
        }
        // Re-rating moves the movie to the back without duplicating it
        profile.push_interaction(
            InteractionRecord {
                movie_id: 7,
                rating: 2.0,
                timestamp: 20,
            },
            5,
        );
        let ids: Vec<MovieId> = profile.recent_interactions.iter().map(|r| r.movie_id).collect();
        assert_eq!(ids, vec![5, 6, 8, 9, 7]);
    }

    #[test]
    fn test_affinity_score_range() {
        let mut profile = UserProfile::new(1);
        assert!(profile.genre_affinity_score(&genres(&[Genre::Comedy])).is_none());

        profile.learn_from_rating(5.0, 0, &genres(&[Genre::Comedy]), DAY);
        profile.learn_from_rating(1.0, 0, &genres(&[Genre::Horror]), DAY);

        assert_eq!(profile.genre_affinity_score(&genres(&[Genre::Comedy])), Some(1.0));
        assert_eq!(profile.genre_affinity_score(&genres(&[Genre::Horror])), Some(0.0));
        assert_eq!(profile.genre_affinity_score(&genres(&[Genre::War])), Some(0.5));
    }

    #[test]
    fn test_summary() {
        let mut profile = UserProfile::new(1);
        assert_eq!(profile.summary(), "No preferences recorded yet.");
        profile.apply(&PreferenceDelta::IncludeGenre { genre: Genre::SciFi }).unwrap();
        profile.apply(&PreferenceDelta::ExcludeGenre { genre: Genre::Horror }).unwrap();
        let summary = profile.summary();
        assert!(summary.contains("Favorite genres: Sci-Fi"));
        assert!(summary.contains("Excluded genres: Horror"));
    }

    #[test]
    fn test_delta_json_shape() {
        let delta: PreferenceDelta =
            serde_json::from_str(r#"{"op":"exclude_genre","genre":"Horror"}"#).unwrap();
        assert_eq!(delta, PreferenceDelta::ExcludeGenre { genre: Genre::Horror });
        let clear: PreferenceDelta = serde_json::from_str(r#"{"op":"clear"}"#).unwrap();
        assert_eq!(clear, PreferenceDelta::Clear);
    }
}
