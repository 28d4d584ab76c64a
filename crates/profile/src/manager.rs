//! Profile Manager - concurrent owner of every user's profile.
//!
//! Profiles live in a `DashMap`, so mutations for different users proceed in
//! parallel while mutations for the same user are serialized by the shard
//! lock held for the duration of the update.

use crate::error::{ProfileError, Result};
use crate::types::{InteractionRecord, PreferenceDelta, UserProfile};
use dashmap::DashMap;
use data_loader::{Genre, Rating, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Tuning for profile updates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Half-life of the implicit genre affinity, in days
    pub half_life_days: f64,
    /// Ratings remembered per profile between rebuilds
    pub max_recent_interactions: usize,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            half_life_days: 30.0,
            max_recent_interactions: 100,
        }
    }
}

pub struct ProfileManager {
    profiles: DashMap<UserId, UserProfile>,
    config: ProfileConfig,
}

impl ProfileManager {
    pub fn new(config: ProfileConfig) -> Self {
        Self {
            profiles: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &ProfileConfig {
        &self.config
    }

    /// Current profile, or an empty default for unknown users
    pub fn get_profile(&self, user_id: UserId) -> UserProfile {
        self.profiles
            .get(&user_id)
            .map(|p| p.value().clone())
            .unwrap_or_else(|| UserProfile::new(user_id))
    }

    /// Profile version; 0 for users without a stored profile
    pub fn version(&self, user_id: UserId) -> u64 {
        self.profiles.get(&user_id).map(|p| p.version).unwrap_or(0)
    }

    /// Apply one preference event and return the new profile version
    #[instrument(skip(self, delta))]
    pub fn apply_preference_delta(&self, user_id: UserId, delta: &PreferenceDelta) -> Result<u64> {
        self.apply_preference_deltas(user_id, std::slice::from_ref(delta))
    }

    /// Apply a batch of events atomically with respect to other writers of
    /// the same user. If any event is invalid none of them is applied.
    pub fn apply_preference_deltas(&self, user_id: UserId, deltas: &[PreferenceDelta]) -> Result<u64> {
        let mut entry = self
            .profiles
            .entry(user_id)
            .or_insert_with(|| UserProfile::new(user_id));

        let mut updated = entry.value().clone();
        for delta in deltas {
            updated.apply(delta)?;
        }
        updated.version += 1;
        updated.updated_at = Some(chrono::Utc::now().timestamp());

        let version = updated.version;
        *entry.value_mut() = updated;
        debug!(user_id, version, count = deltas.len(), "Applied preference deltas");
        Ok(version)
    }

    /// Fold a new rating into the user's profile and return the new version
    pub fn record_interaction(&self, rating: &Rating, genres: &BTreeSet<Genre>) -> u64 {
        let half_life_secs = self.config.half_life_days * SECONDS_PER_DAY;
        let mut entry = self
            .profiles
            .entry(rating.user_id)
            .or_insert_with(|| UserProfile::new(rating.user_id));
        let profile = entry.value_mut();

        profile.learn_from_rating(rating.rating, rating.timestamp, genres, half_life_secs);
        profile.push_interaction(
            InteractionRecord {
                movie_id: rating.movie_id,
                rating: rating.rating,
                timestamp: rating.timestamp,
            },
            self.config.max_recent_interactions,
        );
        profile.version += 1;
        profile.updated_at = Some(chrono::Utc::now().timestamp());
        profile.version
    }

    /// Reset a user's profile to the empty default
    pub fn clear(&self, user_id: UserId) -> u64 {
        // Clear never fails validation
        self.apply_preference_delta(user_id, &PreferenceDelta::Clear)
            .unwrap_or_else(|_| self.version(user_id))
    }

    pub fn summary(&self, user_id: UserId) -> String {
        self.get_profile(user_id).summary()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Write every profile as `<user_id>.json` under `dir`
    pub fn save_to_dir(&self, dir: &Path) -> Result<usize> {
        fs::create_dir_all(dir)?;
        let mut written = 0;
        for entry in self.profiles.iter() {
            let path = dir.join(format!("{}.json", entry.key()));
            let json = serde_json::to_string_pretty(entry.value()).map_err(|source| {
                ProfileError::Serde {
                    path: path.clone(),
                    source,
                }
            })?;
            fs::write(&path, json)?;
            written += 1;
        }
        info!("Saved {} profiles to {:?}", written, dir);
        Ok(written)
    }

    /// Load every `*.json` profile under `dir`, replacing in-memory copies
    ///
    /// A missing directory loads nothing.
    pub fn load_from_dir(&self, dir: &Path) -> Result<usize> {
        if !dir.exists() {
            return Ok(0);
        }
        let mut loaded = 0;
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let text = fs::read_to_string(&path)?;
            let profile: UserProfile = serde_json::from_str(&text)
                .map_err(|source| ProfileError::Serde {
                    path: path.clone(),
                    source,
                })?;
            if profile.include_genres.intersection(&profile.exclude_genres).next().is_some() {
                warn!(
                    user_id = profile.user_id,
                    "Profile has genres both included and excluded; exclusion applies"
                );
            }
            self.profiles.insert(profile.user_id, profile);
            loaded += 1;
        }
        info!("Loaded {} profiles from {:?}", loaded, dir);
        Ok(loaded)
    }
}

impl Default for ProfileManager {
    fn default() -> Self {
        Self::new(ProfileConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FusionWeights;

    fn rating(user_id: UserId, movie_id: u32, value: f32, timestamp: i64) -> Rating {
        Rating {
            user_id,
            movie_id,
            rating: value,
            timestamp,
        }
    }

    #[test]
    fn test_unknown_user_gets_default() {
        let manager = ProfileManager::default();
        let profile = manager.get_profile(42);
        assert!(profile.is_empty());
        assert_eq!(profile.version, 0);
        assert!(profile.weight_overrides.is_none());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_versions_increase() {
        let manager = ProfileManager::default();
        let v1 = manager
            .apply_preference_delta(1, &PreferenceDelta::ExcludeGenre { genre: Genre::Horror })
            .unwrap();
        let v2 = manager.record_interaction(&rating(1, 10, 5.0, 100), &[Genre::Comedy].into());
        let v3 = manager.clear(1);
        assert!(v1 < v2 && v2 < v3);
        assert!(manager.get_profile(1).is_empty());
    }

    #[test]
    fn test_failed_batch_leaves_profile_untouched() {
        let manager = ProfileManager::default();
        manager
            .apply_preference_delta(1, &PreferenceDelta::IncludeGenre { genre: Genre::Drama })
            .unwrap();
        let before = manager.get_profile(1);

        let bad = FusionWeights {
            latent: f32::NAN,
            ..Default::default()
        };
        let result = manager.apply_preference_deltas(
            1,
            &[
                PreferenceDelta::ExcludeGenre { genre: Genre::Drama },
                PreferenceDelta::SetWeights { weights: bad },
            ],
        );
        assert!(result.is_err());
        assert_eq!(manager.get_profile(1), before);
    }

    #[test]
    fn test_record_interaction_tracks_recent() {
        let manager = ProfileManager::new(ProfileConfig {
            max_recent_interactions: 2,
            ..Default::default()
        });
        for movie_id in 1..=3 {
            manager.record_interaction(&rating(5, movie_id, 4.0, movie_id as i64), &BTreeSet::new());
        }
        let profile = manager.get_profile(5);
        let ids: Vec<u32> = profile.recent_interactions.iter().map(|r| r.movie_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_concurrent_updates_for_different_users() {
        let manager = std::sync::Arc::new(ProfileManager::default());
        let handles: Vec<_> = (0..8)
            .map(|user_id| {
                let manager = manager.clone();
                std::thread::spawn(move || {
                    for movie_id in 0..50 {
                        manager.record_interaction(
                            &rating(user_id, movie_id, 4.0, movie_id as i64),
                            &[Genre::Action].into(),
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        for user_id in 0..8 {
            assert_eq!(manager.version(user_id), 50);
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ProfileManager::default();
        manager
            .apply_preference_delta(3, &PreferenceDelta::ExcludeGenre { genre: Genre::Horror })
            .unwrap();
        manager.record_interaction(&rating(3, 1, 5.0, 10), &[Genre::Comedy].into());
        assert_eq!(manager.save_to_dir(dir.path()).unwrap(), 1);

        let restored = ProfileManager::default();
        assert_eq!(restored.load_from_dir(dir.path()).unwrap(), 1);
        assert_eq!(restored.get_profile(3), manager.get_profile(3));
        assert_eq!(restored.load_from_dir(&dir.path().join("missing")).unwrap(), 0);
    }
}
