//! Engine configuration.
//!
//! Every section has working defaults, so an empty file (or no file) is a
//! valid configuration. Values are layered: defaults, then an optional TOML
//! file, then `REELRECS_*` environment variables using `__` between nested
//! keys, e.g. `REELRECS_FUSION__WEIGHTS__CONTENT=0.5`.

use crate::error::{EngineError, Result};
use pipeline::DecayConfig;
use profile::{FusionWeights, ProfileConfig};
use serde::{Deserialize, Serialize};
use sources::{CollaborativeConfig, ContentConfig, LatentConfig};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub similarity: SimilarityConfig,
    pub latent: LatentConfig,
    pub fusion: FusionConfig,
    pub decay: DecayConfig,
    pub profile: ProfileConfig,
    pub cache: CacheConfig,
    pub rebuild: RebuildConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    pub content: ContentConfig,
    pub collaborative: CollaborativeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Weights for users without their own override
    pub weights: FusionWeights,
    /// Share of the content signal taken from learned genre affinity
    pub affinity_blend: f32,
    /// Ratings at or above this count as "liked" when picking seed items
    pub seed_min_rating: f32,
    /// Most recent liked items used as content seeds
    pub max_seeds: usize,
    /// Content neighbors pulled per seed item
    pub neighbors_per_seed: usize,
    /// Candidates pulled from collaborative neighbors
    pub collaborative_candidates: usize,
    /// Candidates pulled from the latent model
    pub latent_candidates: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            weights: FusionWeights::default(),
            affinity_blend: 0.2,
            seed_min_rating: 4.0,
            max_seeds: 20,
            neighbors_per_seed: 30,
            collaborative_candidates: 200,
            latent_candidates: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_entries: 10_000,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RebuildConfig {
    /// Extra attempts after a failed rebuild
    pub max_retries: u32,
    /// Period of the scheduled rebuild loop
    pub interval_secs: u64,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            interval_secs: 600,
        }
    }
}

impl RebuildConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl EngineConfig {
    /// Layer an optional TOML file and `REELRECS_*` environment variables
    /// over the defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("REELRECS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| EngineError::Config(e.to_string()))?;
        let config: EngineConfig = settings
            .try_deserialize()
            .map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.fusion
            .weights
            .validate()
            .map_err(|e| EngineError::Config(e.to_string()))?;

        let invalid = |reason: &str| Err(EngineError::Config(reason.to_string()));
        if !(0.0..=1.0).contains(&self.fusion.affinity_blend) {
            return invalid("fusion.affinity_blend must lie in [0, 1]");
        }
        if self.latent.rank == 0 {
            return invalid("latent.rank must be positive");
        }
        if !self.latent.regularization.is_finite() || self.latent.regularization < 0.0 {
            return invalid("latent.regularization must be non-negative");
        }
        if self.similarity.collaborative.shrinkage < 0.0 {
            return invalid("similarity.collaborative.shrinkage must be non-negative");
        }
        if self.profile.half_life_days <= 0.0 {
            return invalid("profile.half_life_days must be positive");
        }
        if self.decay.release_half_life_years <= 0.0 {
            return invalid("decay.release_half_life_years must be positive");
        }
        if self.decay.count_prior < 0.0 {
            return invalid("decay.count_prior must be non-negative");
        }
        if !(0.0..=1.0).contains(&self.decay.floor) {
            return invalid("decay.floor must lie in [0, 1]");
        }
        if self.cache.max_entries == 0 {
            return invalid("cache.max_entries must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fusion.weights.content, 0.4);
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.rebuild.max_retries, 3);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[fusion.weights]\ncontent = 0.7\ncollaborative = 0.1\nlatent = 0.2\n\n[latent]\nrank = 8\n"
        )
        .unwrap();

        let config = EngineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.fusion.weights.content, 0.7);
        assert_eq!(config.fusion.weights.popularity, 0.0);
        assert_eq!(config.latent.rank, 8);
        assert_eq!(config.latent.iterations, 12);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = EngineConfig::default();
        config.decay.floor = 1.5;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.latent.rank = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.fusion.weights.latent = -1.0;
        assert!(config.validate().is_err());
    }
}
