//! Score fusion and the popularity/recency decay multiplier.
//!
//! ## Fusion
//! Each present signal is mapped to [0, 1]:
//! - content: cosine similarity, already in [0, 1]
//! - collaborative, latent: predicted rating, `(r - 0.5) / 4.5`
//! - popularity: quality score, already in [0, 1]
//!
//! and combined with the user's fusion weights renormalized over the signals
//! actually present for that candidate. If every present signal has weight
//! zero the present signals are averaged instead.
//!
//! ## Decay
//! `multiplier = recency * volume`, each factor in `[floor, 1]`:
//! - `recency = floor + (1 - floor) * 0.5 ^ (age_years / half_life_years)`
//! - `volume  = floor + (1 - floor) * count / (count + prior)`
//!
//! Movies with an unknown release year are treated as one half-life old.

use crate::types::SignalScores;
use data_loader::{MAX_RATING, MIN_RATING};
use profile::FusionWeights;
use serde::{Deserialize, Serialize};
use sources::SignalKind;

/// Tuning for the decay multiplier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    /// Years after release at which the recency factor is halfway to the floor
    pub release_half_life_years: f32,
    /// Rating count at which the volume factor is halfway to 1
    pub count_prior: f32,
    /// Lowest value either factor can reach
    pub floor: f32,
    /// Year ages are measured from; the current year when unset
    pub reference_year: Option<u16>,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            release_half_life_years: 25.0,
            count_prior: 10.0,
            floor: 0.5,
            reference_year: None,
        }
    }
}

impl DecayConfig {
    /// Configured reference year, or this calendar year
    pub fn reference_year(&self) -> u16 {
        use chrono::Datelike;
        self.reference_year
            .unwrap_or_else(|| chrono::Utc::now().year().clamp(0, u16::MAX as i32) as u16)
    }
}

/// Map a raw signal value onto [0, 1]
pub fn normalize_signal(kind: SignalKind, raw: f32) -> f32 {
    let value = match kind {
        SignalKind::Content | SignalKind::Popularity => raw,
        SignalKind::Collaborative | SignalKind::Latent => {
            (raw - MIN_RATING) / (MAX_RATING - MIN_RATING)
        }
    };
    if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 }
}

/// Weights over the present signals, summing to 1
///
/// Empty when no signal is present.
pub fn effective_weights(signals: &SignalScores, weights: &FusionWeights) -> Vec<(SignalKind, f32)> {
    let present: Vec<SignalKind> = signals.present().map(|(kind, _)| kind).collect();
    if present.is_empty() {
        return Vec::new();
    }
    let total: f32 = present.iter().map(|&kind| weights.get(kind).max(0.0)).sum();
    if total <= f32::EPSILON {
        let equal = 1.0 / present.len() as f32;
        return present.into_iter().map(|kind| (kind, equal)).collect();
    }
    present
        .into_iter()
        .map(|kind| (kind, weights.get(kind).max(0.0) / total))
        .collect()
}

/// Fused score in [0, 1], or `None` if no signal is present
pub fn fuse(signals: &SignalScores, weights: &FusionWeights) -> Option<f32> {
    let effective = effective_weights(signals, weights);
    if effective.is_empty() {
        return None;
    }
    Some(
        effective
            .iter()
            .filter_map(|&(kind, w)| signals.get(kind).map(|raw| w * normalize_signal(kind, raw)))
            .sum(),
    )
}

/// Content signal from seed similarity, blended with genre affinity when
/// the profile has learned one
pub fn content_score(similarity: f32, affinity: Option<f32>, affinity_blend: f32) -> f32 {
    let blend = affinity_blend.clamp(0.0, 1.0);
    match affinity {
        Some(affinity) => (1.0 - blend) * similarity + blend * affinity,
        None => similarity,
    }
}

/// Popularity/recency multiplier, always in `[floor², 1]`
pub fn decay_multiplier(
    year: Option<u16>,
    rating_count: u32,
    config: &DecayConfig,
    reference_year: u16,
) -> f32 {
    let floor = config.floor.clamp(0.0, 1.0);

    let recency = if config.release_half_life_years > 0.0 {
        let age = match year {
            Some(year) => reference_year.saturating_sub(year) as f32,
            None => config.release_half_life_years,
        };
        floor + (1.0 - floor) * 0.5_f32.powf(age / config.release_half_life_years)
    } else {
        1.0
    };

    let volume = if config.count_prior > 0.0 {
        let count = rating_count as f32;
        floor + (1.0 - floor) * count / (count + config.count_prior)
    } else {
        1.0
    };

    recency * volume
}
