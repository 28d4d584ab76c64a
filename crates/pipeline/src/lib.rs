//! Fusion & Ranking: turns per-signal candidate scores into a ranked,
//! explained recommendation list.
//!
//! This crate provides:
//! - Query types, hard constraints and their merge with a user profile
//! - `Filter` trait and hard-constraint filters
//! - `FilterPipeline` for composing filters
//! - Score fusion with per-candidate weight renormalization
//! - The popularity/recency decay multiplier
//! - `Ranker` for deterministic ordering and explanation assembly
//!
//! ## Architecture
//! Candidates are processed in stages:
//! 1. Signals are gathered per candidate by the caller (missing ones stay `None`)
//! 2. `Ranker::score` fuses signals and applies decay
//! 3. `FilterPipeline` removes everything the hard constraints forbid
//! 4. `Ranker::rank` sorts, truncates and orders explanations
//!
//! ## Example Usage
//! ```ignore
//! use pipeline::filters::*;
//! use pipeline::{FilterPipeline, Ranker, RankingContext};
//!
//! let pipeline = FilterPipeline::new()
//!     .add_filter(AlreadyRatedFilter)
//!     .add_filter(ExcludedGenreFilter::new(index.clone()))
//!     .add_filter(IncludedGenreFilter::new(index.clone()))
//!     .add_filter(YearRangeFilter::new(index.clone()));
//!
//! let ranker = Ranker::default();
//! let scored = ranker.score(candidates, &weights, &index);
//! let survivors = pipeline.apply(scored, &context)?;
//! let items = ranker.rank(survivors, &weights, 10);
//! ```

pub mod filter_pipeline;
pub mod filters;
pub mod fusion;
pub mod ranking;
pub mod traits;
pub mod types;

// Re-export main types
pub use filter_pipeline::FilterPipeline;
pub use fusion::{DecayConfig, content_score, decay_multiplier, effective_weights, fuse, normalize_signal};
pub use ranking::{Ranker, order_explanations, ranking_order};
pub use traits::{Filter, RankingContext};
pub use types::{
    Candidate, EffectiveConstraints, Explanation, HardConstraints, RecommendationQuery,
    RecommendationResult, RecommendedItem, SignalScores,
};
