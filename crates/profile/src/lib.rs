//! # Profile Crate
//!
//! Durable per-user preference state for the recommendation engine.
//!
//! ## Components
//!
//! - **types**: `UserProfile`, `PreferenceDelta` events, `FusionWeights`
//! - **manager**: `ProfileManager`, the concurrent owner of all profiles,
//!   with JSON persistence
//!
//! Declared preferences (genre includes/excludes, liked and disliked movies,
//! weight overrides) arrive as structured `PreferenceDelta` events. Learned
//! preferences come from ratings and decay exponentially with a configurable
//! half-life.
//!
//! ## Example Usage
//!
//! ```ignore
//! use profile::{ProfileManager, PreferenceDelta};
//! use data_loader::Genre;
//!
//! let manager = ProfileManager::default();
//! manager.apply_preference_delta(1, &PreferenceDelta::ExcludeGenre { genre: Genre::Horror })?;
//!
//! let profile = manager.get_profile(1);
//! assert!(profile.is_excluded(Genre::Horror));
//! ```

pub mod error;
pub mod manager;
pub mod types;

pub use error::{ProfileError, Result};
pub use manager::{ProfileConfig, ProfileManager};
pub use types::{decay_factor, FusionWeights, InteractionRecord, PreferenceDelta, UserProfile};
