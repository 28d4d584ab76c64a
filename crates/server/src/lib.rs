//! Server crate for the ReelRecs recommendation engine.
//!
//! This crate owns the serving side: versioned snapshots and their offline
//! rebuild, the result cache, configuration, and the `RecommendationEngine`
//! that ties the sources, profiles and ranking pipeline together.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod rebuild;
pub mod snapshot;

pub use cache::{CacheStats, Fingerprint, ResultCache};
pub use config::EngineConfig;
pub use engine::RecommendationEngine;
pub use error::{EngineError, Result};
pub use snapshot::{Snapshot, SnapshotHandle};
