//! # Sources Crate
//!
//! The scoring signals the fusion stage draws candidates and scores from.
//!
//! ## Components
//!
//! ### Content Index
//! TF-IDF vectors over title words, genres and user tags:
//! - "Because you liked X" item-item neighbors
//! - Free-text lookup against the same vocabulary
//!
//! ### Interaction Matrix
//! Collaborative filtering over the rating matrix:
//! - user-user neighbors (shrunk Pearson or cosine)
//! - item-item neighbors (shrunk adjusted cosine)
//! - neighbor-weighted rating prediction with evidence
//!
//! ### Latent Model
//! Alternating least squares factorization, versioned against the
//! interaction snapshot it was trained from.
//!
//! ### Popularity Ranking
//! Quality-score ordering of the whole catalog, used as a signal and as the
//! cold-start fallback.
//!
//! ## Example Usage
//!
//! ```ignore
//! use sources::{ContentIndex, ContentConfig, InteractionMatrix, CollaborativeConfig};
//! use data_loader::DataIndex;
//!
//! let data_index = DataIndex::load_from_dir("data/ml-latest-small".as_ref())?;
//!
//! let content = ContentIndex::build(&data_index, &ContentConfig::default());
//! let matrix = InteractionMatrix::build(&data_index, &CollaborativeConfig::default(), 1);
//!
//! let similar = content.neighbors(1, 10);
//! let neighbors = matrix.user_neighbors(1, 10);
//! ```

// Public modules
pub mod collaborative;
pub mod content;
pub mod latent;
pub mod popularity;
pub mod types;

// Re-export commonly used types
pub use collaborative::{
    CollaborativeConfig, CollaborativeEvidence, CollaborativePrediction, InteractionMatrix,
    SimilarityMetric,
};
pub use content::{ContentConfig, ContentIndex};
pub use latent::{LatentConfig, LatentModel};
pub use popularity::PopularityRanking;
pub use types::{Neighbor, SignalKind};
