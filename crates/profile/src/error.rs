//! Error types for the profile crate.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfileError {
    /// Fusion weight override that cannot be normalized
    #[error("Invalid fusion weights: {0}")]
    InvalidWeights(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted profile could not be read or written
    #[error("Malformed profile file {path}: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, ProfileError>;
