//! Engine error kinds.

use data_loader::DataLoadError;
use profile::ProfileError;
use thiserror::Error;

/// Errors surfaced by the recommendation engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// User or movie id not present in the catalog
    #[error("Unknown {entity} with id {id}")]
    UnknownEntity { entity: &'static str, id: u32 },

    /// The latent model has not been trained
    #[error("Latent model unavailable")]
    ModelUnavailable,

    /// An offline rebuild failed partway and was discarded
    #[error("Inconsistent snapshot: {0}")]
    InconsistentSnapshot(String),

    /// Malformed query or preference input
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Data error: {0}")]
    Data(#[from] DataLoadError),

    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
