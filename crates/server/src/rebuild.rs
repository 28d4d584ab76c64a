//! Offline rebuild of serving snapshots.
//!
//! A rebuild runs as a single writer: it copies the catalog, derives every
//! index from that copy, checks the result, and only then publishes it. A
//! failed attempt is discarded and retried; if every attempt fails the
//! previously published snapshot stays authoritative.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::snapshot::{Snapshot, SnapshotHandle};
use data_loader::DataIndex;
use sources::{ContentIndex, InteractionMatrix, LatentConfig, LatentModel, PopularityRanking};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Build one snapshot from a catalog copy
///
/// `attempt` perturbs the latent model seed so a retry does not repeat a
/// numerically unlucky initialization.
#[instrument(skip(catalog, config))]
pub fn build_snapshot(
    catalog: Arc<DataIndex>,
    config: &EngineConfig,
    version: u64,
    attempt: u32,
) -> Result<Snapshot> {
    let start = Instant::now();

    let (content, popularity, matrix) = build_indexes(&catalog, config, version);

    let latent = if matrix.rating_count() == 0 {
        warn!(version, "No ratings in snapshot, latent model unavailable");
        None
    } else {
        let latent_config = LatentConfig {
            seed: config.latent.seed.wrapping_add(attempt as u64),
            ..config.latent.clone()
        };
        let model = LatentModel::train(&matrix, &latent_config, version)
            .map_err(|e| EngineError::InconsistentSnapshot(format!("latent training failed: {e:#}")))?;
        Some(model)
    };

    let filters = Snapshot::filters_for(&catalog);
    let snapshot = Snapshot {
        version,
        catalog,
        content,
        matrix,
        latent,
        popularity,
        filters,
    };
    check_consistency(&snapshot)?;

    info!(
        version,
        movies = snapshot.content.len(),
        ratings = snapshot.matrix.rating_count(),
        model = ?snapshot.model_version(),
        "Built snapshot in {:.2?}",
        start.elapsed()
    );
    Ok(snapshot)
}

/// Structural invariants a snapshot must satisfy before publication
pub fn check_consistency(snapshot: &Snapshot) -> Result<()> {
    let (_, movies, _) = snapshot.catalog.counts();
    if snapshot.content.len() != movies {
        return Err(EngineError::InconsistentSnapshot(format!(
            "content index covers {} of {} movies",
            snapshot.content.len(),
            movies
        )));
    }
    if snapshot.popularity.len() != movies {
        return Err(EngineError::InconsistentSnapshot(format!(
            "popularity ranking covers {} of {} movies",
            snapshot.popularity.len(),
            movies
        )));
    }
    if snapshot.matrix.version() != snapshot.version {
        return Err(EngineError::InconsistentSnapshot(format!(
            "matrix version {} differs from snapshot version {}",
            snapshot.matrix.version(),
            snapshot.version
        )));
    }
    if let Some(model) = &snapshot.latent
        && (model.version() > model.matrix_version()
            || model.matrix_version() != snapshot.matrix.version())
    {
        return Err(EngineError::InconsistentSnapshot(format!(
            "latent model {} trained on matrix {} does not fit matrix {}",
            model.version(),
            model.matrix_version(),
            snapshot.matrix.version()
        )));
    }
    Ok(())
}

/// Build with up to `rebuild.max_retries` extra attempts
pub fn build_with_retry(catalog: Arc<DataIndex>, config: &EngineConfig, version: u64) -> Result<Snapshot> {
    let attempts = config.rebuild.max_retries + 1;
    let mut last_error = None;
    for attempt in 0..attempts {
        match build_snapshot(catalog.clone(), config, version, attempt) {
            Ok(snapshot) => return Ok(snapshot),
            Err(e) => {
                warn!(version, attempt = attempt + 1, attempts, "Snapshot build failed: {}", e);
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| {
        EngineError::InconsistentSnapshot(format!("snapshot {} was never attempted", version))
    }))
}

/// First snapshot for a freshly started engine
///
/// Serving must start even if the latent model cannot be trained, so after
/// exhausting retries this publishes a snapshot without one.
pub fn initial_snapshot(catalog: Arc<DataIndex>, config: &EngineConfig) -> Result<Snapshot> {
    match build_with_retry(catalog.clone(), config, 1) {
        Ok(snapshot) => Ok(snapshot),
        Err(e) => {
            error!("Initial snapshot build failed, serving without latent model: {}", e);
            let (content, popularity, matrix) = build_indexes(&catalog, config, 1);
            let snapshot = Snapshot {
                version: 1,
                filters: Snapshot::filters_for(&catalog),
                catalog,
                content,
                matrix,
                latent: None,
                popularity,
            };
            check_consistency(&snapshot)?;
            Ok(snapshot)
        }
    }
}

fn build_indexes(
    catalog: &DataIndex,
    config: &EngineConfig,
    version: u64,
) -> (ContentIndex, PopularityRanking, InteractionMatrix) {
    let ((content, popularity), matrix) = rayon::join(
        || {
            rayon::join(
                || ContentIndex::build(catalog, &config.similarity.content),
                || PopularityRanking::build(catalog),
            )
        },
        || InteractionMatrix::build(catalog, &config.similarity.collaborative, version),
    );
    (content, popularity, matrix)
}

/// Build the next snapshot from `catalog` and publish it
///
/// On failure the handle is left untouched and the error is returned.
pub fn rebuild_and_publish(
    handle: &SnapshotHandle,
    catalog: Arc<DataIndex>,
    config: &EngineConfig,
) -> Result<u64> {
    let version = handle.version() + 1;
    match build_with_retry(catalog, config, version) {
        Ok(snapshot) => {
            let previous = handle.publish(snapshot);
            info!(version, previous = previous.version, "Published snapshot");
            Ok(version)
        }
        Err(e) => {
            error!(
                version,
                serving = handle.version(),
                "Rebuild failed, keeping previous snapshot: {}",
                e
            );
            Err(e)
        }
    }
}
