//! Versioned, immutable serving snapshots.
//!
//! A snapshot bundles everything a query reads: the catalog copy it was
//! built from, the content index, the interaction matrix, the latent model
//! and the popularity ranking. Rebuilds never touch a published snapshot;
//! they build a new one and swap the handle's reference.

use data_loader::DataIndex;
use parking_lot::RwLock;
use pipeline::filters::{
    AlreadyRatedFilter, DislikedFilter, ExcludedGenreFilter, IncludedGenreFilter, YearRangeFilter,
};
use pipeline::FilterPipeline;
use sources::{ContentIndex, InteractionMatrix, LatentModel, PopularityRanking};
use std::sync::Arc;

pub struct Snapshot {
    pub version: u64,
    pub catalog: Arc<DataIndex>,
    pub content: ContentIndex,
    pub matrix: InteractionMatrix,
    /// `None` while no model could be trained
    pub latent: Option<LatentModel>,
    pub popularity: PopularityRanking,
    pub filters: FilterPipeline,
}

impl Snapshot {
    pub fn model_version(&self) -> Option<u64> {
        self.latent.as_ref().map(|m| m.version())
    }

    /// Catalog revision this snapshot reflects
    pub fn revision(&self) -> u64 {
        self.catalog.revision()
    }

    /// Hard-constraint filters bound to a catalog
    pub fn filters_for(catalog: &Arc<DataIndex>) -> FilterPipeline {
        FilterPipeline::new()
            .add_filter(AlreadyRatedFilter)
            .add_filter(DislikedFilter)
            .add_filter(ExcludedGenreFilter::new(catalog.clone()))
            .add_filter(IncludedGenreFilter::new(catalog.clone()))
            .add_filter(YearRangeFilter::new(catalog.clone()))
    }
}

/// Atomically swappable reference to the current snapshot
///
/// Readers clone the `Arc` and release the lock immediately, so a query
/// keeps using the snapshot it started with even if a swap happens
/// mid-query.
pub struct SnapshotHandle {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotHandle {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    pub fn version(&self) -> u64 {
        self.current.read().version
    }

    /// Replace the published snapshot, returning the one it replaced
    pub fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let next = Arc::new(snapshot);
        std::mem::replace(&mut *self.current.write(), next)
    }
}
