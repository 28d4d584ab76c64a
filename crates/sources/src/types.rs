//! Shared types for the scoring signals.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Which scoring signal produced a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// TF-IDF similarity to items the user liked
    Content,
    /// Neighbor-based prediction from the interaction matrix
    Collaborative,
    /// Latent factor model prediction
    Latent,
    /// Catalog-wide quality ranking
    Popularity,
}

impl SignalKind {
    pub const ALL: [SignalKind; 4] = [
        SignalKind::Content,
        SignalKind::Collaborative,
        SignalKind::Latent,
        SignalKind::Popularity,
    ];
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalKind::Content => "content",
            SignalKind::Collaborative => "collaborative",
            SignalKind::Latent => "latent",
            SignalKind::Popularity => "popularity",
        };
        f.write_str(name)
    }
}

/// One entry of a nearest-neighbor list
///
/// `id` is a movie id for item neighbors and a user id for user neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: u32,
    pub similarity: f32,
}

impl Neighbor {
    pub fn new(id: u32, similarity: f32) -> Self {
        Self { id, similarity }
    }
}

/// Descending similarity, then ascending id
pub fn neighbor_order(a: &Neighbor, b: &Neighbor) -> Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then_with(|| a.id.cmp(&b.id))
}

/// Keep the `k` best neighbors with positive similarity, in neighbor order
pub fn top_k_neighbors(scores: impl IntoIterator<Item = (u32, f32)>, k: usize) -> Vec<Neighbor> {
    let mut neighbors: Vec<Neighbor> = scores
        .into_iter()
        .filter(|(_, sim)| sim.is_finite() && *sim > 0.0)
        .map(|(id, sim)| Neighbor::new(id, sim))
        .collect();
    neighbors.sort_unstable_by(neighbor_order);
    neighbors.truncate(k);
    neighbors
}
