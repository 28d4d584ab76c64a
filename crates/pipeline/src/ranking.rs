//! Final scoring, ordering and explanation assembly.

use crate::fusion::{DecayConfig, decay_multiplier, effective_weights, fuse, normalize_signal};
use crate::types::{Candidate, Explanation, RecommendedItem};
use data_loader::DataIndex;
use profile::FusionWeights;
use rayon::prelude::*;
use sources::SignalKind;
use std::cmp::Ordering;
use tracing::debug;

/// Fuses signals, applies decay and orders candidates
#[derive(Debug, Clone)]
pub struct Ranker {
    decay: DecayConfig,
    reference_year: u16,
}

impl Ranker {
    pub fn new(decay: DecayConfig) -> Self {
        let reference_year = decay.reference_year();
        Self {
            decay,
            reference_year,
        }
    }

    pub fn reference_year(&self) -> u16 {
        self.reference_year
    }

    /// Compute fused score, decay multiplier and final score per candidate
    ///
    /// Candidates with no present signal cannot be scored and are dropped.
    pub fn score(
        &self,
        candidates: Vec<Candidate>,
        weights: &FusionWeights,
        catalog: &DataIndex,
    ) -> Vec<Candidate> {
        let before = candidates.len();
        let scored: Vec<Candidate> = candidates
            .into_par_iter()
            .filter_map(|mut candidate| {
                let fused = fuse(&candidate.signals, weights)?;
                let year = catalog.get_movie(candidate.movie_id).and_then(|m| m.year);
                candidate.rating_count = catalog
                    .get_movie_stats(candidate.movie_id)
                    .map(|s| s.rating_count)
                    .unwrap_or(0);
                candidate.fused = fused;
                candidate.multiplier =
                    decay_multiplier(year, candidate.rating_count, &self.decay, self.reference_year);
                candidate.score = fused * candidate.multiplier;
                Some(candidate)
            })
            .collect();
        debug!("Scored {} of {} candidates", scored.len(), before);
        scored
    }

    /// Sort, truncate to `count` and attach ordered explanations
    pub fn rank(
        &self,
        mut candidates: Vec<Candidate>,
        weights: &FusionWeights,
        count: usize,
    ) -> Vec<RecommendedItem> {
        candidates.sort_by(ranking_order);
        candidates.truncate(count);
        candidates
            .into_iter()
            .map(|candidate| RecommendedItem {
                movie_id: candidate.movie_id,
                score: candidate.score,
                explanations: order_explanations(&candidate, weights),
            })
            .collect()
    }
}

impl Default for Ranker {
    fn default() -> Self {
        Self::new(DecayConfig::default())
    }
}

/// Score descending, then rating count descending, then movie id ascending
pub fn ranking_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.rating_count.cmp(&a.rating_count))
        .then_with(|| a.movie_id.cmp(&b.movie_id))
}

/// Evidence ordered by how much its signal contributed to the fused score
///
/// Signals with zero effective weight are left out. Declared-genre tokens
/// follow the signal evidence. If nothing contributed, the strongest present
/// signal's evidence is kept so every item carries a reason.
pub fn order_explanations(candidate: &Candidate, weights: &FusionWeights) -> Vec<Explanation> {
    let contributions: Vec<(SignalKind, f32)> = effective_weights(&candidate.signals, weights)
        .into_iter()
        .filter_map(|(kind, weight)| {
            let raw = candidate.signals.get(kind)?;
            Some((kind, weight * normalize_signal(kind, raw)))
        })
        .collect();
    let contribution = |kind: SignalKind| {
        contributions
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, c)| *c)
    };

    let mut signal_evidence: Vec<(f32, usize, Explanation)> = candidate
        .evidence
        .iter()
        .enumerate()
        .filter(|(_, e)| !matches!(e, Explanation::DeclaredGenre { .. }))
        .filter_map(|(position, e)| contribution(e.kind()).map(|c| (c, position, *e)))
        .collect();
    signal_evidence.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    let mut ordered: Vec<Explanation> = signal_evidence
        .iter()
        .filter(|(c, _, _)| *c > 0.0)
        .map(|(_, _, e)| *e)
        .collect();
    if ordered.is_empty()
        && let Some((_, _, strongest)) = signal_evidence.first()
    {
        ordered.push(*strongest);
    }

    ordered.extend(
        candidate
            .evidence
            .iter()
            .filter(|e| matches!(e, Explanation::DeclaredGenre { .. }))
            .copied(),
    );
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SignalScores;
    use data_loader::{Genre, Movie, Rating};

    fn candidate(movie_id: u32, score: f32, rating_count: u32) -> Candidate {
        Candidate {
            score,
            rating_count,
            ..Candidate::new(movie_id)
        }
    }

    #[test]
    fn test_tie_break_by_count_then_id() {
        let mut candidates = vec![
            candidate(9, 0.5, 10),
            candidate(3, 0.5, 10),
            candidate(5, 0.5, 20),
            candidate(1, 0.9, 0),
        ];
        candidates.sort_by(ranking_order);
        let ids: Vec<u32> = candidates.iter().map(|c| c.movie_id).collect();
        assert_eq!(ids, vec![1, 5, 3, 9]);
    }

    #[test]
    fn test_explanations_follow_contribution() {
        let weights = FusionWeights {
            content: 0.2,
            collaborative: 0.8,
            latent: 0.0,
            popularity: 0.0,
        };
        let mut c = Candidate::new(1);
        c.signals = SignalScores {
            content: Some(0.9),
            collaborative: Some(4.5),
            latent: Some(4.0),
            popularity: Some(0.7),
        };
        c.evidence = vec![
            Explanation::DeclaredGenre { genre: Genre::Comedy },
            Explanation::Content {
                because_of: 2,
                similarity: 0.9,
            },
            Explanation::CollaborativeUser {
                user_id: 7,
                similarity: 0.6,
            },
            Explanation::Latent {
                predicted_rating: 4.0,
            },
        ];

        let ordered = order_explanations(&c, &weights);
        assert_eq!(ordered.len(), 3);
        assert_eq!(ordered[0].kind(), SignalKind::Collaborative);
        assert_eq!(ordered[1].kind(), SignalKind::Content);
        assert!(matches!(ordered[2], Explanation::DeclaredGenre { .. }));
    }

    #[test]
    fn test_score_and_rank() {
        let mut catalog = DataIndex::new();
        catalog.insert_movie(Movie::new(1, "Recent (2020)", Some(2020), &[Genre::Drama]));
        catalog.insert_movie(Movie::new(2, "Classic (1950)", Some(1950), &[Genre::Drama]));
        for user_id in 0..5 {
            for movie_id in [1, 2] {
                catalog.insert_rating(Rating {
                    user_id,
                    movie_id,
                    rating: 4.0,
                    timestamp: 0,
                });
            }
        }
        catalog.compute_movie_stats();

        let ranker = Ranker::new(DecayConfig {
            reference_year: Some(2020),
            ..Default::default()
        });
        let weights = FusionWeights::default();

        let candidates: Vec<Candidate> = [1, 2, 3]
            .into_iter()
            .map(|id| {
                let mut c = Candidate::new(id);
                if id != 3 {
                    c.signals.content = Some(0.8);
                    c.evidence.push(Explanation::Content {
                        because_of: 10,
                        similarity: 0.8,
                    });
                }
                c
            })
            .collect();

        let scored = ranker.score(candidates, &weights, &catalog);
        assert_eq!(scored.len(), 2);

        let items = ranker.rank(scored, &weights, 5);
        assert_eq!(items[0].movie_id, 1);
        assert_eq!(items[1].movie_id, 2);
        assert!(items[0].score > items[1].score);
        assert!(items.iter().all(|item| !item.explanations.is_empty()));
    }
}
