//! Query, candidate and result types for fusion and ranking.

use anyhow::{Result, bail};
use data_loader::{Genre, MovieId, UserId};
use profile::UserProfile;
use serde::{Deserialize, Serialize};
use sources::SignalKind;
use std::collections::BTreeSet;

/// Caller-supplied constraints on a recommendation query
///
/// A genre set that is present must be non-empty; `None` means "no
/// constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct HardConstraints {
    /// Inclusive release-year range
    pub year_range: Option<(u16, u16)>,
    pub include_genres: Option<BTreeSet<Genre>>,
    pub exclude_genres: Option<BTreeSet<Genre>>,
}

impl HardConstraints {
    pub fn with_year_range(mut self, from: u16, to: u16) -> Self {
        self.year_range = Some((from, to));
        self
    }

    pub fn with_include(mut self, genre: Genre) -> Self {
        self.include_genres.get_or_insert_with(BTreeSet::new).insert(genre);
        self
    }

    pub fn with_exclude(mut self, genre: Genre) -> Self {
        self.exclude_genres.get_or_insert_with(BTreeSet::new).insert(genre);
        self
    }

    /// Reject malformed constraints: inverted year ranges, empty genre
    /// sets, and genres both included and excluded
    pub fn validate(&self) -> Result<()> {
        if let Some((from, to)) = self.year_range
            && from > to
        {
            bail!("year range {}..={} is inverted", from, to);
        }
        if let Some(include) = &self.include_genres
            && include.is_empty()
        {
            bail!("include genre set is empty");
        }
        if let Some(exclude) = &self.exclude_genres
            && exclude.is_empty()
        {
            bail!("exclude genre set is empty");
        }
        if let (Some(include), Some(exclude)) = (&self.include_genres, &self.exclude_genres) {
            let conflicts: Vec<String> = include.intersection(exclude).map(|g| g.to_string()).collect();
            if !conflicts.is_empty() {
                bail!("genres both included and excluded: {}", conflicts.join(", "));
            }
        }
        Ok(())
    }

    /// Reject query includes the user's profile excludes
    ///
    /// Such a query could only ever return an empty list.
    pub fn validate_against(&self, profile: &UserProfile) -> Result<()> {
        if let Some(include) = &self.include_genres {
            let excluded: Vec<String> = include
                .intersection(&profile.exclude_genres)
                .map(|g| g.to_string())
                .collect();
            if !excluded.is_empty() {
                bail!("requested genre is excluded by profile: {}", excluded.join(", "));
            }
        }
        Ok(())
    }

    /// Merge with the user's declared preferences
    ///
    /// Excludes are the union of both sources. Query includes replace the
    /// profile's. Anything excluded is removed from the include set, so an
    /// include set can end up empty, which matches nothing.
    pub fn resolve(&self, profile: &UserProfile) -> EffectiveConstraints {
        let mut exclude = profile.exclude_genres.clone();
        if let Some(query_exclude) = &self.exclude_genres {
            exclude.extend(query_exclude.iter().copied());
        }

        let include: Option<BTreeSet<Genre>> = match &self.include_genres {
            Some(query_include) => Some(query_include.clone()),
            None if !profile.include_genres.is_empty() => Some(profile.include_genres.clone()),
            None => None,
        }
        .map(|set| set.difference(&exclude).copied().collect());

        EffectiveConstraints {
            year_range: self.year_range,
            include,
            exclude,
        }
    }
}

/// Constraints after merging query and profile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveConstraints {
    pub year_range: Option<(u16, u16)>,
    /// `Some` restricts results to these genres
    pub include: Option<BTreeSet<Genre>>,
    pub exclude: BTreeSet<Genre>,
}

/// One recommendation request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecommendationQuery {
    pub user_id: UserId,
    #[serde(default)]
    pub constraints: HardConstraints,
    pub count: usize,
}

impl RecommendationQuery {
    pub fn new(user_id: UserId, count: usize) -> Self {
        Self {
            user_id,
            constraints: HardConstraints::default(),
            count,
        }
    }

    pub fn with_constraints(mut self, constraints: HardConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.count == 0 {
            bail!("requested result count must be positive");
        }
        self.constraints.validate()
    }
}

/// Per-signal raw scores for one candidate; `None` means the signal has
/// nothing to say about it
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalScores {
    /// Best cosine similarity to a seed item, possibly blended with genre affinity
    pub content: Option<f32>,
    /// Neighbor-predicted rating
    pub collaborative: Option<f32>,
    /// Latent model predicted rating
    pub latent: Option<f32>,
    /// Quality score
    pub popularity: Option<f32>,
}

impl SignalScores {
    pub fn get(&self, kind: SignalKind) -> Option<f32> {
        match kind {
            SignalKind::Content => self.content,
            SignalKind::Collaborative => self.collaborative,
            SignalKind::Latent => self.latent,
            SignalKind::Popularity => self.popularity,
        }
    }

    /// Signals with a value, in `SignalKind` order
    pub fn present(&self) -> impl Iterator<Item = (SignalKind, f32)> + '_ {
        SignalKind::ALL
            .into_iter()
            .filter_map(|kind| self.get(kind).map(|v| (kind, v)))
    }
}

/// Why an item was recommended
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Explanation {
    /// Similar content to a movie the user liked
    Content { because_of: MovieId, similarity: f32 },
    /// A similar user rated it highly
    CollaborativeUser { user_id: UserId, similarity: f32 },
    /// Rated like a movie the user rated
    CollaborativeItem { movie_id: MovieId, similarity: f32 },
    /// Latent model estimate
    Latent { predicted_rating: f32 },
    /// Generally well-liked
    Popularity { quality_score: f32, rating_count: u32 },
    /// Matches a genre the user asked for
    DeclaredGenre { genre: Genre },
}

impl Explanation {
    pub fn kind(&self) -> SignalKind {
        match self {
            Explanation::Content { .. } | Explanation::DeclaredGenre { .. } => SignalKind::Content,
            Explanation::CollaborativeUser { .. } | Explanation::CollaborativeItem { .. } => {
                SignalKind::Collaborative
            }
            Explanation::Latent { .. } => SignalKind::Latent,
            Explanation::Popularity { .. } => SignalKind::Popularity,
        }
    }
}

/// A candidate moving through scoring and filtering
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub movie_id: MovieId,
    pub signals: SignalScores,
    /// Evidence gathered per signal, reordered by contribution at ranking time
    pub evidence: Vec<Explanation>,
    pub rating_count: u32,
    /// Fused score before decay
    pub fused: f32,
    /// Popularity/recency multiplier in (0, 1]
    pub multiplier: f32,
    /// `fused * multiplier`
    pub score: f32,
}

impl Candidate {
    pub fn new(movie_id: MovieId) -> Self {
        Self {
            movie_id,
            signals: SignalScores::default(),
            evidence: Vec::new(),
            rating_count: 0,
            fused: 0.0,
            multiplier: 1.0,
            score: 0.0,
        }
    }
}

/// One ranked entry of a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedItem {
    pub movie_id: MovieId,
    pub score: f32,
    pub explanations: Vec<Explanation>,
}

/// Ranked, explained answer to a `RecommendationQuery`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub user_id: UserId,
    pub items: Vec<RecommendedItem>,
    /// True when the popularity fallback produced the list
    pub fallback: bool,
    pub snapshot_version: u64,
    /// `None` when no latent model was available
    pub model_version: Option<u64>,
}

impl RecommendationResult {
    pub fn movie_ids(&self) -> Vec<MovieId> {
        self.items.iter().map(|item| item.movie_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_validation() {
        assert!(HardConstraints::default().validate().is_ok());
        assert!(HardConstraints::default().with_year_range(2000, 1990).validate().is_err());

        let empty = HardConstraints {
            include_genres: Some(BTreeSet::new()),
            ..Default::default()
        };
        assert!(empty.validate().is_err());

        let contradictory = HardConstraints::default()
            .with_include(Genre::Comedy)
            .with_exclude(Genre::Comedy);
        assert!(contradictory.validate().is_err());
    }

    #[test]
    fn test_resolve_exclusion_wins() {
        let mut profile = UserProfile::new(1);
        profile.exclude_genres.insert(Genre::Horror);
        profile.include_genres.insert(Genre::Comedy);

        let constraints = HardConstraints::default().with_include(Genre::Horror);
        let effective = constraints.resolve(&profile);
        assert_eq!(effective.include, Some(BTreeSet::new()));
        assert!(effective.exclude.contains(&Genre::Horror));

        let effective = HardConstraints::default().resolve(&profile);
        assert_eq!(effective.include, Some([Genre::Comedy].into()));
    }

    #[test]
    fn test_include_excluded_by_profile_rejected() {
        let mut profile = UserProfile::new(1);
        profile.exclude_genres.insert(Genre::Horror);

        let conflicting = HardConstraints::default()
            .with_include(Genre::Horror)
            .with_include(Genre::Comedy);
        let err = conflicting.validate_against(&profile).unwrap_err();
        assert!(err.to_string().contains("Horror"));

        assert!(HardConstraints::default().with_include(Genre::Comedy).validate_against(&profile).is_ok());
        assert!(HardConstraints::default().validate_against(&profile).is_ok());
    }

    #[test]
    fn test_zero_count_rejected() {
        assert!(RecommendationQuery::new(1, 0).validate().is_err());
        assert!(RecommendationQuery::new(1, 5).validate().is_ok());
    }

    #[test]
    fn test_present_signals() {
        let scores = SignalScores {
            content: Some(0.5),
            popularity: Some(0.2),
            ..Default::default()
        };
        let kinds: Vec<SignalKind> = scores.present().map(|(k, _)| k).collect();
        assert_eq!(kinds, vec![SignalKind::Content, SignalKind::Popularity]);
    }
}
