//! DataIndex loading, statistics and validation.

use crate::error::{DataLoadError, Result};
use crate::parser;
use crate::types::*;
use rayon::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Which MovieLens release a directory holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetLayout {
    /// `movies.dat` / `ratings.dat` / `tags.dat`
    Dat,
    /// `movies.csv` / `ratings.csv` / `tags.csv`
    Csv,
}

impl DatasetLayout {
    /// Detect the layout from the files present in `data_dir`
    pub fn detect(data_dir: &Path) -> Result<Self> {
        if data_dir.join("ratings.csv").exists() && data_dir.join("movies.csv").exists() {
            Ok(DatasetLayout::Csv)
        } else if data_dir.join("ratings.dat").exists() && data_dir.join("movies.dat").exists() {
            Ok(DatasetLayout::Dat)
        } else {
            Err(DataLoadError::UnknownLayout(data_dir.display().to_string()))
        }
    }
}

impl DataIndex {
    /// Load a MovieLens dataset from a directory
    ///
    /// Steps:
    /// 1. Detect the layout and parse movies, ratings and (optional) tags in parallel
    /// 2. Insert movies, then ratings (latest rating per pair wins), then tags
    /// 3. Compute movie statistics
    /// 4. Validate referential integrity and rating ranges
    pub fn load_from_dir(data_dir: &Path) -> Result<Self> {
        let layout = DatasetLayout::detect(data_dir)?;
        info!("Loading MovieLens dataset from {:?} ({:?} layout)", data_dir, layout);

        let (movies_path, ratings_path, tags_path) = match layout {
            DatasetLayout::Dat => (
                data_dir.join("movies.dat"),
                data_dir.join("ratings.dat"),
                data_dir.join("tags.dat"),
            ),
            DatasetLayout::Csv => (
                data_dir.join("movies.csv"),
                data_dir.join("ratings.csv"),
                data_dir.join("tags.csv"),
            ),
        };

        let ((movies, ratings), tags) = rayon::join(
            || {
                rayon::join(
                    || match layout {
                        DatasetLayout::Dat => parser::parse_movies_dat(&movies_path),
                        DatasetLayout::Csv => parser::parse_movies_csv(&movies_path),
                    },
                    || match layout {
                        DatasetLayout::Dat => parser::parse_ratings_dat(&ratings_path),
                        DatasetLayout::Csv => parser::parse_ratings_csv(&ratings_path),
                    },
                )
            },
            || {
                if !tags_path.exists() {
                    return Ok(Vec::new());
                }
                match layout {
                    DatasetLayout::Dat => parser::parse_tags_dat(&tags_path),
                    DatasetLayout::Csv => parser::parse_tags_csv(&tags_path),
                }
            },
        );

        let movies = movies?;
        let ratings = ratings?;
        let tags = tags?;

        info!(
            "Parsed {} movies, {} ratings, {} tags",
            movies.len(),
            ratings.len(),
            tags.len()
        );

        let mut index = DataIndex::new();
        for movie in movies {
            index.insert_movie(movie);
        }
        for rating in ratings {
            index.insert_rating(rating);
        }
        for (movie_id, tag) in tags {
            if !index.add_tag(movie_id, tag) {
                return Err(DataLoadError::MissingReference {
                    entity: "Movie".to_string(),
                    id: movie_id,
                });
            }
        }

        index.compute_movie_stats();
        index.validate()?;

        let (users, movies, ratings) = index.counts();
        info!(
            "DataIndex built: {} users, {} movies, {} ratings",
            users, movies, ratings
        );
        Ok(index)
    }

    /// Compute aggregate statistics for all movies, in parallel
    ///
    /// Movies without ratings get `MovieStats::UNRATED` so every catalog item
    /// has an entry.
    pub fn compute_movie_stats(&mut self) {
        let movie_ratings = &self.movie_ratings;
        self.movie_stats = self
            .movies
            .par_iter()
            .map(|(&movie_id, _)| {
                let ratings = movie_ratings
                    .get(&movie_id)
                    .map(|v| v.as_slice())
                    .unwrap_or(&[]);
                (movie_id, stats_for(ratings))
            })
            .collect();
        debug!("Computed stats for {} movies", self.movie_stats.len());
    }

    /// Recompute the statistics of a single movie after an online write
    pub fn refresh_movie_stats(&mut self, movie_id: MovieId) {
        let stats = stats_for(self.get_movie_ratings(movie_id));
        self.movie_stats.insert(movie_id, stats);
    }

    /// Validate data integrity
    ///
    /// Every rating must reference a known movie and lie in the MovieLens
    /// rating range.
    pub fn validate(&self) -> Result<()> {
        for ratings in self.user_ratings.values() {
            for rating in ratings {
                if !self.movies.contains_key(&rating.movie_id) {
                    return Err(DataLoadError::MissingReference {
                        entity: "Movie".to_string(),
                        id: rating.movie_id,
                    });
                }
                validate_rating_value(rating.rating)?;
            }
        }
        Ok(())
    }
}

/// Reject rating values outside `[MIN_RATING, MAX_RATING]`
pub fn validate_rating_value(value: f32) -> Result<()> {
    if !(MIN_RATING..=MAX_RATING).contains(&value) {
        return Err(DataLoadError::InvalidValue {
            field: "rating".to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

fn stats_for(ratings: &[Rating]) -> MovieStats {
    if ratings.is_empty() {
        return MovieStats::UNRATED;
    }
    let rating_count = ratings.len() as u32;
    let total: f32 = ratings.iter().map(|r| r.rating).sum();
    let avg_rating = total / rating_count as f32;

    MovieStats {
        avg_rating,
        rating_count,
        quality_score: compute_quality_score(avg_rating, rating_count),
    }
}

/// Quality score in [0, 1]
///
/// 60% normalised average rating, 40% rating volume on a log scale that
/// saturates at 1000 ratings.
pub fn compute_quality_score(avg_rating: f32, rating_count: u32) -> f32 {
    let rating_score = (avg_rating / MAX_RATING).clamp(0.0, 1.0);
    let count_score = if rating_count > 0 {
        ((rating_count as f32 + 1.0).log10() / 3.0).min(1.0)
    } else {
        0.0
    };
    rating_score * 0.6 + count_score * 0.4
}
