//! Core domain types for the movie catalog and interaction log.
//!
//! Everything downstream (similarity index, latent model, profiles, ranking)
//! reads from these types. `DataIndex` is the append/read store the engine
//! ingests into and takes point-in-time copies of when it rebuilds.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::DataLoadError;

// =============================================================================
// Type Aliases
// =============================================================================

/// Unique identifier for a user
pub type UserId = u32;

/// Unique identifier for a movie
pub type MovieId = u32;

/// Lowest rating MovieLens hands out (half-star scale)
pub const MIN_RATING: f32 = 0.5;

/// Highest rating MovieLens hands out
pub const MAX_RATING: f32 = 5.0;

// =============================================================================
// Movie-related Types
// =============================================================================

/// Represents a movie in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    /// Year extracted from title (e.g., "Toy Story (1995)")
    pub year: Option<u16>,
    /// Genres for this movie, kept sorted so iteration order is stable
    pub genres: BTreeSet<Genre>,
    /// Free-text tags attached by users, in insertion order
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Movie {
    /// Convenience constructor for a movie without tags
    pub fn new(id: MovieId, title: impl Into<String>, year: Option<u16>, genres: &[Genre]) -> Self {
        Self {
            id,
            title: title.into(),
            year,
            genres: genres.iter().copied().collect(),
            tags: Vec::new(),
        }
    }

    pub fn has_genre(&self, genre: Genre) -> bool {
        self.genres.contains(&genre)
    }
}

/// A free-text tag with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    /// User who attached the tag
    pub user_id: UserId,
    pub text: String,
    /// Unix timestamp when the tag was attached
    pub timestamp: i64,
}

/// Movie genres from MovieLens
///
/// The 18 genres of the 1M dataset plus IMAX, which appears in the newer
/// `ml-latest` CSV releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Genre {
    Action,
    Adventure,
    Animation,
    Children,
    Comedy,
    Crime,
    Documentary,
    Drama,
    Fantasy,
    FilmNoir,
    Horror,
    Imax,
    Musical,
    Mystery,
    Romance,
    SciFi,
    Thriller,
    War,
    Western,
}

impl Genre {
    /// Every genre, in declaration order
    pub const ALL: [Genre; 19] = [
        Genre::Action,
        Genre::Adventure,
        Genre::Animation,
        Genre::Children,
        Genre::Comedy,
        Genre::Crime,
        Genre::Documentary,
        Genre::Drama,
        Genre::Fantasy,
        Genre::FilmNoir,
        Genre::Horror,
        Genre::Imax,
        Genre::Musical,
        Genre::Mystery,
        Genre::Romance,
        Genre::SciFi,
        Genre::Thriller,
        Genre::War,
        Genre::Western,
    ];

    /// Name as spelled in the MovieLens files
    pub fn as_str(&self) -> &'static str {
        match self {
            Genre::Action => "Action",
            Genre::Adventure => "Adventure",
            Genre::Animation => "Animation",
            Genre::Children => "Children's",
            Genre::Comedy => "Comedy",
            Genre::Crime => "Crime",
            Genre::Documentary => "Documentary",
            Genre::Drama => "Drama",
            Genre::Fantasy => "Fantasy",
            Genre::FilmNoir => "Film-Noir",
            Genre::Horror => "Horror",
            Genre::Imax => "IMAX",
            Genre::Musical => "Musical",
            Genre::Mystery => "Mystery",
            Genre::Romance => "Romance",
            Genre::SciFi => "Sci-Fi",
            Genre::Thriller => "Thriller",
            Genre::War => "War",
            Genre::Western => "Western",
        }
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Genre {
    type Err = DataLoadError;

    /// Case-insensitive; accepts both MovieLens spellings of Children
    /// ("Children's" in 1M, "Children" in the CSV releases) and loose
    /// variants such as "scifi" or "film noir".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        let genre = match normalized.as_str() {
            "action" => Genre::Action,
            "adventure" => Genre::Adventure,
            "animation" => Genre::Animation,
            "children" | "childrens" => Genre::Children,
            "comedy" => Genre::Comedy,
            "crime" => Genre::Crime,
            "documentary" => Genre::Documentary,
            "drama" => Genre::Drama,
            "fantasy" => Genre::Fantasy,
            "filmnoir" => Genre::FilmNoir,
            "horror" => Genre::Horror,
            "imax" => Genre::Imax,
            "musical" => Genre::Musical,
            "mystery" => Genre::Mystery,
            "romance" => Genre::Romance,
            "scifi" => Genre::SciFi,
            "thriller" => Genre::Thriller,
            "war" => Genre::War,
            "western" => Genre::Western,
            _ => {
                return Err(DataLoadError::InvalidValue {
                    field: "genre".to_string(),
                    value: s.to_string(),
                });
            }
        };
        Ok(genre)
    }
}

// =============================================================================
// Rating Type
// =============================================================================

/// A single interaction: a user's rating of a movie
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub user_id: UserId,
    pub movie_id: MovieId,
    /// Rating value from 0.5 to 5.0
    pub rating: f32,
    /// Unix timestamp when rating was made
    pub timestamp: i64,
}

// =============================================================================
// Statistics Types
// =============================================================================

/// Precomputed statistics for a movie
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovieStats {
    pub avg_rating: f32,
    pub rating_count: u32,
    /// Quality score in [0, 1] blending average rating and rating volume
    pub quality_score: f32,
}

impl MovieStats {
    /// Stats for a movie nobody has rated yet
    pub const UNRATED: MovieStats = MovieStats {
        avg_rating: 0.0,
        rating_count: 0,
        quality_score: 0.0,
    };
}

// =============================================================================
// DataIndex - The Catalog and Interaction Store
// =============================================================================

/// Main data structure that holds all catalog data and indices.
///
/// Ratings are a functional image of the latest interaction per
/// (user, movie) pair: `insert_rating` overwrites an older rating for the same
/// pair and ignores one that is older than what is stored.
#[derive(Debug, Clone)]
pub struct DataIndex {
    pub(crate) movies: HashMap<MovieId, Movie>,

    /// All ratings made by each user
    pub(crate) user_ratings: HashMap<UserId, Vec<Rating>>,
    /// All ratings received by each movie
    pub(crate) movie_ratings: HashMap<MovieId, Vec<Rating>>,

    /// Movies grouped by genre (one movie can appear in multiple genre lists)
    pub(crate) genre_index: HashMap<Genre, Vec<MovieId>>,
    /// Movies grouped by release year
    pub(crate) year_index: BTreeMap<u16, Vec<MovieId>>,

    pub(crate) movie_stats: HashMap<MovieId, MovieStats>,

    /// Bumped on every mutation
    pub(crate) revision: u64,
}

impl DataIndex {
    /// Creates a new, empty DataIndex
    pub fn new() -> Self {
        Self {
            movies: HashMap::new(),
            user_ratings: HashMap::new(),
            movie_ratings: HashMap::new(),
            genre_index: HashMap::new(),
            year_index: BTreeMap::new(),
            movie_stats: HashMap::new(),
            revision: 0,
        }
    }

    /// Get a movie by ID
    pub fn get_movie(&self, id: MovieId) -> Option<&Movie> {
        self.movies.get(&id)
    }

    /// Get all ratings made by a user
    ///
    /// Returns an empty slice if user has no ratings
    pub fn get_user_ratings(&self, user_id: UserId) -> &[Rating] {
        self.user_ratings
            .get(&user_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Get all ratings for a movie
    pub fn get_movie_ratings(&self, movie_id: MovieId) -> &[Rating] {
        self.movie_ratings
            .get(&movie_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Look up one user's rating of one movie
    pub fn get_rating(&self, user_id: UserId, movie_id: MovieId) -> Option<&Rating> {
        self.get_user_ratings(user_id)
            .iter()
            .find(|r| r.movie_id == movie_id)
    }

    /// Get all movies in a specific genre
    pub fn get_movies_by_genre(&self, genre: Genre) -> &[MovieId] {
        self.genre_index
            .get(&genre)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Get all movies released in a specific year
    pub fn get_movies_by_year(&self, year: u16) -> &[MovieId] {
        self.year_index
            .get(&year)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Movies released in `[start, end]`, ordered by year then id
    pub fn get_movies_in_year_range(&self, start: u16, end: u16) -> Vec<MovieId> {
        if start > end {
            return Vec::new();
        }
        self.year_index
            .range(start..=end)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }

    /// Every movie id, sorted ascending
    pub fn get_all_movie_ids(&self) -> Vec<MovieId> {
        let mut ids: Vec<MovieId> = self.movies.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Every user with at least one rating, sorted ascending
    pub fn get_all_user_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.user_ratings.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn has_user(&self, user_id: UserId) -> bool {
        self.user_ratings.contains_key(&user_id)
    }

    /// Get precomputed statistics for a movie
    pub fn get_movie_stats(&self, movie_id: MovieId) -> Option<&MovieStats> {
        self.movie_stats.get(&movie_id)
    }

    /// Monotonic mutation counter, used to version snapshots built from here
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Insert (or replace) a movie and keep the genre and year indices in step
    pub fn insert_movie(&mut self, movie: Movie) {
        if let Some(previous) = self.movies.remove(&movie.id) {
            self.unindex_movie(&previous);
        }

        for &genre in &movie.genres {
            insert_sorted(self.genre_index.entry(genre).or_default(), movie.id);
        }
        if let Some(year) = movie.year {
            insert_sorted(self.year_index.entry(year).or_default(), movie.id);
        }

        self.movies.insert(movie.id, movie);
        self.revision += 1;
    }

    fn unindex_movie(&mut self, movie: &Movie) {
        for genre in &movie.genres {
            if let Some(ids) = self.genre_index.get_mut(genre) {
                ids.retain(|&id| id != movie.id);
            }
        }
        if let Some(year) = movie.year
            && let Some(ids) = self.year_index.get_mut(&year)
        {
            ids.retain(|&id| id != movie.id);
        }
    }

    /// Insert a rating, keeping only the latest rating per (user, movie).
    ///
    /// Returns `false` when an existing rating for the pair is newer and the
    /// incoming one was dropped.
    pub fn insert_rating(&mut self, rating: Rating) -> bool {
        let user_ratings = self.user_ratings.entry(rating.user_id).or_default();

        if let Some(existing) = user_ratings
            .iter_mut()
            .find(|r| r.movie_id == rating.movie_id)
        {
            if rating.timestamp < existing.timestamp {
                return false;
            }
            *existing = rating;
            if let Some(existing) = self
                .movie_ratings
                .entry(rating.movie_id)
                .or_default()
                .iter_mut()
                .find(|r| r.user_id == rating.user_id)
            {
                *existing = rating;
            }
        } else {
            user_ratings.push(rating);
            self.movie_ratings
                .entry(rating.movie_id)
                .or_default()
                .push(rating);
        }

        self.revision += 1;
        true
    }

    /// Attach a tag to a movie. Returns `false` if the movie is unknown.
    pub fn add_tag(&mut self, movie_id: MovieId, tag: Tag) -> bool {
        match self.movies.get_mut(&movie_id) {
            Some(movie) => {
                movie.tags.push(tag);
                self.revision += 1;
                true
            }
            None => false,
        }
    }

    /// Get counts for debugging/validation: (users, movies, ratings)
    pub fn counts(&self) -> (usize, usize, usize) {
        let total_ratings = self.user_ratings.values().map(|v| v.len()).sum();
        (self.user_ratings.len(), self.movies.len(), total_ratings)
    }
}

impl Default for DataIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_sorted(ids: &mut Vec<MovieId>, id: MovieId) {
    if let Err(pos) = ids.binary_search(&id) {
        ids.insert(pos, id);
    }
}
