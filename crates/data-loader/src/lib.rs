//! # Data Loader Crate
//!
//! Catalog and interaction store for the recommendation engine.
//!
//! ## Main Components
//!
//! - **types**: Core domain types (Movie, Tag, Rating, Genre, DataIndex)
//! - **parser**: Parse MovieLens `.dat` and `.csv` files into Rust structs
//! - **index**: Load a dataset directory, compute movie statistics, validate
//! - **search**: Title lookup
//! - **error**: Error types for data loading
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::DataIndex;
//! use std::path::Path;
//!
//! let index = DataIndex::load_from_dir(Path::new("data/ml-latest-small"))?;
//!
//! let movie = index.find_by_title("Toy Story").unwrap();
//! let ratings = index.get_movie_ratings(movie.id);
//!
//! println!("{} has {} ratings", movie.title, ratings.len());
//! ```

pub mod error;
pub mod index;
pub mod parser;
pub mod search;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{DataLoadError, Result};
pub use index::{compute_quality_score, validate_rating_value, DatasetLayout};
pub use types::{
    // Type aliases
    MovieId,
    UserId,
    // Core types
    DataIndex,
    Movie,
    MovieStats,
    Rating,
    Tag,
    // Enums
    Genre,
    // Constants
    MAX_RATING,
    MIN_RATING,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_index_creation() {
        let index = DataIndex::new();
        let (users, movies, ratings) = index.counts();

        assert_eq!(users, 0);
        assert_eq!(movies, 0);
        assert_eq!(ratings, 0);
        assert_eq!(index.revision(), 0);
    }

    #[test]
    fn test_insert_movie() {
        let mut index = DataIndex::new();
        let movie = Movie::new(
            1,
            "Toy Story (1995)",
            Some(1995),
            &[Genre::Animation, Genre::Children, Genre::Comedy],
        );

        index.insert_movie(movie);

        let retrieved = index.get_movie(1).unwrap();
        assert_eq!(retrieved.id, 1);
        assert_eq!(retrieved.year, Some(1995));
        assert_eq!(retrieved.genres.len(), 3);
        assert_eq!(index.get_movies_by_genre(Genre::Comedy), &[1]);
        assert_eq!(index.get_movies_by_year(1995), &[1]);
    }

    #[test]
    fn test_replacing_movie_reindexes() {
        let mut index = DataIndex::new();
        index.insert_movie(Movie::new(1, "A (1990)", Some(1990), &[Genre::Drama]));
        index.insert_movie(Movie::new(1, "A (1991)", Some(1991), &[Genre::Comedy]));

        assert!(index.get_movies_by_genre(Genre::Drama).is_empty());
        assert!(index.get_movies_by_year(1990).is_empty());
        assert_eq!(index.get_movies_by_genre(Genre::Comedy), &[1]);
        assert_eq!(index.get_movies_in_year_range(1985, 1995), vec![1]);
    }

    #[test]
    fn test_insert_rating() {
        let mut index = DataIndex::new();

        let rating = Rating {
            user_id: 1,
            movie_id: 1193,
            rating: 5.0,
            timestamp: 978300760,
        };

        assert!(index.insert_rating(rating));

        let user_ratings = index.get_user_ratings(1);
        assert_eq!(user_ratings.len(), 1);
        assert_eq!(user_ratings[0].rating, 5.0);

        let movie_ratings = index.get_movie_ratings(1193);
        assert_eq!(movie_ratings.len(), 1);
    }

    #[test]
    fn test_latest_rating_wins() {
        let mut index = DataIndex::new();
        let base = Rating {
            user_id: 1,
            movie_id: 10,
            rating: 2.0,
            timestamp: 100,
        };
        index.insert_rating(base);
        assert!(index.insert_rating(Rating { rating: 4.5, timestamp: 200, ..base }));
        assert!(!index.insert_rating(Rating { rating: 1.0, timestamp: 150, ..base }));

        assert_eq!(index.get_rating(1, 10).unwrap().rating, 4.5);
        assert_eq!(index.get_movie_ratings(10).len(), 1);
        assert_eq!(index.get_movie_ratings(10)[0].rating, 4.5);
    }

    #[test]
    fn test_empty_queries() {
        let index = DataIndex::new();

        // Querying non-existent data should return None or empty slices
        assert!(!index.has_user(999));
        assert!(index.get_movie(999).is_none());
        assert!(index.get_user_ratings(999).is_empty());
        assert!(index.get_movie_ratings(999).is_empty());
        assert!(index.get_movies_by_genre(Genre::Action).is_empty());
        assert!(index.get_movies_in_year_range(2000, 1990).is_empty());
    }

    #[test]
    fn test_genre_round_trip_names() {
        for genre in Genre::ALL {
            assert_eq!(genre.as_str().parse::<Genre>().unwrap(), genre);
        }
        assert_eq!("children".parse::<Genre>().unwrap(), Genre::Children);
        assert!("Cooking".parse::<Genre>().is_err());
    }
}
