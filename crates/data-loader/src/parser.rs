//! Parsers for MovieLens data files.
//!
//! Two layouts are supported:
//! - `.dat` (1M / 10M releases), `::`-separated, ISO-8859-1 encoded
//!   - movies.dat: movieId::title::genres
//!   - ratings.dat: userId::movieId::rating::timestamp
//!   - tags.dat: userId::movieId::tag::timestamp
//! - `.csv` (ml-latest releases), with a header row
//!   - movies.csv: movieId,title,genres
//!   - ratings.csv: userId,movieId,rating,timestamp
//!   - tags.csv: userId,movieId,tag,timestamp

use crate::error::{DataLoadError, Result};
use crate::types::*;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Read a file with ISO-8859-1 encoding (Latin-1)
///
/// Each Latin-1 byte maps directly to the Unicode code point of the same value.
fn read_lines_latin1(path: &Path) -> Result<Vec<String>> {
    let mut file = File::open(path).map_err(|_| DataLoadError::FileNotFound {
        path: path.display().to_string(),
    })?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    let content: String = bytes.iter().map(|&b| b as char).collect();
    Ok(content.lines().map(|s| s.to_string()).collect())
}

/// Pull the next `::` field or report which one is missing
fn next_field<'a>(
    parts: &mut impl Iterator<Item = &'a str>,
    file: &str,
    line: usize,
    name: &str,
) -> Result<&'a str> {
    parts.next().ok_or_else(|| DataLoadError::ParseError {
        file: file.to_string(),
        line,
        reason: format!("Missing {}", name),
    })
}

fn parse_number<T: std::str::FromStr>(value: &str, file: &str, line: usize, name: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| DataLoadError::ParseError {
        file: file.to_string(),
        line,
        reason: format!("Invalid {}: {}", name, e),
    })
}

/// Iterate non-empty lines with their 1-based line numbers
fn data_lines(lines: &[String]) -> impl Iterator<Item = (usize, &str)> {
    lines
        .iter()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
}

/// Parse the movies.dat file
///
/// The title often includes year in parentheses: "Toy Story (1995)"
/// Genres are pipe-separated: "Animation|Children's|Comedy"
pub fn parse_movies_dat(path: &Path) -> Result<Vec<Movie>> {
    const FILE: &str = "movies.dat";
    let lines = read_lines_latin1(path)?;
    let mut movies = Vec::with_capacity(lines.len());

    for (line_no, line) in data_lines(&lines) {
        let mut parts = line.split("::");
        let movie_id = next_field(&mut parts, FILE, line_no, "movieId")?;
        let title = next_field(&mut parts, FILE, line_no, "title")?;
        let genres = next_field(&mut parts, FILE, line_no, "genres")?;

        movies.push(Movie {
            id: parse_number(movie_id, FILE, line_no, "movieId")?,
            title: title.to_string(),
            year: extract_year_from_title(title),
            genres: parse_genres(genres)?,
            tags: Vec::new(),
        });
    }
    Ok(movies)
}

/// Parse the ratings.dat file
pub fn parse_ratings_dat(path: &Path) -> Result<Vec<Rating>> {
    const FILE: &str = "ratings.dat";
    let lines = read_lines_latin1(path)?;
    let mut ratings = Vec::with_capacity(lines.len());

    for (line_no, line) in data_lines(&lines) {
        let mut parts = line.split("::");
        let user_id = next_field(&mut parts, FILE, line_no, "userId")?;
        let movie_id = next_field(&mut parts, FILE, line_no, "movieId")?;
        let rating = next_field(&mut parts, FILE, line_no, "rating")?;
        let timestamp = next_field(&mut parts, FILE, line_no, "timestamp")?;

        ratings.push(Rating {
            user_id: parse_number(user_id, FILE, line_no, "userId")?,
            movie_id: parse_number(movie_id, FILE, line_no, "movieId")?,
            rating: parse_number(rating, FILE, line_no, "rating")?,
            timestamp: parse_number(timestamp, FILE, line_no, "timestamp")?,
        });
    }
    Ok(ratings)
}

/// Parse the tags.dat file into (movie, tag) pairs
pub fn parse_tags_dat(path: &Path) -> Result<Vec<(MovieId, Tag)>> {
    const FILE: &str = "tags.dat";
    let lines = read_lines_latin1(path)?;
    let mut tags = Vec::with_capacity(lines.len());

    for (line_no, line) in data_lines(&lines) {
        let mut parts = line.split("::");
        let user_id = next_field(&mut parts, FILE, line_no, "userId")?;
        let movie_id = next_field(&mut parts, FILE, line_no, "movieId")?;
        let text = next_field(&mut parts, FILE, line_no, "tag")?;
        let timestamp = next_field(&mut parts, FILE, line_no, "timestamp")?;

        tags.push((
            parse_number(movie_id, FILE, line_no, "movieId")?,
            Tag {
                user_id: parse_number(user_id, FILE, line_no, "userId")?,
                text: text.trim().to_string(),
                timestamp: parse_number(timestamp, FILE, line_no, "timestamp")?,
            },
        ));
    }
    Ok(tags)
}

#[derive(Debug, Deserialize)]
struct MovieRecord {
    #[serde(rename = "movieId")]
    movie_id: MovieId,
    title: String,
    genres: String,
}

#[derive(Debug, Deserialize)]
struct RatingRecord {
    #[serde(rename = "userId")]
    user_id: UserId,
    #[serde(rename = "movieId")]
    movie_id: MovieId,
    rating: f32,
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct TagRecord {
    #[serde(rename = "userId")]
    user_id: UserId,
    #[serde(rename = "movieId")]
    movie_id: MovieId,
    tag: String,
    timestamp: i64,
}

fn read_csv<T: for<'de> Deserialize<'de>>(path: &Path, file: &str) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path).map_err(|_| DataLoadError::FileNotFound {
        path: path.display().to_string(),
    })?;

    reader
        .deserialize()
        .map(|record| {
            record.map_err(|source| DataLoadError::CsvError {
                file: file.to_string(),
                source,
            })
        })
        .collect()
}

/// Parse movies.csv
pub fn parse_movies_csv(path: &Path) -> Result<Vec<Movie>> {
    read_csv::<MovieRecord>(path, "movies.csv")?
        .into_iter()
        .map(|record| -> Result<Movie> {
            Ok(Movie {
                id: record.movie_id,
                year: extract_year_from_title(&record.title),
                genres: parse_genres(&record.genres)?,
                title: record.title,
                tags: Vec::new(),
            })
        })
        .collect()
}

/// Parse ratings.csv
pub fn parse_ratings_csv(path: &Path) -> Result<Vec<Rating>> {
    Ok(read_csv::<RatingRecord>(path, "ratings.csv")?
        .into_iter()
        .map(|record| Rating {
            user_id: record.user_id,
            movie_id: record.movie_id,
            rating: record.rating,
            timestamp: record.timestamp,
        })
        .collect())
}

/// Parse tags.csv into (movie, tag) pairs
pub fn parse_tags_csv(path: &Path) -> Result<Vec<(MovieId, Tag)>> {
    Ok(read_csv::<TagRecord>(path, "tags.csv")?
        .into_iter()
        .map(|record| {
            (
                record.movie_id,
                Tag {
                    user_id: record.user_id,
                    text: record.tag.trim().to_string(),
                    timestamp: record.timestamp,
                },
            )
        })
        .collect())
}

/// Extract year from movie title
///
/// Example: "Toy Story (1995)" -> Some(1995)
///          "Movie Title" -> None
pub fn extract_year_from_title(title: &str) -> Option<u16> {
    let trimmed = title.trim_end();
    let start = trimmed.rfind('(')?;
    let end = trimmed.rfind(')')?;
    if start < end {
        let year_str = &trimmed[start + 1..end];
        if year_str.len() == 4
            && let Ok(year) = year_str.parse::<u16>()
        {
            return Some(year);
        }
    }
    None
}

/// Parse pipe-separated genres
///
/// Example: "Action|Adventure|Sci-Fi" -> {Action, Adventure, SciFi}
/// "(no genres listed)" yields an empty set.
pub fn parse_genres(s: &str) -> Result<BTreeSet<Genre>> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("(no genres listed)") {
        return Ok(BTreeSet::new());
    }
    s.split('|').map(|genre| genre.parse()).collect()
}
