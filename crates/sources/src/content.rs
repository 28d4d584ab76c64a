//! Content Similarity Index
//!
//! Item-item nearest neighbors over TF-IDF content vectors.
//!
//! ## Algorithm
//! 1. Tokenize each movie into terms:
//!    - title words (year suffix stripped, English stop words dropped)
//!    - one `genre:<name>` term per genre
//!    - words of every user tag
//! 2. Weight terms with raw term frequency times smoothed IDF,
//!    `ln((1 + N) / (1 + df)) + 1`, then L2-normalize each vector
//! 3. For every movie, score all movies sharing a term through the inverted
//!    index and keep the top-k by cosine similarity
//!
//! Neighbor lists are computed once per build. A request for more neighbors
//! than were precomputed recomputes that single row.

use crate::types::{Neighbor, top_k_neighbors};
use data_loader::{DataIndex, Genre, Movie, MovieId};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, instrument};

/// Sparse L2-normalized vector, sorted by term id
pub type ContentVector = Vec<(usize, f32)>;

/// Tuning for the content index
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Neighbors precomputed per item
    pub top_k: usize,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self { top_k: 50 }
    }
}

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she",
    "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];

fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.binary_search(&word).is_ok()
}

/// Split free text into lowercase word tokens of at least two characters
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= 2)
        .map(|word| word.to_lowercase())
        .filter(|word| !is_stop_word(word))
}

/// Term used for a genre in the vocabulary
pub fn genre_term(genre: Genre) -> String {
    format!("genre:{}", genre.as_str().to_lowercase())
}

fn strip_year(title: &str) -> &str {
    let trimmed = title.trim_end();
    match trimmed.rfind('(') {
        Some(pos) if data_loader::parser::extract_year_from_title(&trimmed[pos..]).is_some() => {
            &trimmed[..pos]
        }
        _ => trimmed,
    }
}

fn movie_terms(movie: &Movie) -> Vec<String> {
    let mut terms: Vec<String> = tokenize(strip_year(&movie.title)).collect();
    terms.extend(movie.genres.iter().map(|&g| genre_term(g)));
    for tag in &movie.tags {
        terms.extend(tokenize(&tag.text));
    }
    terms
}

/// Item-item content similarity index
#[derive(Debug, Clone)]
pub struct ContentIndex {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
    vectors: HashMap<MovieId, ContentVector>,
    /// term id -> (movie, weight)
    postings: Vec<Vec<(MovieId, f32)>>,
    neighbors: HashMap<MovieId, Vec<Neighbor>>,
    precomputed_k: usize,
}

impl ContentIndex {
    /// Build content vectors and neighbor lists for every movie in the catalog
    #[instrument(skip(data_index, config))]
    pub fn build(data_index: &DataIndex, config: &ContentConfig) -> Self {
        let movie_ids = data_index.get_all_movie_ids();

        // Term frequencies per movie, BTreeMap so term ids are assigned in a stable order
        let term_counts: Vec<(MovieId, BTreeMap<String, u32>)> = movie_ids
            .par_iter()
            .filter_map(|&id| data_index.get_movie(id))
            .map(|movie| {
                let mut counts = BTreeMap::new();
                for term in movie_terms(movie) {
                    *counts.entry(term).or_insert(0) += 1;
                }
                (movie.id, counts)
            })
            .collect();

        let mut document_frequency: BTreeMap<&str, u32> = BTreeMap::new();
        for (_, counts) in &term_counts {
            for term in counts.keys() {
                *document_frequency.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        let n_docs = term_counts.len() as f32;
        let mut vocabulary = HashMap::with_capacity(document_frequency.len());
        let mut idf = Vec::with_capacity(document_frequency.len());
        for (term_id, (term, df)) in document_frequency.iter().enumerate() {
            vocabulary.insert(term.to_string(), term_id);
            idf.push(((1.0 + n_docs) / (1.0 + *df as f32)).ln() + 1.0);
        }

        let vectors: HashMap<MovieId, ContentVector> = term_counts
            .par_iter()
            .map(|(movie_id, counts)| {
                let raw = counts.iter().filter_map(|(term, &tf)| {
                    vocabulary
                        .get(term)
                        .map(|&term_id| (term_id, tf as f32 * idf[term_id]))
                });
                (*movie_id, normalize(raw.collect()))
            })
            .collect();

        let mut postings: Vec<Vec<(MovieId, f32)>> = vec![Vec::new(); idf.len()];
        for &movie_id in &movie_ids {
            if let Some(vector) = vectors.get(&movie_id) {
                for &(term_id, weight) in vector {
                    postings[term_id].push((movie_id, weight));
                }
            }
        }

        let mut index = Self {
            vocabulary,
            idf,
            vectors,
            postings,
            neighbors: HashMap::new(),
            precomputed_k: config.top_k,
        };

        let neighbors: HashMap<MovieId, Vec<Neighbor>> = movie_ids
            .par_iter()
            .map(|&movie_id| (movie_id, index.compute_neighbors(movie_id, config.top_k)))
            .collect();
        index.neighbors = neighbors;

        info!(
            "Content index built: {} movies, {} terms, top-{} neighbors",
            index.vectors.len(),
            index.idf.len(),
            config.top_k
        );
        index
    }

    /// Up to `k` most similar movies, descending similarity then ascending id
    ///
    /// Unknown movies and movies without content terms yield an empty list.
    pub fn neighbors(&self, movie_id: MovieId, k: usize) -> Vec<Neighbor> {
        if k <= self.precomputed_k {
            return self
                .neighbors
                .get(&movie_id)
                .map(|list| list.iter().take(k).copied().collect())
                .unwrap_or_default();
        }
        debug!(movie_id, k, "Recomputing content neighbors beyond precomputed depth");
        self.compute_neighbors(movie_id, k)
    }

    /// Cosine similarity between two movies' content vectors
    pub fn similarity(&self, a: MovieId, b: MovieId) -> Option<f32> {
        let va = self.vectors.get(&a)?;
        let vb = self.vectors.get(&b)?;
        Some(sparse_dot(va, vb))
    }

    /// Movies most similar to a free-text query
    pub fn query_text(&self, text: &str, k: usize) -> Vec<Neighbor> {
        let mut counts: BTreeMap<usize, u32> = BTreeMap::new();
        for token in tokenize(text) {
            let genre = token.parse::<Genre>().ok().map(genre_term);
            for term in std::iter::once(token).chain(genre) {
                if let Some(&term_id) = self.vocabulary.get(&term) {
                    *counts.entry(term_id).or_insert(0) += 1;
                }
            }
        }
        if counts.is_empty() {
            return Vec::new();
        }
        let query = normalize(
            counts
                .into_iter()
                .map(|(term_id, tf)| (term_id, tf as f32 * self.idf[term_id]))
                .collect(),
        );
        top_k_neighbors(self.score_against(&query, None), k)
    }

    pub fn vector(&self, movie_id: MovieId) -> Option<&ContentVector> {
        self.vectors.get(&movie_id)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.idf.len()
    }

    fn compute_neighbors(&self, movie_id: MovieId, k: usize) -> Vec<Neighbor> {
        match self.vectors.get(&movie_id) {
            Some(vector) => top_k_neighbors(self.score_against(vector, Some(movie_id)), k),
            None => Vec::new(),
        }
    }

    /// Dot products of `query` with every movie sharing a term
    fn score_against(&self, query: &ContentVector, skip: Option<MovieId>) -> HashMap<MovieId, f32> {
        let mut scores: HashMap<MovieId, f32> = HashMap::new();
        for &(term_id, weight) in query {
            for &(other, other_weight) in &self.postings[term_id] {
                if Some(other) != skip {
                    *scores.entry(other).or_insert(0.0) += weight * other_weight;
                }
            }
        }
        scores
    }
}

fn normalize(mut vector: ContentVector) -> ContentVector {
    vector.sort_unstable_by_key(|&(term_id, _)| term_id);
    let norm = vector.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
    if norm > 0.0 {
        for (_, w) in vector.iter_mut() {
            *w /= norm;
        }
    }
    vector
}

fn sparse_dot(a: &ContentVector, b: &ContentVector) -> f32 {
    let (mut i, mut j, mut dot) = (0, 0, 0.0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    dot
}
