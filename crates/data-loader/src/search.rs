//! Title lookup over the catalog.

use crate::types::{DataIndex, Movie};

/// Strip a trailing "(YYYY)" and lowercase the rest
fn normalize_title(title: &str) -> String {
    let trimmed = title.trim();
    let without_year = match trimmed.rfind('(') {
        Some(pos) if crate::parser::extract_year_from_title(&trimmed[pos..]).is_some() => {
            trimmed[..pos].trim_end()
        }
        _ => trimmed,
    };
    without_year.to_lowercase()
}

impl DataIndex {
    /// Find a movie by title
    ///
    /// Tried in order:
    /// 1. exact, case-insensitive match on the full title
    /// 2. match with the "(YYYY)" suffix removed on both sides
    /// 3. the shortest title containing the query
    ///
    /// Ties at every step go to the lowest movie id.
    pub fn find_by_title(&self, query: &str) -> Option<&Movie> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }
        let lowered = query.to_lowercase();

        let mut movies: Vec<&Movie> = self.movies.values().collect();
        movies.sort_unstable_by_key(|m| m.id);

        if let Some(movie) = movies.iter().find(|m| m.title.to_lowercase() == lowered) {
            return Some(movie);
        }

        let stripped = normalize_title(query);
        if let Some(movie) = movies.iter().find(|m| normalize_title(&m.title) == stripped) {
            return Some(movie);
        }

        movies
            .into_iter()
            .filter(|m| m.title.to_lowercase().contains(&lowered))
            .min_by_key(|m| (m.title.len(), m.id))
    }

    /// Every movie whose title contains `query`, shortest titles first
    pub fn search_titles(&self, query: &str, limit: usize) -> Vec<&Movie> {
        let lowered = query.trim().to_lowercase();
        if lowered.is_empty() {
            return Vec::new();
        }
        let mut hits: Vec<&Movie> = self
            .movies
            .values()
            .filter(|m| m.title.to_lowercase().contains(&lowered))
            .collect();
        hits.sort_unstable_by_key(|m| (m.title.len(), m.id));
        hits.truncate(limit);
        hits
    }
}

#[cfg(test)]
mod tests {
    use crate::types::{DataIndex, Genre, Movie};

    fn create_test_index() -> DataIndex {
        let mut index = DataIndex::new();
        index.insert_movie(Movie::new(1, "Toy Story (1995)", Some(1995), &[Genre::Animation]));
        index.insert_movie(Movie::new(2, "Toy Story 2 (1999)", Some(1999), &[Genre::Animation]));
        index.insert_movie(Movie::new(3, "Heat (1995)", Some(1995), &[Genre::Action]));
        index.insert_movie(Movie::new(4, "Heat Wave (2001)", Some(2001), &[Genre::Drama]));
        index
    }

    #[test]
    fn test_exact_title_match() {
        let index = create_test_index();
        assert_eq!(index.find_by_title("toy story 2 (1999)").unwrap().id, 2);
    }

    #[test]
    fn test_title_match_without_year() {
        let index = create_test_index();
        assert_eq!(index.find_by_title("Heat").unwrap().id, 3);
        assert_eq!(index.find_by_title("Toy Story").unwrap().id, 1);
    }

    #[test]
    fn test_partial_match_prefers_shortest() {
        let index = create_test_index();
        assert_eq!(index.find_by_title("story").unwrap().id, 1);
        assert!(index.find_by_title("casablanca").is_none());
        assert!(index.find_by_title("   ").is_none());
    }

    #[test]
    fn test_search_titles_limit() {
        let index = create_test_index();
        let hits = index.search_titles("heat", 10);
        assert_eq!(hits.iter().map(|m| m.id).collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(index.search_titles("heat", 1).len(), 1);
    }
}
