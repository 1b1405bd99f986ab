//! "For you" discover parameters derived from the watchlist.

use reelshelf_api::tmdb::{DEFAULT_SORT_BY, DiscoverParams, MovieSummary, join_ids};

/// Maximum number of genres in the "for you" filter.
pub const FOR_YOU_GENRE_LIMIT: usize = 3;

/// Distinct genre ids across `movies` in first-seen order, at most
/// [`FOR_YOU_GENRE_LIMIT`] of them.
#[must_use]
pub fn for_you_genres(movies: &[MovieSummary]) -> Vec<u32> {
    let mut genres: Vec<u32> = Vec::with_capacity(FOR_YOU_GENRE_LIMIT);
    for id in movies.iter().flat_map(|m| m.genre_ids.iter().copied()) {
        if genres.len() == FOR_YOU_GENRE_LIMIT {
            break;
        }
        if !genres.contains(&id) {
            genres.push(id);
        }
    }
    genres
}

/// Discover parameters for the "for you" listing.
///
/// Without any watchlist genres the genre filter is omitted and the
/// listing falls back to plain popularity order.
#[must_use]
pub fn for_you_params(movies: &[MovieSummary]) -> DiscoverParams {
    DiscoverParams {
        with_genres: join_ids(&for_you_genres(movies)),
        sort_by: Some(String::from(DEFAULT_SORT_BY)),
        ..DiscoverParams::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_genres(id: u64, genre_ids: &[u32]) -> MovieSummary {
        MovieSummary {
            id,
            title: format!("movie {id}"),
            original_title: None,
            overview: String::new(),
            poster_path: None,
            backdrop_path: None,
            release_date: None,
            genre_ids: genre_ids.to_vec(),
            vote_average: 0.0,
            vote_count: 0,
            popularity: 0.0,
            original_language: String::from("en"),
            adult: false,
        }
    }

    #[test]
    fn test_first_three_distinct_in_encounter_order() {
        // Arrange
        let movies = [
            with_genres(1, &[12, 28]),
            with_genres(2, &[12, 16]),
            with_genres(3, &[99]),
        ];

        // Act
        let params = for_you_params(&movies);

        // Assert
        assert_eq!(for_you_genres(&movies), vec![12, 28, 16]);
        assert_eq!(params.with_genres.as_deref(), Some("12,28,16"));
    }

    #[test]
    fn test_empty_watchlist_has_no_genre_filter() {
        // Arrange & Act
        let params = for_you_params(&[]);

        // Assert
        assert!(params.with_genres.is_none());
        assert!(
            !params
                .to_query()
                .iter()
                .any(|(name, _)| *name == "with_genres")
        );
    }

    #[test]
    fn test_movies_without_genres_have_no_genre_filter() {
        // Arrange
        let movies = [with_genres(1, &[]), with_genres(2, &[])];

        // Act & Assert
        assert!(for_you_genres(&movies).is_empty());
        assert!(for_you_params(&movies).with_genres.is_none());
    }

    #[test]
    fn test_fewer_than_limit() {
        // Arrange
        let movies = [with_genres(1, &[35]), with_genres(2, &[35])];

        // Act & Assert
        assert_eq!(for_you_params(&movies).with_genres.as_deref(), Some("35"));
    }

    #[test]
    fn test_sorted_by_popularity() {
        // Arrange & Act
        let params = for_you_params(&[with_genres(1, &[18])]);

        // Assert
        assert_eq!(params.sort_by.as_deref(), Some("popularity.desc"));
        assert_eq!(params.page, None);
    }
}
