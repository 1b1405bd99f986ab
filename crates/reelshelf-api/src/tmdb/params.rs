//! Request parameters for list endpoints.

/// Default `sort_by` for `discover/movie`.
pub const DEFAULT_SORT_BY: &str = "popularity.desc";

/// A query-string parameter list. Values that are empty are dropped before sending.
pub type QueryPairs = Vec<(&'static str, String)>;

/// Parameters for `discover/movie`.
///
/// Every filter is optional; unset filters are left out of the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoverParams {
    /// Result page (default: 1).
    pub page: Option<u32>,
    /// Sort order (default: `popularity.desc`).
    pub sort_by: Option<String>,
    /// Comma-separated genre IDs.
    pub with_genres: Option<String>,
    /// Filter by primary release year.
    pub primary_release_year: Option<u32>,
    /// Minimum vote average.
    pub vote_average_gte: Option<f64>,
    /// Maximum vote average.
    pub vote_average_lte: Option<f64>,
    /// Original language (ISO 639-1).
    pub with_original_language: Option<String>,
}

impl DiscoverParams {
    /// Creates empty params (first page, default sort).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the result page.
    #[must_use]
    pub const fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Sets the sort order.
    #[must_use]
    pub fn sort_by(mut self, sort_by: impl Into<String>) -> Self {
        self.sort_by = Some(sort_by.into());
        self
    }

    /// Filters by genre IDs. An empty slice clears the filter.
    #[must_use]
    pub fn genres(mut self, ids: &[u32]) -> Self {
        self.with_genres = join_ids(ids);
        self
    }

    /// Filters by primary release year.
    #[must_use]
    pub const fn year(mut self, year: u32) -> Self {
        self.primary_release_year = Some(year);
        self
    }

    /// Sets the minimum vote average.
    #[must_use]
    pub const fn min_rating(mut self, rating: f64) -> Self {
        self.vote_average_gte = Some(rating);
        self
    }

    /// Sets the maximum vote average.
    #[must_use]
    pub const fn max_rating(mut self, rating: f64) -> Self {
        self.vote_average_lte = Some(rating);
        self
    }

    /// Filters by original language.
    #[must_use]
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.with_original_language = Some(language.into());
        self
    }

    /// Builds the query string for this request, including `page` and `sort_by` defaults.
    #[must_use]
    pub fn to_query(&self) -> QueryPairs {
        let mut query = self.filter_query();
        query.insert(0, ("page", self.page.unwrap_or(1).to_string()));
        query
    }

    /// Builds the query string without `page`.
    ///
    /// Identifies the result set independent of pagination.
    #[must_use]
    pub fn filter_query(&self) -> QueryPairs {
        let sort_by = self
            .sort_by
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_SORT_BY);

        let mut query: QueryPairs = vec![("sort_by", String::from(sort_by))];
        if let Some(ref genres) = self.with_genres {
            query.push(("with_genres", genres.clone()));
        }
        if let Some(year) = self.primary_release_year {
            query.push(("primary_release_year", year.to_string()));
        }
        if let Some(gte) = self.vote_average_gte {
            query.push(("vote_average.gte", gte.to_string()));
        }
        if let Some(lte) = self.vote_average_lte {
            query.push(("vote_average.lte", lte.to_string()));
        }
        if let Some(ref language) = self.with_original_language {
            query.push(("with_original_language", language.clone()));
        }
        retain_present(query)
    }
}

/// Joins genre IDs into the `with_genres` format. Returns `None` for an empty slice.
#[must_use]
pub fn join_ids(ids: &[u32]) -> Option<String> {
    if ids.is_empty() {
        return None;
    }
    Some(
        ids.iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// Drops parameters whose value is empty or whitespace.
#[must_use]
pub fn retain_present(mut query: QueryPairs) -> QueryPairs {
    query.retain(|(_, value)| !value.trim().is_empty());
    query
}
