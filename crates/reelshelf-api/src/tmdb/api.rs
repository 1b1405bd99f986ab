//! `TmdbApi` trait definition.
#![allow(clippy::future_not_send)]

use super::params::DiscoverParams;
use super::types::{
    Configuration, Credits, GenreList, MovieDetail, MovieSummary, PaginatedResult, VideoList,
};
use crate::CatalogError;

/// A page of movies from a list endpoint.
pub type MoviePage = PaginatedResult<MovieSummary>;

/// TMDB catalog operations.
///
/// All operations are read-only and idempotent. Abstracts the HTTP client
/// so the query cache can be driven by fakes in tests.
/// Uses `trait_variant::make` to generate a `Send`-bound async trait.
#[allow(clippy::module_name_repetitions)]
#[trait_variant::make(TmdbApi: Send)]
pub trait LocalTmdbApi {
    /// Fetches the image server configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP request or JSON parsing fails.
    async fn configuration(&self) -> Result<Configuration, CatalogError>;

    /// Lists movies matching the discover filters.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP request or JSON parsing fails.
    async fn discover(&self, params: &DiscoverParams) -> Result<MoviePage, CatalogError>;

    /// Searches movies by title.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP request or JSON parsing fails.
    async fn search(&self, query: &str, page: u32) -> Result<MoviePage, CatalogError>;

    /// Fetches movie details.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP request or JSON parsing fails.
    async fn movie(&self, movie_id: u64) -> Result<MovieDetail, CatalogError>;

    /// Lists movies recommended from the given one.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP request or JSON parsing fails.
    async fn recommendations(&self, movie_id: u64, page: u32)
    -> Result<MoviePage, CatalogError>;

    /// Lists popular movies.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP request or JSON parsing fails.
    async fn popular(&self, page: u32) -> Result<MoviePage, CatalogError>;

    /// Lists top-rated movies.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP request or JSON parsing fails.
    async fn top_rated(&self, page: u32) -> Result<MoviePage, CatalogError>;

    /// Fetches cast and crew.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP request or JSON parsing fails.
    async fn credits(&self, movie_id: u64) -> Result<Credits, CatalogError>;

    /// Fetches trailers, teasers and clips.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP request or JSON parsing fails.
    async fn videos(&self, movie_id: u64) -> Result<VideoList, CatalogError>;

    /// Lists all movie genres.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP request or JSON parsing fails.
    async fn genres(&self) -> Result<GenreList, CatalogError>;
}
