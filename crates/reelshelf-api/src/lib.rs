//! Catalog client library for reelshelf.
//!
//! Provides the TMDB API client, the shared catalog error type and the
//! image URL resolver.

mod error;

/// Image URL resolution over the TMDB image configuration.
pub mod image;

/// TMDB API client.
pub mod tmdb;

pub use error::CatalogError;
