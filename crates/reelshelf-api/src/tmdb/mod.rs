//! TMDB API client module.
//!
//! Handles HTTP requests to the TMDB API v3 movie endpoints
//! and decodes list, detail, credits, video and configuration data.

mod api;
mod client;
mod pacer;
mod params;
mod types;

#[allow(clippy::module_name_repetitions)]
pub use api::{LocalTmdbApi, MoviePage, TmdbApi};
#[allow(clippy::module_name_repetitions)]
pub use client::{TmdbClient, TmdbClientBuilder};
pub use params::{DEFAULT_SORT_BY, DiscoverParams, QueryPairs, join_ids};
pub use types::{
    CastMember, Configuration, Credits, CrewMember, Genre, GenreList, ImagesConfig, MovieDetail,
    MovieSummary, PaginatedResult, ProductionCompany, ProductionCountry, SpokenLanguage, Video,
    VideoList, select_trailer,
};
