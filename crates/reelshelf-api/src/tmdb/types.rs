//! TMDB API response types.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};

/// Reads an optional string, treating `""` the same as `null`.
///
/// TMDB sends empty strings for unknown release dates, taglines and homepages.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

/// Extracts the year from a `YYYY-MM-DD` date.
fn year_of(date: Option<&str>) -> Option<i32> {
    date.and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .map(|d| d.year())
}

// --- Pagination ---

/// A page of a paginated list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedResult<T> {
    /// Current page number (1-indexed).
    pub page: u32,
    /// Items on this page.
    pub results: Vec<T>,
    /// Total number of pages.
    #[serde(default)]
    pub total_pages: u32,
    /// Total number of results.
    #[serde(default)]
    pub total_results: u32,
}

impl<T> PaginatedResult<T> {
    /// Whether the server reports pages after this one.
    #[must_use]
    pub const fn has_next_page(&self) -> bool {
        self.page < self.total_pages
    }

    /// The page number following this one, if any.
    #[must_use]
    pub const fn next_page(&self) -> Option<u32> {
        if self.has_next_page() {
            self.page.checked_add(1)
        } else {
            None
        }
    }
}

// --- Movies ---

/// A movie as returned by list endpoints (popular, discover, search, ...).
///
/// This is also the record stored in the watchlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieSummary {
    /// TMDB movie ID.
    pub id: u64,
    /// Localized title.
    pub title: String,
    /// Original title.
    #[serde(default)]
    pub original_title: Option<String>,
    /// Overview text.
    #[serde(default)]
    pub overview: String,
    /// Poster image path.
    #[serde(default)]
    pub poster_path: Option<String>,
    /// Backdrop image path.
    #[serde(default)]
    pub backdrop_path: Option<String>,
    /// Release date (YYYY-MM-DD).
    #[serde(default, deserialize_with = "empty_as_none")]
    pub release_date: Option<String>,
    /// Genre IDs.
    #[serde(default)]
    pub genre_ids: Vec<u32>,
    /// Vote average (0-10).
    #[serde(default)]
    pub vote_average: f64,
    /// Vote count.
    #[serde(default)]
    pub vote_count: u32,
    /// Popularity score.
    #[serde(default)]
    pub popularity: f64,
    /// Original language (ISO 639-1).
    #[serde(default)]
    pub original_language: String,
    /// Adult flag.
    #[serde(default)]
    pub adult: bool,
}

impl MovieSummary {
    /// Release year parsed from `release_date`.
    #[must_use]
    pub fn release_year(&self) -> Option<i32> {
        year_of(self.release_date.as_deref())
    }
}

/// Genre entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    /// Genre ID.
    pub id: u32,
    /// Genre name.
    pub name: String,
}

/// Response from `genre/movie/list`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GenreList {
    /// All movie genres.
    pub genres: Vec<Genre>,
}

impl GenreList {
    /// Looks up a genre name by ID.
    #[must_use]
    pub fn name_of(&self, id: u32) -> Option<&str> {
        self.genres
            .iter()
            .find(|g| g.id == id)
            .map(|g| g.name.as_str())
    }
}

/// Production company.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductionCompany {
    /// Company ID.
    pub id: u64,
    /// Company name.
    pub name: String,
    /// Logo image path.
    #[serde(default)]
    pub logo_path: Option<String>,
}

/// Production country.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductionCountry {
    /// ISO 3166-1 code.
    pub iso_3166_1: String,
    /// Country name.
    pub name: String,
}

/// Spoken language.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpokenLanguage {
    /// ISO 639-1 code.
    pub iso_639_1: String,
    /// Language name.
    pub name: String,
}

/// Response from `movie/{movie_id}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MovieDetail {
    /// TMDB movie ID.
    pub id: u64,
    /// Localized title.
    pub title: String,
    /// Original title.
    #[serde(default)]
    pub original_title: Option<String>,
    /// Overview text.
    #[serde(default)]
    pub overview: String,
    /// Poster image path.
    #[serde(default)]
    pub poster_path: Option<String>,
    /// Backdrop image path.
    #[serde(default)]
    pub backdrop_path: Option<String>,
    /// Release date (YYYY-MM-DD).
    #[serde(default, deserialize_with = "empty_as_none")]
    pub release_date: Option<String>,
    /// Vote average (0-10).
    #[serde(default)]
    pub vote_average: f64,
    /// Vote count.
    #[serde(default)]
    pub vote_count: u32,
    /// Popularity score.
    #[serde(default)]
    pub popularity: f64,
    /// Original language (ISO 639-1).
    #[serde(default)]
    pub original_language: String,
    /// Adult flag.
    #[serde(default)]
    pub adult: bool,
    /// Genres in display order.
    #[serde(default)]
    pub genres: Vec<Genre>,
    /// Runtime in minutes.
    #[serde(default)]
    pub runtime: Option<u32>,
    /// Budget in USD.
    #[serde(default)]
    pub budget: Option<u64>,
    /// Revenue in USD.
    #[serde(default)]
    pub revenue: Option<u64>,
    /// Release status (e.g., "Released").
    #[serde(default, deserialize_with = "empty_as_none")]
    pub status: Option<String>,
    /// Tagline.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub tagline: Option<String>,
    /// Homepage URL.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub homepage: Option<String>,
    /// IMDb ID.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub imdb_id: Option<String>,
    /// Production companies.
    #[serde(default)]
    pub production_companies: Vec<ProductionCompany>,
    /// Production countries.
    #[serde(default)]
    pub production_countries: Vec<ProductionCountry>,
    /// Spoken languages.
    #[serde(default)]
    pub spoken_languages: Vec<SpokenLanguage>,
}

impl MovieDetail {
    /// Release year parsed from `release_date`.
    #[must_use]
    pub fn release_year(&self) -> Option<i32> {
        year_of(self.release_date.as_deref())
    }

    /// Projects the detail into the list-endpoint shape.
    ///
    /// `genre_ids` follows the order of `genres`.
    #[must_use]
    pub fn to_summary(&self) -> MovieSummary {
        MovieSummary {
            id: self.id,
            title: self.title.clone(),
            original_title: self.original_title.clone(),
            overview: self.overview.clone(),
            poster_path: self.poster_path.clone(),
            backdrop_path: self.backdrop_path.clone(),
            release_date: self.release_date.clone(),
            genre_ids: self.genres.iter().map(|g| g.id).collect(),
            vote_average: self.vote_average,
            vote_count: self.vote_count,
            popularity: self.popularity,
            original_language: self.original_language.clone(),
            adult: self.adult,
        }
    }
}

// --- Credits ---

/// A cast member.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CastMember {
    /// Person ID.
    pub id: u64,
    /// Person name.
    pub name: String,
    /// Character played.
    #[serde(default)]
    pub character: String,
    /// Profile image path.
    #[serde(default)]
    pub profile_path: Option<String>,
    /// Billing order.
    #[serde(default)]
    pub order: u32,
}

/// A crew member.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CrewMember {
    /// Person ID.
    pub id: u64,
    /// Person name.
    pub name: String,
    /// Job title (e.g., "Director").
    #[serde(default)]
    pub job: String,
    /// Department.
    #[serde(default)]
    pub department: String,
    /// Profile image path.
    #[serde(default)]
    pub profile_path: Option<String>,
}

/// Response from `movie/{movie_id}/credits`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credits {
    /// Movie ID.
    #[serde(default)]
    pub id: Option<u64>,
    /// Cast in billing order.
    #[serde(default)]
    pub cast: Vec<CastMember>,
    /// Crew.
    #[serde(default)]
    pub crew: Vec<CrewMember>,
}

impl Credits {
    /// Names of crew members credited as director.
    #[must_use]
    pub fn directors(&self) -> Vec<&str> {
        self.crew
            .iter()
            .filter(|c| c.job == "Director")
            .map(|c| c.name.as_str())
            .collect()
    }
}

// --- Videos ---

/// A video attached to a movie.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Video {
    /// Video ID.
    pub id: String,
    /// Platform-specific key.
    pub key: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Hosting site (e.g., "YouTube").
    pub site: String,
    /// Video type (e.g., "Trailer", "Teaser").
    #[serde(rename = "type")]
    pub kind: String,
    /// Published by the studio.
    #[serde(default)]
    pub official: bool,
}

impl Video {
    /// Watch URL for YouTube-hosted videos.
    #[must_use]
    pub fn youtube_url(&self) -> Option<String> {
        (self.site == "YouTube").then(|| format!("https://www.youtube.com/watch?v={}", self.key))
    }

    /// Whether this is a YouTube-hosted trailer.
    fn is_youtube_trailer(&self) -> bool {
        self.kind == "Trailer" && self.site == "YouTube"
    }
}

/// Response from `movie/{movie_id}/videos`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VideoList {
    /// Movie ID.
    #[serde(default)]
    pub id: Option<u64>,
    /// Videos.
    #[serde(default)]
    pub results: Vec<Video>,
}

impl VideoList {
    /// See [`select_trailer`].
    #[must_use]
    pub fn trailer(&self) -> Option<&Video> {
        select_trailer(&self.results)
    }
}

/// Picks the trailer to show for a movie.
///
/// Prefers an official YouTube trailer, then any YouTube trailer.
/// Returns `None` when no YouTube-hosted trailer exists.
#[must_use]
pub fn select_trailer(videos: &[Video]) -> Option<&Video> {
    videos
        .iter()
        .find(|v| v.is_youtube_trailer() && v.official)
        .or_else(|| videos.iter().find(|v| v.is_youtube_trailer()))
}

// --- Configuration ---

/// Image server settings from `configuration`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ImagesConfig {
    /// HTTP base URL.
    #[serde(default)]
    pub base_url: String,
    /// HTTPS base URL.
    #[serde(default)]
    pub secure_base_url: String,
    /// Backdrop size tokens.
    #[serde(default)]
    pub backdrop_sizes: Vec<String>,
    /// Logo size tokens.
    #[serde(default)]
    pub logo_sizes: Vec<String>,
    /// Poster size tokens.
    #[serde(default)]
    pub poster_sizes: Vec<String>,
    /// Profile size tokens.
    #[serde(default)]
    pub profile_sizes: Vec<String>,
    /// Still size tokens.
    #[serde(default)]
    pub still_sizes: Vec<String>,
}

/// Response from `configuration`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Configuration {
    /// Image server settings.
    pub images: ImagesConfig,
    /// Keys whose change invalidates cached data.
    #[serde(default)]
    pub change_keys: Vec<String>,
}
