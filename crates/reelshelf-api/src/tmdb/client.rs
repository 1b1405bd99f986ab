//! `TmdbClient` - TMDB API client implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::instrument;
use url::Url;

use super::api::{MoviePage, TmdbApi};
use super::pacer::RequestPacer;
use super::params::{DiscoverParams, QueryPairs, retain_present};
use super::types::{Configuration, Credits, GenreList, MovieDetail, VideoList};
use crate::CatalogError;

/// Default base URL for TMDB API v3.
const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3/";

/// Query parameter carrying the API key.
const API_KEY_PARAM: &str = "api_key";

/// TMDB API client.
///
/// Authenticates with a v3 API key sent as a query parameter. Without a key
/// the parameter is left out and the service decides whether to reject.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct TmdbClient {
    /// HTTP client.
    http_client: Client,
    /// Base URL for API requests.
    base_url: Url,
    /// v3 API key, if configured.
    api_key: Option<String>,
    /// Response language sent with every request, if configured.
    language: Option<String>,
    /// Request pacing.
    pacer: RequestPacer,
}

/// Builder for `TmdbClient`.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct TmdbClientBuilder {
    base_url: Option<Url>,
    api_key: Option<String>,
    language: Option<String>,
    user_agent: Option<String>,
    min_interval: Option<Duration>,
}

impl TmdbClientBuilder {
    /// Creates a new builder.
    const fn new() -> Self {
        Self {
            base_url: None,
            api_key: None,
            language: None,
            user_agent: None,
            min_interval: None,
        }
    }

    /// Overrides the base URL (for wiremock in tests).
    #[must_use]
    pub fn base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Sets the v3 API key (optional). Blank keys are ignored.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.api_key = (!key.trim().is_empty()).then_some(key);
        self
    }

    /// Sets the response language (e.g., "en-US").
    #[must_use]
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Sets the User-Agent (required).
    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Sets the minimum request interval (default: 25ms).
    #[must_use]
    pub const fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = Some(interval);
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// - `user_agent` is not set.
    /// - `reqwest::Client` build fails.
    pub fn build(self) -> Result<TmdbClient> {
        let user_agent = self.user_agent.context("user_agent is required")?;

        let base_url = if let Some(url) = self.base_url {
            url
        } else {
            Url::parse(DEFAULT_BASE_URL).context("invalid default base URL")?
        };

        if self.api_key.is_none() {
            tracing::warn!("No TMDB API key configured; requests are sent unauthenticated");
        }

        let pacer = self
            .min_interval
            .map_or_else(RequestPacer::default_interval, RequestPacer::new);

        let http_client = Client::builder()
            .user_agent(&user_agent)
            .gzip(true)
            .build()
            .context("failed to build HTTP client")?;

        Ok(TmdbClient {
            http_client,
            base_url,
            api_key: self.api_key,
            language: self.language.filter(|l| !l.trim().is_empty()),
            pacer,
        })
    }
}

impl TmdbClient {
    /// Creates a new builder.
    #[must_use]
    pub const fn builder() -> TmdbClientBuilder {
        TmdbClientBuilder::new()
    }

    /// Whether an API key is attached to requests.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.api_key.is_some()
    }

    /// Sends a paced GET request and decodes the JSON body.
    ///
    /// Empty parameters are dropped. Any non-success status becomes
    /// `CatalogError::RemoteService` with the raw body.
    #[instrument(skip_all, fields(path = %path))]
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: QueryPairs,
    ) -> Result<T, CatalogError> {
        self.pacer.wait().await;

        let url = self
            .base_url
            .join(path)
            .map_err(|e| CatalogError::InvalidRequest {
                path: String::from(path),
                message: e.to_string(),
            })?;

        let mut query = retain_present(query);
        if let Some(ref language) = self.language {
            query.push(("language", language.clone()));
        }
        tracing::debug!(url = %url, params = ?query, "TMDB API request");
        if let Some(ref key) = self.api_key {
            query.push((API_KEY_PARAM, key.clone()));
        }

        let response = self
            .http_client
            .get(url)
            .query(&query)
            .send()
            .await
            .map_err(|e| CatalogError::Network {
                path: String::from(path),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<failed to read body>"));
            tracing::debug!(status = status.as_u16(), "TMDB API error response");
            return Err(CatalogError::RemoteService {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(|e| CatalogError::Network {
            path: String::from(path),
            message: e.to_string(),
        })?;
        serde_json::from_str(&body).map_err(|e| CatalogError::InvalidResponse {
            path: String::from(path),
            message: e.to_string(),
        })
    }
}

impl TmdbApi for TmdbClient {
    #[instrument(skip_all)]
    async fn configuration(&self) -> Result<Configuration, CatalogError> {
        self.get_json("configuration", Vec::new()).await
    }

    #[instrument(skip_all)]
    async fn discover(&self, params: &DiscoverParams) -> Result<MoviePage, CatalogError> {
        self.get_json("discover/movie", params.to_query()).await
    }

    #[instrument(skip_all)]
    async fn search(&self, query: &str, page: u32) -> Result<MoviePage, CatalogError> {
        let query = vec![("query", String::from(query)), ("page", page.to_string())];
        self.get_json("search/movie", query).await
    }

    #[instrument(skip_all)]
    async fn movie(&self, movie_id: u64) -> Result<MovieDetail, CatalogError> {
        let path = format!("movie/{movie_id}");
        self.get_json(&path, Vec::new()).await
    }

    #[instrument(skip_all)]
    async fn recommendations(
        &self,
        movie_id: u64,
        page: u32,
    ) -> Result<MoviePage, CatalogError> {
        let path = format!("movie/{movie_id}/recommendations");
        self.get_json(&path, vec![("page", page.to_string())]).await
    }

    #[instrument(skip_all)]
    async fn popular(&self, page: u32) -> Result<MoviePage, CatalogError> {
        self.get_json("movie/popular", vec![("page", page.to_string())])
            .await
    }

    #[instrument(skip_all)]
    async fn top_rated(&self, page: u32) -> Result<MoviePage, CatalogError> {
        self.get_json("movie/top_rated", vec![("page", page.to_string())])
            .await
    }

    #[instrument(skip_all)]
    async fn credits(&self, movie_id: u64) -> Result<Credits, CatalogError> {
        let path = format!("movie/{movie_id}/credits");
        self.get_json(&path, Vec::new()).await
    }

    #[instrument(skip_all)]
    async fn videos(&self, movie_id: u64) -> Result<VideoList, CatalogError> {
        let path = format!("movie/{movie_id}/videos");
        self.get_json(&path, Vec::new()).await
    }

    #[instrument(skip_all)]
    async fn genres(&self) -> Result<GenreList, CatalogError> {
        self.get_json("genre/movie/list", Vec::new()).await
    }
}
