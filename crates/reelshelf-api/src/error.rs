//! `CatalogError` - failures surfaced by catalog reads.

use serde::Deserialize;
use thiserror::Error;

/// Error returned by every catalog read.
///
/// The type is `Clone` so that a single failed fetch can be handed to every
/// caller that was waiting on the same deduplicated request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// The service answered with a non-success status.
    #[error("TMDB API error (HTTP {status}): {body}")]
    RemoteService {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// No response was received (connection, TLS or transport failure).
    #[error("request failed: {path}: {message}")]
    Network {
        /// Endpoint path.
        path: String,
        /// Transport error description.
        message: String,
    },

    /// The service answered with success but the body did not match the expected shape.
    #[error("failed to decode JSON response: {path}: {message}")]
    InvalidResponse {
        /// Endpoint path.
        path: String,
        /// Decoder error description.
        message: String,
    },

    /// The request could not be assembled.
    #[error("failed to build request: {path}: {message}")]
    InvalidRequest {
        /// Endpoint path.
        path: String,
        /// Build error description.
        message: String,
    },

    /// The movie has no cached or fetched detail.
    #[error("movie {0} has no cached detail")]
    NotFoundLocally(u64),
}

/// TMDB API error response body.
#[derive(Debug, Clone, Deserialize)]
struct ServiceErrorBody {
    /// TMDB error code.
    status_code: u32,
    /// Error message.
    status_message: String,
}

impl CatalogError {
    /// HTTP status of a `RemoteService` error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::RemoteService { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Service-provided `(status_code, status_message)` when the error body is a TMDB error document.
    #[must_use]
    pub fn service_message(&self) -> Option<(u32, String)> {
        let Self::RemoteService { body, .. } = self else {
            return None;
        };
        serde_json::from_str::<ServiceErrorBody>(body)
            .ok()
            .map(|b| (b.status_code, b.status_message))
    }
}
