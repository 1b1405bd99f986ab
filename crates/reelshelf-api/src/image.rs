//! Turns relative TMDB image paths into absolute URLs.
//!
//! The image server base URL comes from the `configuration` endpoint. Until
//! that response has been installed, URLs are built from the well-known
//! default template `https://image.tmdb.org/t/p/{size}{path}`.

use std::sync::{PoisonError, RwLock};

use crate::tmdb::ImagesConfig;

/// URL returned when a movie or person has no image.
pub const PLACEHOLDER_URL: &str = "https://via.placeholder.com/500x750?text=No+Image";

/// Base URL used before the configuration is installed.
const FALLBACK_BASE_URL: &str = "https://image.tmdb.org/t/p/";

/// Process-wide resolver shared by every view.
static GLOBAL: ImageResolver = ImageResolver::new();

/// Image category, selecting which size table applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// Movie poster.
    Poster,
    /// Wide background image.
    Backdrop,
    /// Company logo.
    Logo,
    /// Person headshot.
    Profile,
    /// Video still.
    Still,
}

/// Image URL builder over an optionally-installed image configuration.
///
/// Lifecycle: empty at startup, installed (and replaced on refresh) by the
/// configuration query, read by every URL lookup.
#[derive(Debug)]
pub struct ImageResolver {
    config: RwLock<Option<ImagesConfig>>,
}

impl Default for ImageResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageResolver {
    /// Creates a resolver with no configuration installed.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            config: RwLock::new(None),
        }
    }

    /// The process-wide resolver.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Installs (or replaces) the image configuration.
    pub fn install(&self, config: ImagesConfig) {
        let mut slot = self.config.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(config);
        tracing::debug!("Image configuration installed");
    }

    /// Whether a configuration has been installed.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Builds the absolute URL for an image.
    ///
    /// - Missing or empty `path` yields [`PLACEHOLDER_URL`].
    /// - Before configuration, the default template is used.
    /// - Afterwards `secure_base_url` is preferred over `base_url`.
    #[must_use]
    pub fn url(&self, path: Option<&str>, size: &str, kind: ImageKind) -> String {
        let Some(path) = path.filter(|p| !p.is_empty()) else {
            return String::from(PLACEHOLDER_URL);
        };

        let config = self.config.read().unwrap_or_else(PoisonError::into_inner);
        let Some(config) = config.as_ref() else {
            return format!("{FALLBACK_BASE_URL}{size}{path}");
        };

        let base = if config.secure_base_url.is_empty() {
            config.base_url.as_str()
        } else {
            config.secure_base_url.as_str()
        };
        if base.is_empty() {
            return format!("{FALLBACK_BASE_URL}{size}{path}");
        }

        let table = size_table(config, kind);
        if !table.is_empty() && !table.iter().any(|s| s == size) {
            tracing::debug!(size, ?kind, "Size not advertised by image configuration");
        }

        format!("{base}{size}{path}")
    }
}

/// The size table of `config` that applies to `kind`.
fn size_table(config: &ImagesConfig, kind: ImageKind) -> &[String] {
    match kind {
        ImageKind::Poster => &config.poster_sizes,
        ImageKind::Backdrop => &config.backdrop_sizes,
        ImageKind::Logo => &config.logo_sizes,
        ImageKind::Profile => &config.profile_sizes,
        ImageKind::Still => &config.still_sizes,
    }
}

/// Poster size token for a container of `width` pixels.
#[must_use]
pub const fn poster_size(width: u32) -> &'static str {
    match width {
        0..=92 => "w92",
        93..=154 => "w154",
        155..=185 => "w185",
        186..=342 => "w342",
        343..=500 => "w500",
        501..=780 => "w780",
        _ => "original",
    }
}

/// Backdrop size token for a container of `width` pixels.
#[must_use]
pub const fn backdrop_size(width: u32) -> &'static str {
    match width {
        0..=300 => "w300",
        301..=780 => "w780",
        781..=1280 => "w1280",
        _ => "original",
    }
}
