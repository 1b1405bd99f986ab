//! Resource kinds and their staleness policies.

use std::fmt;
use std::time::Duration;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Class of remote resource. Selects the staleness policy of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// Image server configuration.
    Configuration,
    /// Movie genre list.
    Genres,
    /// Movie detail by id.
    MovieDetail,
    /// Cast and crew by movie id.
    Credits,
    /// Videos by movie id.
    Videos,
    /// Popular movies.
    Popular,
    /// Top-rated movies.
    TopRated,
    /// Recommendations for a movie.
    Recommendations,
    /// Filtered discover listing, including "for you".
    Discover,
    /// Title search.
    Search,
}

/// How long an entry stays fresh, and how long an unused entry is retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalePolicy {
    /// Age after which a value is served stale and revalidated.
    pub stale_after: Duration,
    /// Inactivity after which the entry is evicted.
    pub gc_after: Duration,
}

impl StalePolicy {
    const fn new(stale_secs: u64, gc_secs: u64) -> Self {
        Self {
            stale_after: Duration::from_secs(stale_secs),
            gc_after: Duration::from_secs(gc_secs),
        }
    }
}

impl ResourceKind {
    /// Staleness policy for this kind.
    #[must_use]
    pub const fn policy(self) -> StalePolicy {
        match self {
            Self::Configuration => StalePolicy::new(DAY, 7 * DAY),
            Self::Genres => StalePolicy::new(DAY, 2 * DAY),
            Self::MovieDetail | Self::Credits | Self::Videos => {
                StalePolicy::new(15 * MINUTE, HOUR)
            }
            Self::Popular | Self::TopRated | Self::Recommendations => {
                StalePolicy::new(10 * MINUTE, HOUR)
            }
            Self::Discover | Self::Search => StalePolicy::new(5 * MINUTE, 30 * MINUTE),
        }
    }

    /// Short name used in cache keys and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Genres => "genres",
            Self::MovieDetail => "movie",
            Self::Credits => "credits",
            Self::Videos => "videos",
            Self::Popular => "popular",
            Self::TopRated => "top_rated",
            Self::Recommendations => "recommendations",
            Self::Discover => "discover",
            Self::Search => "search",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staleness_windows() {
        // Arrange & Act & Assert
        let secs = |kind: ResourceKind| kind.policy().stale_after.as_secs();
        assert_eq!(secs(ResourceKind::Configuration), 86_400);
        assert_eq!(secs(ResourceKind::Genres), 86_400);
        assert_eq!(secs(ResourceKind::MovieDetail), 900);
        assert_eq!(secs(ResourceKind::Credits), 900);
        assert_eq!(secs(ResourceKind::Videos), 900);
        assert_eq!(secs(ResourceKind::Popular), 600);
        assert_eq!(secs(ResourceKind::TopRated), 600);
        assert_eq!(secs(ResourceKind::Discover), 300);
        assert_eq!(secs(ResourceKind::Search), 300);
    }

    #[test]
    fn test_configuration_retained_for_a_week() {
        // Arrange & Act
        let policy = ResourceKind::Configuration.policy();

        // Assert
        assert_eq!(policy.gc_after, Duration::from_secs(7 * 86_400));
    }

    #[test]
    fn test_gc_window_exceeds_stale_window() {
        // Arrange
        let kinds = [
            ResourceKind::Configuration,
            ResourceKind::Genres,
            ResourceKind::MovieDetail,
            ResourceKind::Credits,
            ResourceKind::Videos,
            ResourceKind::Popular,
            ResourceKind::TopRated,
            ResourceKind::Recommendations,
            ResourceKind::Discover,
            ResourceKind::Search,
        ];

        // Act & Assert
        for kind in kinds {
            let policy = kind.policy();
            assert!(policy.gc_after > policy.stale_after, "{kind}");
        }
    }
}
