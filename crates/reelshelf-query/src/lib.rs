//! Query cache layer for reelshelf.
//!
//! Wraps the TMDB client with a stale-while-revalidate cache keyed by
//! resource kind and request parameters, deduplicates concurrent identical
//! reads, and accumulates paged list results for infinite scrolling.

/// Keyed response cache with per-kind staleness windows.
pub mod cache;
mod catalog;
/// Page accumulation over a paged list query.
pub mod infinite;
mod policy;

pub use cache::{CacheState, QueryCache, QueryCacheConfig, QueryKey, QuerySnapshot};
pub use catalog::CachedCatalog;
pub use infinite::InfiniteQuery;
pub use policy::{ResourceKind, StalePolicy};
