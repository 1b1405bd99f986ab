//! Keyed cache of remote reads.
//!
//! Each entry moves through `Idle -> Fetching -> Fresh | Error`, and a
//! `Fresh` entry turns `Stale` once its kind's staleness window elapses.
//! Stale values are returned immediately while a single background fetch
//! revalidates them. Concurrent callers for the same key share one
//! underlying fetch.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use reelshelf_api::CatalogError;
use tokio::task::JoinError;
use tokio::time::Instant;

use crate::policy::ResourceKind;

/// Delay before the single automatic retry.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// How long a failed entry answers with its error before fetching again.
const DEFAULT_ERROR_COOLDOWN: Duration = Duration::from_secs(5);

/// A fetch shared between every caller waiting on the same key.
type SharedFetch<V> = Shared<BoxFuture<'static, Result<Arc<V>, CatalogError>>>;

/// Retry and cooldown timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryCacheConfig {
    /// Delay between a failed fetch and its retry.
    pub retry_delay: Duration,
    /// Period after a failure during which the error is served without refetching.
    pub error_cooldown: Duration,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            error_cooldown: DEFAULT_ERROR_COOLDOWN,
        }
    }
}

/// Identifies one cacheable request: resource kind plus every parameter
/// that affects the response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    kind: ResourceKind,
    params: BTreeMap<String, String>,
}

impl QueryKey {
    /// Creates a key with no parameters.
    #[must_use]
    pub const fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            params: BTreeMap::new(),
        }
    }

    /// Creates a key from query-string pairs. Empty values are skipped.
    #[must_use]
    pub fn from_pairs<'a, I>(kind: ResourceKind, pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        pairs
            .into_iter()
            .fold(Self::new(kind), |key, (name, value)| key.param(name, value))
    }

    /// Adds a parameter. Empty values are skipped.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        let value = value.to_string();
        if !value.trim().is_empty() {
            self.params.insert(name.into(), value);
        }
        self
    }

    /// Sets the `page` parameter.
    #[must_use]
    pub fn with_page(self, page: u32) -> Self {
        self.param("page", page)
    }

    /// Resource kind of this key.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Parameters in sorted order.
    #[must_use]
    pub const fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.as_str())?;
        for (i, (name, value)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{name}={value}")?;
        }
        Ok(())
    }
}

/// Observable state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Never fetched, or evicted.
    Idle,
    /// A fetch is in flight.
    Fetching,
    /// Value is within its staleness window.
    Fresh,
    /// Value is past its staleness window.
    Stale,
    /// The last fetch failed after its retry.
    Error,
}

/// Point-in-time view of one entry.
#[derive(Debug, Clone)]
pub struct QuerySnapshot<V> {
    /// Entry state.
    pub state: CacheState,
    /// Last successfully fetched value, if any.
    pub data: Option<Arc<V>>,
    /// Last error, if the most recent fetch failed.
    pub error: Option<CatalogError>,
}

impl<V> QuerySnapshot<V> {
    /// Whether a fetch is in flight.
    #[must_use]
    pub fn is_fetching(&self) -> bool {
        self.state == CacheState::Fetching
    }
}

/// One cache entry.
struct Slot<V> {
    value: Option<Arc<V>>,
    fetched_at: Option<Instant>,
    error: Option<CatalogError>,
    error_at: Option<Instant>,
    last_access: Instant,
    in_flight: Option<SharedFetch<V>>,
}

impl<V> Slot<V> {
    const fn new(now: Instant) -> Self {
        Self {
            value: None,
            fetched_at: None,
            error: None,
            error_at: None,
            last_access: now,
            in_flight: None,
        }
    }

    fn is_fresh(&self, kind: ResourceKind, now: Instant) -> bool {
        self.fetched_at
            .is_some_and(|at| now.duration_since(at) < kind.policy().stale_after)
    }

    /// The error to serve while its cooldown is still running.
    fn cooling_error(&self, cooldown: Duration, now: Instant) -> Option<&CatalogError> {
        let at = self.error_at?;
        if now.duration_since(at) < cooldown {
            self.error.as_ref()
        } else {
            None
        }
    }

    fn state(&self, kind: ResourceKind, now: Instant) -> CacheState {
        if self.in_flight.is_some() {
            CacheState::Fetching
        } else if self.error.is_some() {
            CacheState::Error
        } else if self.value.is_some() && self.is_fresh(kind, now) {
            CacheState::Fresh
        } else if self.value.is_some() {
            CacheState::Stale
        } else {
            CacheState::Idle
        }
    }
}

/// What a lookup resolved to while the lock was held.
enum Plan<V> {
    Ready(Result<Arc<V>, CatalogError>),
    Await(SharedFetch<V>),
}

struct Inner<V> {
    config: QueryCacheConfig,
    entries: Mutex<HashMap<QueryKey, Slot<V>>>,
}

impl<V> Inner<V> {
    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Slot<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the outcome of a finished fetch.
    fn settle(&self, key: &QueryKey, outcome: &Result<Arc<V>, CatalogError>) {
        let mut entries = self.lock();
        let now = Instant::now();
        let slot = entries
            .entry(key.clone())
            .or_insert_with(|| Slot::new(now));
        slot.in_flight = None;
        match outcome {
            Ok(value) => {
                slot.value = Some(Arc::clone(value));
                slot.fetched_at = Some(now);
                slot.error = None;
                slot.error_at = None;
                tracing::debug!(%key, "Cache entry updated");
            }
            Err(e) => {
                slot.error = Some(e.clone());
                slot.error_at = Some(now);
                tracing::warn!(%key, error = %e, "Fetch failed after retry");
            }
        }
    }
}

/// Stale-while-revalidate cache for values of type `V`.
///
/// Cloning is cheap and yields a handle to the same entries.
pub struct QueryCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for QueryCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for QueryCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("config", &self.inner.config)
            .field("entries", &self.inner.lock().len())
            .finish()
    }
}

impl<V> Default for QueryCache<V> {
    fn default() -> Self {
        Self::new(QueryCacheConfig::default())
    }
}

impl<V> QueryCache<V> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(config: QueryCacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Number of entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// The cached value for `key`, fresh or stale, without fetching.
    #[must_use]
    pub fn peek(&self, key: &QueryKey) -> Option<Arc<V>> {
        self.inner
            .lock()
            .get(key)
            .and_then(|slot| slot.value.clone())
    }

    /// Current state, data and error of `key`.
    #[must_use]
    pub fn snapshot(&self, key: &QueryKey) -> QuerySnapshot<V> {
        let entries = self.inner.lock();
        let now = Instant::now();
        entries.get(key).map_or(
            QuerySnapshot {
                state: CacheState::Idle,
                data: None,
                error: None,
            },
            |slot| QuerySnapshot {
                state: slot.state(key.kind(), now),
                data: slot.value.clone(),
                error: slot.error.clone(),
            },
        )
    }

    /// Marks `key` stale so the next access revalidates it.
    pub fn invalidate(&self, key: &QueryKey) {
        if let Some(slot) = self.inner.lock().get_mut(key) {
            slot.fetched_at = None;
        }
    }
}

impl<V> QueryCache<V>
where
    V: Send + Sync + 'static,
{
    /// Returns the value for `key`, fetching it with `fetcher` when needed.
    ///
    /// - Fresh value: returned without calling `fetcher`.
    /// - Stale value: returned immediately; one background revalidation is
    ///   started unless one is already running or an error is cooling down.
    /// - Miss: joins the in-flight fetch for `key`, or starts one.
    ///
    /// A failed fetch is retried once after `retry_delay`. The fetch runs on
    /// its own task, so dropping the returned future does not cancel it.
    ///
    /// # Errors
    ///
    /// Returns the fetch error when both attempts fail, or the cached error
    /// while its cooldown is running.
    pub async fn fetch<F, Fut>(&self, key: QueryKey, fetcher: F) -> Result<Arc<V>, CatalogError>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, CatalogError>> + Send + 'static,
    {
        let plan = {
            let mut entries = self.inner.lock();
            let now = Instant::now();
            collect_garbage(&mut entries, now);

            let cooldown = self.inner.config.error_cooldown;
            let slot = entries
                .entry(key.clone())
                .or_insert_with(|| Slot::new(now));
            slot.last_access = now;

            if let Some(value) = slot.value.clone() {
                if slot.is_fresh(key.kind(), now) {
                    tracing::trace!(%key, "Cache hit");
                } else if slot.in_flight.is_none() && slot.cooling_error(cooldown, now).is_none()
                {
                    tracing::debug!(%key, "Serving stale value, revalidating");
                    slot.in_flight = Some(self.spawn_fetch(&key, fetcher));
                }
                Plan::Ready(Ok(value))
            } else if let Some(pending) = slot.in_flight.clone() {
                tracing::trace!(%key, "Joining in-flight fetch");
                Plan::Await(pending)
            } else if let Some(error) = slot.cooling_error(cooldown, now) {
                Plan::Ready(Err(error.clone()))
            } else {
                tracing::debug!(%key, "Cache miss");
                let pending = self.spawn_fetch(&key, fetcher);
                slot.in_flight = Some(pending.clone());
                Plan::Await(pending)
            }
        };

        match plan {
            Plan::Ready(result) => result,
            Plan::Await(pending) => pending.await,
        }
    }

    /// Starts a fetch with one retry on its own task.
    ///
    /// Must be called with the entry lock held; the task settles the entry
    /// only after the caller has registered it as in flight.
    fn spawn_fetch<F, Fut>(&self, key: &QueryKey, fetcher: F) -> SharedFetch<V>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, CatalogError>> + Send + 'static,
    {
        let retry_delay = self.inner.config.retry_delay;
        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            let outcome = fetch_with_retry(&task_key, retry_delay, fetcher)
                .await
                .map(Arc::new);
            inner.settle(&task_key, &outcome);
            outcome
        });

        let inner = Arc::clone(&self.inner);
        let key = key.clone();
        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let outcome = Err(task_failure(&key.to_string(), &e));
                    inner.settle(&key, &outcome);
                    outcome
                }
            }
        }
        .boxed()
        .shared()
    }
}

/// Calls `fetcher`, and once more after `retry_delay` if it fails.
async fn fetch_with_retry<V, F, Fut>(
    key: &QueryKey,
    retry_delay: Duration,
    fetcher: F,
) -> Result<V, CatalogError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<V, CatalogError>>,
{
    match fetcher().await {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::debug!(%key, error = %e, ?retry_delay, "Fetch failed, retrying once");
            tokio::time::sleep(retry_delay).await;
            fetcher().await
        }
    }
}

/// Evicts entries idle for longer than their kind's retention window.
fn collect_garbage<V>(entries: &mut HashMap<QueryKey, Slot<V>>, now: Instant) {
    entries.retain(|key, slot| {
        let keep = slot.in_flight.is_some()
            || now.duration_since(slot.last_access) < key.kind().policy().gc_after;
        if !keep {
            tracing::trace!(%key, "Evicting idle cache entry");
        }
        keep
    });
}

/// Maps a panicked or cancelled fetch task to a catalog error.
pub(crate) fn task_failure(path: &str, err: &JoinError) -> CatalogError {
    CatalogError::Network {
        path: String::from(path),
        message: format!("fetch task did not complete: {err}"),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    type Fetcher = Box<dyn Fn() -> BoxFuture<'static, Result<usize, CatalogError>> + Send>;

    /// Fetcher that counts calls and yields the 0-based call number after `delay`.
    fn counting(calls: &Arc<AtomicUsize>, delay: Duration) -> Fetcher {
        let calls = Arc::clone(calls);
        Box::new(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(delay).await;
                Ok(n)
            }
            .boxed()
        })
    }

    /// Fetcher that fails with `status` for its first `failures` calls.
    fn failing(calls: &Arc<AtomicUsize>, failures: usize, status: u16) -> Fetcher {
        let calls = Arc::clone(calls);
        Box::new(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < failures {
                    Err(CatalogError::RemoteService {
                        status,
                        body: String::from("{\"status_message\":\"boom\"}"),
                    })
                } else {
                    Ok(n)
                }
            }
            .boxed()
        })
    }

    fn popular(page: u32) -> QueryKey {
        QueryKey::new(ResourceKind::Popular).with_page(page)
    }

    #[test]
    fn test_key_skips_empty_params() {
        // Arrange & Act
        let key = QueryKey::from_pairs(
            ResourceKind::Discover,
            [("sort_by", "popularity.desc"), ("with_genres", ""), ("page", "2")],
        );

        // Assert
        assert_eq!(key.params().len(), 2);
        assert_eq!(key.to_string(), "discover?page=2&sort_by=popularity.desc");
    }

    #[test]
    fn test_keys_differ_by_page() {
        // Arrange & Act & Assert
        assert_ne!(popular(1), popular(2));
        assert_eq!(popular(1), popular(1));
        assert_ne!(
            QueryKey::new(ResourceKind::Popular).with_page(1),
            QueryKey::new(ResourceKind::TopRated).with_page(1)
        );
    }

    #[test]
    fn test_unknown_key_is_idle() {
        // Arrange
        let cache: QueryCache<usize> = QueryCache::default();

        // Act
        let snapshot = cache.snapshot(&popular(1));

        // Assert
        assert_eq!(snapshot.state, CacheState::Idle);
        assert!(snapshot.data.is_none());
        assert!(snapshot.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_identical_requests_share_one_fetch() {
        // Arrange
        let cache: QueryCache<usize> = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));

        // Act
        let (a, b) = tokio::join!(
            cache.fetch(popular(1), counting(&calls, Duration::from_millis(100))),
            cache.fetch(popular(1), counting(&calls, Duration::from_millis(100))),
        );

        // Assert
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*a.unwrap(), 0);
        assert_eq!(*b.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_entry_is_served_without_fetch() {
        // Arrange
        let cache: QueryCache<usize> = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        cache
            .fetch(popular(1), counting(&calls, Duration::ZERO))
            .await
            .unwrap();

        // Act
        tokio::time::advance(Duration::from_secs(9 * 60)).await;
        let value = cache
            .fetch(popular(1), counting(&calls, Duration::ZERO))
            .await
            .unwrap();

        // Assert
        assert_eq!(*value, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.snapshot(&popular(1)).state, CacheState::Fresh);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_is_served_and_revalidated_once() {
        // Arrange
        let cache: QueryCache<usize> = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        cache
            .fetch(popular(1), counting(&calls, Duration::ZERO))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(11 * 60)).await;
        assert_eq!(cache.snapshot(&popular(1)).state, CacheState::Stale);

        // Act
        let first = cache
            .fetch(popular(1), counting(&calls, Duration::from_millis(50)))
            .await
            .unwrap();
        let second = cache
            .fetch(popular(1), counting(&calls, Duration::from_millis(50)))
            .await
            .unwrap();
        let during = cache.snapshot(&popular(1)).state;
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Assert
        assert_eq!(*first, 0);
        assert_eq!(*second, 0);
        assert_eq!(during, CacheState::Fetching);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let after = cache.snapshot(&popular(1));
        assert_eq!(after.state, CacheState::Fresh);
        assert_eq!(after.data.as_deref(), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_retried_once_then_surfaced() {
        // Arrange
        let cache: QueryCache<usize> = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));

        // Act
        let err = cache
            .fetch(popular(1), failing(&calls, usize::MAX, 500))
            .await
            .unwrap_err();

        // Assert
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(err.status(), Some(500));
        assert!(matches!(err, CatalogError::RemoteService { status: 500, .. }));
        let snapshot = cache.snapshot(&popular(1));
        assert_eq!(snapshot.state, CacheState::Error);
        assert!(snapshot.data.is_none());
        assert_eq!(snapshot.error, Some(err));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_failure_recovers_on_retry() {
        // Arrange
        let cache: QueryCache<usize> = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));

        // Act
        let value = cache
            .fetch(popular(1), failing(&calls, 1, 503))
            .await
            .unwrap();

        // Assert
        assert_eq!(*value, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.snapshot(&popular(1)).state, CacheState::Fresh);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_served_during_cooldown_then_refetched() {
        // Arrange
        let cache: QueryCache<usize> = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        cache
            .fetch(popular(1), failing(&calls, 2, 500))
            .await
            .unwrap_err();

        // Act
        let cooling = cache.fetch(popular(1), failing(&calls, 2, 500)).await;
        let calls_during_cooldown = calls.load(Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(6)).await;
        let recovered = cache.fetch(popular(1), failing(&calls, 2, 500)).await;

        // Assert
        assert!(cooling.is_err());
        assert_eq!(calls_during_cooldown, 2);
        assert_eq!(*recovered.unwrap(), 2);
        assert_eq!(cache.snapshot(&popular(1)).state, CacheState::Fresh);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_pages_do_not_collide() {
        // Arrange
        let cache: QueryCache<usize> = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));

        // Act
        let first = cache
            .fetch(popular(1), counting(&calls, Duration::ZERO))
            .await
            .unwrap();
        let second = cache
            .fetch(popular(2), counting(&calls, Duration::ZERO))
            .await
            .unwrap();

        // Assert
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!((*first, *second), (0, 1));
        assert_eq!(cache.peek(&popular(1)).as_deref(), Some(&0));
        assert_eq!(cache.peek(&popular(2)).as_deref(), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_entries_are_evicted() {
        // Arrange
        let cache: QueryCache<usize> = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let search = QueryKey::new(ResourceKind::Search)
            .param("query", "matrix")
            .with_page(1);
        cache
            .fetch(search.clone(), counting(&calls, Duration::ZERO))
            .await
            .unwrap();

        // Act
        tokio::time::advance(Duration::from_secs(31 * 60)).await;
        cache
            .fetch(popular(1), counting(&calls, Duration::ZERO))
            .await
            .unwrap();

        // Assert
        assert_eq!(cache.len(), 1);
        assert!(cache.peek(&search).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_triggers_revalidation() {
        // Arrange
        let cache: QueryCache<usize> = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        cache
            .fetch(popular(1), counting(&calls, Duration::ZERO))
            .await
            .unwrap();

        // Act
        cache.invalidate(&popular(1));
        let stale = cache
            .fetch(popular(1), counting(&calls, Duration::ZERO))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        // Assert
        assert_eq!(*stale, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.peek(&popular(1)).as_deref(), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_caller_does_not_cancel_fetch() {
        // Arrange
        let cache: QueryCache<usize> = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));

        // Act
        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            cache.fetch(popular(1), counting(&calls, Duration::from_millis(100))),
        )
        .await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Assert
        assert!(abandoned.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.snapshot(&popular(1)).state, CacheState::Fresh);
    }
}
