//! Infinite pagination over a paged list resource.
//!
//! Pages are requested one at a time through a loader (normally backed by
//! the query cache) and appended in order. The page counter only advances
//! on success, so a failed page is requested again on the next call.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use reelshelf_api::CatalogError;
use reelshelf_api::tmdb::PaginatedResult;

use crate::cache::task_failure;

/// Loads one page by number.
type PageLoader<T> = Arc<
    dyn Fn(u32) -> BoxFuture<'static, Result<Arc<PaginatedResult<T>>, CatalogError>> + Send + Sync,
>;

/// The in-flight page request, resolving to `has_next` after it lands.
type SharedAdvance = Shared<BoxFuture<'static, Result<bool, CatalogError>>>;

struct PagerState<T> {
    pages: Vec<Arc<PaginatedResult<T>>>,
    page_param: u32,
    has_next: bool,
    in_flight: Option<SharedAdvance>,
}

/// Accumulates successive pages of one list query.
///
/// Cloning yields a handle to the same accumulated pages.
pub struct InfiniteQuery<T> {
    loader: PageLoader<T>,
    state: Arc<Mutex<PagerState<T>>>,
}

impl<T> Clone for InfiniteQuery<T> {
    fn clone(&self) -> Self {
        Self {
            loader: Arc::clone(&self.loader),
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> fmt::Debug for InfiniteQuery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("InfiniteQuery")
            .field("pages", &state.pages.len())
            .field("page_param", &state.page_param)
            .field("has_next", &state.has_next)
            .field("fetching", &state.in_flight.is_some())
            .finish_non_exhaustive()
    }
}

fn lock<T>(state: &Mutex<PagerState<T>>) -> MutexGuard<'_, PagerState<T>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> InfiniteQuery<T>
where
    T: Send + Sync + 'static,
{
    /// Creates a query with no pages fetched; the first call to
    /// [`fetch_next`](Self::fetch_next) loads page 1.
    pub fn new<L>(loader: L) -> Self
    where
        L: Fn(u32) -> BoxFuture<'static, Result<Arc<PaginatedResult<T>>, CatalogError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            loader: Arc::new(loader),
            state: Arc::new(Mutex::new(PagerState {
                pages: Vec::new(),
                page_param: 1,
                has_next: true,
                in_flight: None,
            })),
        }
    }

    /// Loads the next page and returns whether another one follows.
    ///
    /// While a page request is running, callers join it instead of starting
    /// another. Once the last page has been loaded this is a no-op that
    /// returns `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns the page's fetch error. The page counter is left unchanged.
    pub async fn fetch_next(&self) -> Result<bool, CatalogError> {
        let pending = {
            let mut state = lock(&self.state);
            if let Some(pending) = state.in_flight.clone() {
                pending
            } else if !state.has_next {
                return Ok(false);
            } else {
                let pending = self.spawn_page(state.page_param);
                state.in_flight = Some(pending.clone());
                pending
            }
        };
        pending.await
    }

    /// Requests `page` on its own task. Called with the state lock held.
    fn spawn_page(&self, page: u32) -> SharedAdvance {
        let load = (self.loader)(page);
        let state = Arc::clone(&self.state);
        let task = tokio::spawn(async move {
            let outcome = load.await;
            let mut state = lock(&state);
            state.in_flight = None;
            match outcome {
                Ok(result) => {
                    let next_page = result.next_page();
                    if let Some(next) = next_page {
                        state.page_param = next;
                    }
                    let has_next = next_page.is_some();
                    state.has_next = has_next;
                    tracing::debug!(
                        page = result.page,
                        total_pages = result.total_pages,
                        has_next,
                        "Page appended"
                    );
                    state.pages.push(result);
                    Ok(has_next)
                }
                Err(e) => {
                    tracing::warn!(page, error = %e, "Page fetch failed");
                    Err(e)
                }
            }
        });

        let state = Arc::clone(&self.state);
        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    lock(&state).in_flight = None;
                    Err(task_failure(&format!("page {page}"), &e))
                }
            }
        }
        .boxed()
        .shared()
    }
}

impl<T> InfiniteQuery<T> {
    /// Whether another page can be loaded.
    #[must_use]
    pub fn has_next(&self) -> bool {
        lock(&self.state).has_next
    }

    /// Page number the next call will request.
    #[must_use]
    pub fn page_param(&self) -> u32 {
        lock(&self.state).page_param
    }

    /// Whether a page request is running.
    #[must_use]
    pub fn is_fetching(&self) -> bool {
        lock(&self.state).in_flight.is_some()
    }

    /// Loaded pages in fetch order.
    #[must_use]
    pub fn pages(&self) -> Vec<Arc<PaginatedResult<T>>> {
        lock(&self.state).pages.clone()
    }

    /// Server-reported result count, from the most recent page.
    #[must_use]
    pub fn total_results(&self) -> Option<u32> {
        lock(&self.state).pages.last().map(|p| p.total_results)
    }

    /// All loaded results concatenated in fetch order.
    #[must_use]
    pub fn flattened(&self) -> Vec<T>
    where
        T: Clone,
    {
        lock(&self.state)
            .pages
            .iter()
            .flat_map(|p| p.results.iter().cloned())
            .collect()
    }
}
