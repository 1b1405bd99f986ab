//! `CachedCatalog` - every catalog read routed through the query cache.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::FutureExt;
use reelshelf_api::CatalogError;
use reelshelf_api::image::ImageResolver;
use reelshelf_api::tmdb::{
    Configuration, Credits, DiscoverParams, GenreList, MovieDetail, MoviePage, MovieSummary,
    TmdbApi, VideoList,
};
use tracing::instrument;

use crate::cache::{QueryCache, QueryCacheConfig, QueryKey, QuerySnapshot};
use crate::infinite::InfiniteQuery;
use crate::policy::ResourceKind;

/// Pagination state per listing, keyed without the page number.
type PagerRegistry = Arc<Mutex<HashMap<QueryKey, InfiniteQuery<MovieSummary>>>>;

/// Catalog reads with caching, deduplication and background revalidation.
///
/// One cache per response type; keys carry the resource kind, so lists of
/// different kinds share the list cache without colliding. Cloning yields a
/// handle to the same caches and the same paginated listings.
pub struct CachedCatalog<A> {
    api: Arc<A>,
    images: &'static ImageResolver,
    configuration: QueryCache<Configuration>,
    genres: QueryCache<GenreList>,
    lists: QueryCache<MoviePage>,
    details: QueryCache<MovieDetail>,
    credits: QueryCache<Credits>,
    videos: QueryCache<VideoList>,
    pagers: PagerRegistry,
}

impl<A> Clone for CachedCatalog<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            images: self.images,
            configuration: self.configuration.clone(),
            genres: self.genres.clone(),
            lists: self.lists.clone(),
            details: self.details.clone(),
            credits: self.credits.clone(),
            videos: self.videos.clone(),
            pagers: Arc::clone(&self.pagers),
        }
    }
}

impl<A> fmt::Debug for CachedCatalog<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedCatalog")
            .field("lists", &self.lists)
            .field("details", &self.details)
            .finish_non_exhaustive()
    }
}

fn movie_key(kind: ResourceKind, movie_id: u64) -> QueryKey {
    QueryKey::new(kind).param("movie_id", movie_id)
}

fn discover_key(params: &DiscoverParams) -> QueryKey {
    let query = params.to_query();
    QueryKey::from_pairs(
        ResourceKind::Discover,
        query.iter().map(|(name, value)| (*name, value.as_str())),
    )
}

fn search_key(query: &str, page: u32) -> QueryKey {
    search_listing_key(query).with_page(page)
}

/// Identifies a discover listing independent of the page.
fn discover_listing_key(params: &DiscoverParams) -> QueryKey {
    let query = params.filter_query();
    QueryKey::from_pairs(
        ResourceKind::Discover,
        query.iter().map(|(name, value)| (*name, value.as_str())),
    )
}

fn search_listing_key(query: &str) -> QueryKey {
    QueryKey::new(ResourceKind::Search).param("query", query.trim())
}

impl<A> CachedCatalog<A> {
    /// Wraps `api`, installing image configuration into the process-wide resolver.
    #[must_use]
    pub fn new(api: A, config: QueryCacheConfig) -> Self {
        Self {
            api: Arc::new(api),
            images: ImageResolver::global(),
            configuration: QueryCache::new(config),
            genres: QueryCache::new(config),
            lists: QueryCache::new(config),
            details: QueryCache::new(config),
            credits: QueryCache::new(config),
            videos: QueryCache::new(config),
            pagers: Arc::default(),
        }
    }

    /// Installs image configuration into `images` instead of the global resolver.
    #[must_use]
    pub fn with_image_resolver(mut self, images: &'static ImageResolver) -> Self {
        self.images = images;
        self
    }

    /// Resolver that receives the image configuration.
    #[must_use]
    pub const fn image_resolver(&self) -> &'static ImageResolver {
        self.images
    }

    /// Previously fetched detail for `movie_id`, fresh or stale.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFoundLocally` when the detail was never fetched
    /// or has been evicted.
    pub fn cached_movie(&self, movie_id: u64) -> Result<Arc<MovieDetail>, CatalogError> {
        self.details
            .peek(&movie_key(ResourceKind::MovieDetail, movie_id))
            .ok_or(CatalogError::NotFoundLocally(movie_id))
    }

    /// Cache state of a movie detail.
    #[must_use]
    pub fn movie_snapshot(&self, movie_id: u64) -> QuerySnapshot<MovieDetail> {
        self.details
            .snapshot(&movie_key(ResourceKind::MovieDetail, movie_id))
    }

    /// Pagination state registered under `key`, created by `make` on first use.
    fn pager(
        &self,
        key: QueryKey,
        make: impl FnOnce() -> InfiniteQuery<MovieSummary>,
    ) -> InfiniteQuery<MovieSummary> {
        let mut pagers = self.pagers.lock().unwrap_or_else(PoisonError::into_inner);
        pagers
            .entry(key)
            .or_insert_with(|| {
                tracing::trace!("Pagination state created");
                make()
            })
            .clone()
    }

    /// Cache state of one discover page.
    #[must_use]
    pub fn discover_snapshot(&self, params: &DiscoverParams) -> QuerySnapshot<MoviePage> {
        self.lists.snapshot(&discover_key(params))
    }
}

impl<A> CachedCatalog<A>
where
    A: TmdbApi + Send + Sync + 'static,
{
    /// Image server configuration. A successful fetch installs the image
    /// settings into the resolver.
    ///
    /// # Errors
    ///
    /// Returns the fetch error after the automatic retry.
    #[instrument(skip_all)]
    pub async fn configuration(&self) -> Result<Arc<Configuration>, CatalogError> {
        let api = Arc::clone(&self.api);
        let images = self.images;
        self.configuration
            .fetch(QueryKey::new(ResourceKind::Configuration), move || {
                let api = Arc::clone(&api);
                async move {
                    let configuration = api.configuration().await?;
                    images.install(configuration.images.clone());
                    Ok(configuration)
                }
            })
            .await
    }

    /// Movie genre list.
    ///
    /// # Errors
    ///
    /// Returns the fetch error after the automatic retry.
    #[instrument(skip_all)]
    pub async fn genres(&self) -> Result<Arc<GenreList>, CatalogError> {
        let api = Arc::clone(&self.api);
        self.genres
            .fetch(QueryKey::new(ResourceKind::Genres), move || {
                let api = Arc::clone(&api);
                async move { api.genres().await }
            })
            .await
    }

    /// One page of popular movies.
    ///
    /// # Errors
    ///
    /// Returns the fetch error after the automatic retry.
    #[instrument(skip(self))]
    pub async fn popular(&self, page: u32) -> Result<Arc<MoviePage>, CatalogError> {
        let api = Arc::clone(&self.api);
        self.lists
            .fetch(
                QueryKey::new(ResourceKind::Popular).with_page(page),
                move || {
                    let api = Arc::clone(&api);
                    async move { api.popular(page).await }
                },
            )
            .await
    }

    /// One page of top-rated movies.
    ///
    /// # Errors
    ///
    /// Returns the fetch error after the automatic retry.
    #[instrument(skip(self))]
    pub async fn top_rated(&self, page: u32) -> Result<Arc<MoviePage>, CatalogError> {
        let api = Arc::clone(&self.api);
        self.lists
            .fetch(
                QueryKey::new(ResourceKind::TopRated).with_page(page),
                move || {
                    let api = Arc::clone(&api);
                    async move { api.top_rated(page).await }
                },
            )
            .await
    }

    /// One page of a discover listing.
    ///
    /// # Errors
    ///
    /// Returns the fetch error after the automatic retry.
    #[instrument(skip_all, fields(page = params.page))]
    pub async fn discover(&self, params: &DiscoverParams) -> Result<Arc<MoviePage>, CatalogError> {
        fetch_discover(&self.lists, &self.api, params).await
    }

    /// One page of title search results.
    ///
    /// # Errors
    ///
    /// Returns the fetch error after the automatic retry.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, page: u32) -> Result<Arc<MoviePage>, CatalogError> {
        fetch_search(&self.lists, &self.api, query, page).await
    }

    /// Movie detail.
    ///
    /// # Errors
    ///
    /// Returns the fetch error after the automatic retry.
    #[instrument(skip(self))]
    pub async fn movie(&self, movie_id: u64) -> Result<Arc<MovieDetail>, CatalogError> {
        let api = Arc::clone(&self.api);
        self.details
            .fetch(movie_key(ResourceKind::MovieDetail, movie_id), move || {
                let api = Arc::clone(&api);
                async move { api.movie(movie_id).await }
            })
            .await
    }

    /// One page of recommendations for a movie.
    ///
    /// # Errors
    ///
    /// Returns the fetch error after the automatic retry.
    #[instrument(skip(self))]
    pub async fn recommendations(
        &self,
        movie_id: u64,
        page: u32,
    ) -> Result<Arc<MoviePage>, CatalogError> {
        let api = Arc::clone(&self.api);
        self.lists
            .fetch(
                movie_key(ResourceKind::Recommendations, movie_id).with_page(page),
                move || {
                    let api = Arc::clone(&api);
                    async move { api.recommendations(movie_id, page).await }
                },
            )
            .await
    }

    /// Cast and crew of a movie.
    ///
    /// # Errors
    ///
    /// Returns the fetch error after the automatic retry.
    #[instrument(skip(self))]
    pub async fn credits(&self, movie_id: u64) -> Result<Arc<Credits>, CatalogError> {
        let api = Arc::clone(&self.api);
        self.credits
            .fetch(movie_key(ResourceKind::Credits, movie_id), move || {
                let api = Arc::clone(&api);
                async move { api.credits(movie_id).await }
            })
            .await
    }

    /// Videos of a movie.
    ///
    /// # Errors
    ///
    /// Returns the fetch error after the automatic retry.
    #[instrument(skip(self))]
    pub async fn videos(&self, movie_id: u64) -> Result<Arc<VideoList>, CatalogError> {
        let api = Arc::clone(&self.api);
        self.videos
            .fetch(movie_key(ResourceKind::Videos, movie_id), move || {
                let api = Arc::clone(&api);
                async move { api.videos(movie_id).await }
            })
            .await
    }

    /// Infinite pagination over a discover listing. `params.page` is ignored.
    ///
    /// Every call with the same filters returns a handle to the same
    /// accumulated pages.
    #[must_use]
    pub fn discover_pages(&self, params: DiscoverParams) -> InfiniteQuery<MovieSummary> {
        self.pager(discover_listing_key(&params), || {
            let lists = self.lists.clone();
            let api = Arc::clone(&self.api);
            InfiniteQuery::new(move |page| {
                let lists = lists.clone();
                let api = Arc::clone(&api);
                let params = params.clone().page(page);
                async move { fetch_discover(&lists, &api, &params).await }.boxed()
            })
        })
    }

    /// Infinite pagination over title search results, shared per query.
    #[must_use]
    pub fn search_pages(&self, query: &str) -> InfiniteQuery<MovieSummary> {
        self.pager(search_listing_key(query), || {
            let lists = self.lists.clone();
            let api = Arc::clone(&self.api);
            let query = String::from(query.trim());
            InfiniteQuery::new(move |page| {
                let lists = lists.clone();
                let api = Arc::clone(&api);
                let query = query.clone();
                async move { fetch_search(&lists, &api, &query, page).await }.boxed()
            })
        })
    }
}

/// One discover page through the list cache.
///
/// Pagination loaders call this directly so they do not hold the catalog,
/// which owns them through the pager registry.
async fn fetch_discover<A>(
    lists: &QueryCache<MoviePage>,
    api: &Arc<A>,
    params: &DiscoverParams,
) -> Result<Arc<MoviePage>, CatalogError>
where
    A: TmdbApi + Send + Sync + 'static,
{
    let api = Arc::clone(api);
    let request = params.clone();
    lists
        .fetch(discover_key(params), move || {
            let api = Arc::clone(&api);
            let request = request.clone();
            async move { api.discover(&request).await }
        })
        .await
}

/// One search page through the list cache.
async fn fetch_search<A>(
    lists: &QueryCache<MoviePage>,
    api: &Arc<A>,
    query: &str,
    page: u32,
) -> Result<Arc<MoviePage>, CatalogError>
where
    A: TmdbApi + Send + Sync + 'static,
{
    let api = Arc::clone(api);
    let term = String::from(query.trim());
    lists
        .fetch(search_key(query, page), move || {
            let api = Arc::clone(&api);
            let term = term.clone();
            async move { api.search(&term, page).await }
        })
        .await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::indexing_slicing)]

    use std::sync::atomic::{AtomicUsize, Ordering};

    use reelshelf_api::image::ImageKind;
    use reelshelf_api::tmdb::TmdbClient;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::cache::CacheState;

    const POPULAR: &str = include_str!("../../../fixtures/tmdb/popular_page1.json");
    const MOVIE: &str = include_str!("../../../fixtures/tmdb/movie_550.json");
    const CREDITS: &str = include_str!("../../../fixtures/tmdb/credits_550.json");
    const VIDEOS: &str = include_str!("../../../fixtures/tmdb/videos_550.json");
    const CONFIGURATION: &str = include_str!("../../../fixtures/tmdb/configuration.json");
    const GENRES: &str = include_str!("../../../fixtures/tmdb/genres.json");

    /// Fixture-backed API that counts every call and can fail movie detail.
    #[derive(Debug, Default)]
    struct FakeApi {
        calls: AtomicUsize,
        movie_status: Option<u16>,
    }

    impl FakeApi {
        fn hit(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }

        fn page(page: u32) -> MoviePage {
            let mut result: MoviePage = serde_json::from_str(POPULAR).unwrap();
            result.page = page;
            result
        }
    }

    impl TmdbApi for FakeApi {
        async fn configuration(&self) -> Result<Configuration, CatalogError> {
            self.hit();
            Ok(serde_json::from_str(CONFIGURATION).unwrap())
        }

        async fn discover(&self, params: &DiscoverParams) -> Result<MoviePage, CatalogError> {
            self.hit();
            Ok(Self::page(params.page.unwrap_or(1)))
        }

        async fn search(&self, _query: &str, page: u32) -> Result<MoviePage, CatalogError> {
            self.hit();
            Ok(Self::page(page))
        }

        async fn movie(&self, _movie_id: u64) -> Result<MovieDetail, CatalogError> {
            self.hit();
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            match self.movie_status {
                Some(status) => Err(CatalogError::RemoteService {
                    status,
                    body: String::from("{\"status_code\":34}"),
                }),
                None => Ok(serde_json::from_str(MOVIE).unwrap()),
            }
        }

        async fn recommendations(
            &self,
            _movie_id: u64,
            page: u32,
        ) -> Result<MoviePage, CatalogError> {
            self.hit();
            Ok(Self::page(page))
        }

        async fn popular(&self, page: u32) -> Result<MoviePage, CatalogError> {
            self.hit();
            Ok(Self::page(page))
        }

        async fn top_rated(&self, page: u32) -> Result<MoviePage, CatalogError> {
            self.hit();
            Ok(Self::page(page))
        }

        async fn credits(&self, _movie_id: u64) -> Result<Credits, CatalogError> {
            self.hit();
            Ok(serde_json::from_str(CREDITS).unwrap())
        }

        async fn videos(&self, _movie_id: u64) -> Result<VideoList, CatalogError> {
            self.hit();
            Ok(serde_json::from_str(VIDEOS).unwrap())
        }

        async fn genres(&self) -> Result<GenreList, CatalogError> {
            self.hit();
            Ok(serde_json::from_str(GENRES).unwrap())
        }
    }

    fn catalog(api: FakeApi) -> CachedCatalog<FakeApi> {
        CachedCatalog::new(api, QueryCacheConfig::default())
    }

    fn calls(catalog: &CachedCatalog<FakeApi>) -> usize {
        catalog.api.calls.load(Ordering::SeqCst)
    }

    #[tokio::test(start_paused = true)]
    async fn test_configuration_installs_image_settings() {
        // Arrange
        static IMAGES: ImageResolver = ImageResolver::new();
        let catalog = catalog(FakeApi::default()).with_image_resolver(&IMAGES);
        assert!(!IMAGES.is_configured());

        // Act
        let configuration = catalog.configuration().await.unwrap();
        catalog.configuration().await.unwrap();

        // Assert
        assert_eq!(calls(&catalog), 1);
        assert!(IMAGES.is_configured());
        assert_eq!(configuration.images.secure_base_url, "https://image.tmdb.org/t/p/");
        assert_eq!(
            IMAGES.url(Some("/a.jpg"), "w500", ImageKind::Poster),
            "https://image.tmdb.org/t/p/w500/a.jpg"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_movie_not_found_until_fetched() {
        // Arrange
        let catalog = catalog(FakeApi::default());
        assert_eq!(
            catalog.cached_movie(550).unwrap_err(),
            CatalogError::NotFoundLocally(550)
        );

        // Act
        catalog.movie(550).await.unwrap();
        catalog.movie(550).await.unwrap();

        // Assert
        assert_eq!(calls(&catalog), 1);
        assert_eq!(catalog.cached_movie(550).unwrap().title, "Fight Club");
        assert!(catalog.cached_movie(551).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_404_is_distinct_from_not_found_locally() {
        // Arrange
        let catalog = catalog(FakeApi {
            movie_status: Some(404),
            ..FakeApi::default()
        });

        // Act
        let err = catalog.movie(1).await.unwrap_err();

        // Assert
        assert_eq!(err.status(), Some(404));
        assert_eq!(calls(&catalog), 2);
        assert_eq!(catalog.movie_snapshot(1).state, CacheState::Error);
        assert_eq!(
            catalog.cached_movie(1).unwrap_err(),
            CatalogError::NotFoundLocally(1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_detail_sections_load_concurrently_once_each() {
        // Arrange
        let catalog = catalog(FakeApi::default());

        // Act
        let (detail, again, credits, videos) = tokio::join!(
            catalog.movie(550),
            catalog.movie(550),
            catalog.credits(550),
            catalog.videos(550),
        );

        // Assert
        assert_eq!(calls(&catalog), 3);
        assert_eq!(detail.unwrap().runtime, Some(139));
        assert!(again.is_ok());
        assert_eq!(credits.unwrap().directors(), vec!["David Fincher"]);
        assert_eq!(videos.unwrap().trailer().unwrap().key, "O-b2VfmmbyA");
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_kinds_do_not_collide() {
        // Arrange
        let catalog = catalog(FakeApi::default());

        // Act
        catalog.popular(1).await.unwrap();
        catalog.top_rated(1).await.unwrap();
        catalog.recommendations(550, 1).await.unwrap();
        catalog.search("fight", 1).await.unwrap();
        catalog.popular(1).await.unwrap();

        // Assert
        assert_eq!(calls(&catalog), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discover_pages_accumulate_through_cache() {
        // Arrange
        let catalog = catalog(FakeApi::default());
        let params = DiscoverParams::new().genres(&[28]);

        // Act
        let pages = catalog.discover_pages(params.clone());
        let mut has_next = Vec::new();
        for _ in 0..3 {
            has_next.push(pages.fetch_next().await.unwrap());
        }
        let again = catalog.discover_pages(params.clone());
        let again_has_next = again.fetch_next().await.unwrap();

        // Assert
        assert_eq!(has_next, vec![true, true, false]);
        assert!(!again_has_next);
        assert_eq!(again.pages().len(), 3);
        assert_eq!(pages.flattened().len(), 6);
        assert_eq!(calls(&catalog), 3);
        assert_eq!(
            catalog.discover_snapshot(&params.page(2)).state,
            CacheState::Fresh
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_discover_pages_share_state_per_filter() {
        // Arrange
        let catalog = catalog(FakeApi::default());
        let params = DiscoverParams::new().genres(&[12, 28]).year(1999);
        let first = catalog.discover_pages(params.clone());
        let second = catalog.discover_pages(params.clone().page(7));
        let other = catalog.discover_pages(params.clone().year(2000));

        // Act
        first.fetch_next().await.unwrap();
        first.fetch_next().await.unwrap();

        // Assert
        assert_eq!(second.pages().len(), first.pages().len());
        assert_eq!(second.page_param(), 3);
        assert_eq!(second.flattened(), first.flattened());
        assert!(other.pages().is_empty());
        assert_eq!(other.page_param(), 1);
        assert_eq!(calls(&catalog), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_views_of_one_listing_request_once() {
        // Arrange
        let catalog = catalog(FakeApi::default());
        let a = catalog.search_pages("matrix");
        let b = catalog.clone().search_pages(" matrix ");

        // Act
        let (from_a, from_b) = tokio::join!(a.fetch_next(), b.fetch_next());

        // Assert
        assert!(from_a.unwrap());
        assert!(from_b.unwrap());
        assert_eq!(calls(&catalog), 1);
        assert_eq!(b.pages().len(), 1);
        assert_eq!(a.page_param(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_pages_start_at_page_one() {
        // Arrange
        let catalog = catalog(FakeApi::default());

        // Act
        let pages = catalog.search_pages("matrix");
        pages.fetch_next().await.unwrap();

        // Assert
        assert_eq!(pages.pages()[0].page, 1);
        assert_eq!(pages.page_param(), 2);
    }

    #[tokio::test]
    async fn test_popular_over_http_is_requested_once() {
        // Arrange
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/3/movie/popular"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(POPULAR))
            .expect(1)
            .mount(&server)
            .await;
        let client = TmdbClient::builder()
            .base_url(format!("{}/3/", server.uri()).parse().unwrap())
            .api_key("test-key")
            .user_agent("test/0.0.0")
            .build()
            .unwrap();
        let catalog = CachedCatalog::new(client, QueryCacheConfig::default());

        // Act
        let (a, b) = tokio::join!(catalog.popular(1), catalog.popular(1));
        let c = catalog.popular(1).await;

        // Assert
        assert_eq!(a.unwrap().results[0].id, 550);
        assert!(Arc::ptr_eq(&b.unwrap(), &c.unwrap()));
    }
}
