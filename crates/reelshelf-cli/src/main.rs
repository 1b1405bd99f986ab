//! reelshelf - movie catalog browser and watchlist CLI.

/// Application configuration (TOML).
mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::instrument;
use tracing_subscriber::filter::EnvFilter;
#[cfg(not(feature = "otel"))]
use tracing_subscriber::fmt;
#[cfg(feature = "otel")]
use tracing_subscriber::layer::SubscriberExt;
#[cfg(feature = "otel")]
use tracing_subscriber::util::SubscriberInitExt;
use url::Url;

use crate::config::{AppConfig, resolve_config_path};
use reelshelf_api::CatalogError;
use reelshelf_api::image::{ImageKind, ImageResolver, backdrop_size, poster_size};
use reelshelf_api::tmdb::{DiscoverParams, MovieDetail, MoviePage, MovieSummary, TmdbClient};
use reelshelf_db::{SqliteStore, WatchlistStore, for_you_params, open_db};
use reelshelf_query::{CachedCatalog, InfiniteQuery};

/// Catalog reads over the HTTP client.
type Catalog = CachedCatalog<TmdbClient>;

/// Number of cast members shown on the movie page.
const TOP_CAST: usize = 5;

/// Number of recommendations shown on the movie page.
const TOP_RECOMMENDATIONS: usize = 5;

/// CLI argument parser.
#[derive(Parser)]
#[command(about, version)]
struct Cli {
    /// Override config/data directory.
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// List popular movies.
    Popular(PageArgs),
    /// List top-rated movies.
    TopRated(PageArgs),
    /// Discover movies by genre, year, rating and language.
    Discover(DiscoverArgs),
    /// Search movies by title.
    Search(SearchArgs),
    /// Show a movie with cast, trailer and recommendations.
    Movie(MovieArgs),
    /// List movie genres.
    Genres,
    /// Discover movies matching the genres in your watchlist.
    ForYou(ForYouArgs),
    /// Manage the local watchlist.
    Watchlist(WatchlistCommand),
}

/// Arguments for single-page list subcommands.
#[derive(clap::Args)]
struct PageArgs {
    /// Result page (1-indexed).
    #[arg(long, default_value_t = 1)]
    page: u32,
}

/// Arguments for the `discover` subcommand.
#[derive(clap::Args)]
struct DiscoverArgs {
    /// Comma-separated genre IDs (e.g. "28,12").
    #[arg(long, value_delimiter = ',')]
    genres: Vec<u32>,
    /// Primary release year.
    #[arg(long)]
    year: Option<u32>,
    /// Minimum vote average.
    #[arg(long)]
    min_rating: Option<f64>,
    /// Maximum vote average.
    #[arg(long)]
    max_rating: Option<f64>,
    /// Original language (ISO 639-1, e.g. "ja").
    #[arg(long)]
    language: Option<String>,
    /// Sort order (default: "popularity.desc").
    #[arg(long)]
    sort_by: Option<String>,
    /// Number of pages to load.
    #[arg(long, default_value_t = 1)]
    pages: u32,
}

/// Arguments for the `search` subcommand.
#[derive(clap::Args)]
struct SearchArgs {
    /// Title to search for.
    query: String,
    /// Number of pages to load.
    #[arg(long, default_value_t = 1)]
    pages: u32,
}

/// Arguments for the `movie` subcommand.
#[derive(clap::Args)]
struct MovieArgs {
    /// TMDB movie ID.
    id: u64,
}

/// Arguments for the `for-you` subcommand.
#[derive(clap::Args)]
struct ForYouArgs {
    /// Number of pages to load.
    #[arg(long, default_value_t = 1)]
    pages: u32,
}

/// Arguments for the `watchlist` subcommand.
#[derive(clap::Args)]
struct WatchlistCommand {
    /// Watchlist subcommand to run.
    #[command(subcommand)]
    command: WatchlistSubcommands,
}

/// Available watchlist subcommands.
#[derive(Subcommand)]
enum WatchlistSubcommands {
    /// List movies in the watchlist.
    List,
    /// Add a movie by TMDB ID.
    Add(MovieArgs),
    /// Remove a movie by TMDB ID.
    Remove(MovieArgs),
    /// Remove every movie.
    Clear,
}

/// Builds the cached catalog from the config file and `TMDB_API_KEY`.
///
/// # Errors
///
/// Returns an error if the config cannot be loaded or the client fails to build.
#[instrument(skip_all)]
fn build_catalog(dir: Option<&PathBuf>) -> Result<Catalog> {
    let config_path = resolve_config_path(dir).context("failed to resolve config path")?;
    let config = AppConfig::load(&config_path).context("failed to load config")?;

    let mut builder = TmdbClient::builder()
        .user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ))
        .min_interval(config.tmdb.min_interval());
    if let Some(key) = config
        .tmdb
        .resolve_api_key(std::env::var("TMDB_API_KEY").ok())
    {
        builder = builder.api_key(key);
    }
    if let Some(ref base_url) = config.tmdb.base_url {
        let url = Url::parse(base_url).with_context(|| format!("invalid base_url {base_url}"))?;
        builder = builder.base_url(url);
    }
    if let Some(ref language) = config.tmdb.language {
        builder = builder.language(language);
    }
    let client = builder.build().context("failed to build TMDB client")?;
    tracing::debug!(
        authenticated = client.is_authenticated(),
        "TMDB client ready"
    );

    Ok(CachedCatalog::new(client, config.cache.query_config()))
}

/// Wraps a failed catalog read, adding TMDB's own message when the error
/// body carries one.
fn request_failed(what: impl Into<String>) -> impl FnOnce(CatalogError) -> anyhow::Error {
    let what = what.into();
    move |error| {
        let context = match error.service_message() {
            Some((code, message)) => format!("{what}: {message} (TMDB code {code})"),
            None => what,
        };
        anyhow::Error::new(error).context(context)
    }
}

/// Opens the watchlist stored in the local database.
///
/// # Errors
///
/// Returns an error if the database cannot be opened.
fn open_watchlist(dir: Option<&PathBuf>) -> Result<WatchlistStore<SqliteStore>> {
    let conn = open_db(dir).context("failed to open database")?;
    Ok(WatchlistStore::open(SqliteStore::new(conn)))
}

/// Logs one line per movie.
fn log_movies(movies: &[MovieSummary]) {
    tracing::info!("ID\tYear\tRating\tTitle");
    for movie in movies {
        tracing::info!(
            "{}\t{}\t{:.1}\t{}",
            movie.id,
            movie
                .release_year()
                .map_or_else(|| String::from("-"), |y| y.to_string()),
            movie.vote_average,
            movie.title,
        );
    }
}

/// Logs a single list page with its position.
fn log_page(page: &MoviePage) {
    tracing::info!(
        "Page {}/{} ({} results)",
        page.page,
        page.total_pages,
        page.total_results
    );
    log_movies(&page.results);
}

/// Loads up to `max_pages` pages and logs the accumulated results.
///
/// # Errors
///
/// Returns an error if a page request fails.
async fn log_pages(query: &InfiniteQuery<MovieSummary>, max_pages: u32) -> Result<()> {
    for _ in 0..max_pages.max(1) {
        let has_next = query.fetch_next().await.map_err(request_failed("page request failed"))?;
        if !has_next {
            break;
        }
    }

    let movies = query.flattened();
    tracing::info!(
        "Showing {} of {} results",
        movies.len(),
        query.total_results().unwrap_or(0)
    );
    log_movies(&movies);
    if query.has_next() {
        tracing::info!("More results available from page {}", query.page_param());
    }
    Ok(())
}

/// Runs the `popular` subcommand.
///
/// # Errors
///
/// Returns an error if the catalog cannot be built or the request fails.
#[instrument(skip_all)]
async fn run_popular(args: &PageArgs, dir: Option<&PathBuf>) -> Result<()> {
    let catalog = build_catalog(dir)?;
    let page = catalog
        .popular(args.page)
        .await
        .map_err(request_failed("popular movies request failed"))?;
    log_page(&page);
    Ok(())
}

/// Runs the `top-rated` subcommand.
///
/// # Errors
///
/// Returns an error if the catalog cannot be built or the request fails.
#[instrument(skip_all)]
async fn run_top_rated(args: &PageArgs, dir: Option<&PathBuf>) -> Result<()> {
    let catalog = build_catalog(dir)?;
    let page = catalog
        .top_rated(args.page)
        .await
        .map_err(request_failed("top-rated movies request failed"))?;
    log_page(&page);
    Ok(())
}

/// Runs the `discover` subcommand.
///
/// # Errors
///
/// Returns an error if the catalog cannot be built or a page request fails.
#[instrument(skip_all)]
async fn run_discover(args: &DiscoverArgs, dir: Option<&PathBuf>) -> Result<()> {
    let catalog = build_catalog(dir)?;

    let mut params = DiscoverParams::new().genres(&args.genres);
    if let Some(year) = args.year {
        params = params.year(year);
    }
    if let Some(rating) = args.min_rating {
        params = params.min_rating(rating);
    }
    if let Some(rating) = args.max_rating {
        params = params.max_rating(rating);
    }
    if let Some(ref language) = args.language {
        params = params.language(language);
    }
    if let Some(ref sort_by) = args.sort_by {
        params = params.sort_by(sort_by);
    }

    log_pages(&catalog.discover_pages(params), args.pages).await
}

/// Runs the `search` subcommand.
///
/// # Errors
///
/// Returns an error if the query is blank, the catalog cannot be built or a
/// page request fails.
#[instrument(skip_all)]
async fn run_search(args: &SearchArgs, dir: Option<&PathBuf>) -> Result<()> {
    if args.query.trim().is_empty() {
        anyhow::bail!("search query must not be empty");
    }
    let catalog = build_catalog(dir)?;
    log_pages(&catalog.search_pages(&args.query), args.pages).await
}

/// Logs the header section of a movie page.
fn log_movie_detail(detail: &MovieDetail, images: &ImageResolver) {
    let year = detail
        .release_year()
        .map_or_else(|| String::from("-"), |y| y.to_string());
    tracing::info!("{} ({year})", detail.title);
    if let Some(ref tagline) = detail.tagline {
        tracing::info!("  {tagline}");
    }
    let genres: Vec<&str> = detail.genres.iter().map(|g| g.name.as_str()).collect();
    tracing::info!("Genres:   {}", genres.join(", "));
    if let Some(runtime) = detail.runtime {
        tracing::info!("Runtime:  {runtime} min");
    }
    tracing::info!(
        "Rating:   {:.1} ({} votes)",
        detail.vote_average,
        detail.vote_count
    );
    tracing::info!(
        "Poster:   {}",
        images.url(detail.poster_path.as_deref(), poster_size(500), ImageKind::Poster)
    );
    tracing::info!(
        "Backdrop: {}",
        images.url(
            detail.backdrop_path.as_deref(),
            backdrop_size(1280),
            ImageKind::Backdrop
        )
    );
    if !detail.overview.is_empty() {
        tracing::info!("{}", detail.overview);
    }
}

/// Runs the `movie` subcommand.
///
/// Detail, credits, videos and recommendations are requested concurrently.
/// Only the detail is required; the other sections are skipped with a
/// warning when they fail.
///
/// # Errors
///
/// Returns an error if the catalog cannot be built or the detail request fails.
#[instrument(skip_all, fields(id = args.id))]
async fn run_movie(args: &MovieArgs, dir: Option<&PathBuf>) -> Result<()> {
    let catalog = build_catalog(dir)?;
    if let Err(e) = catalog.configuration().await {
        tracing::warn!(error = %e, "Image configuration unavailable, using default image URLs");
    }

    let (detail, credits, videos, recommendations) = tokio::join!(
        catalog.movie(args.id),
        catalog.credits(args.id),
        catalog.videos(args.id),
        catalog.recommendations(args.id, 1),
    );
    let detail = detail.map_err(request_failed(format!("movie {} request failed", args.id)))?;

    log_movie_detail(&detail, catalog.image_resolver());

    match credits {
        Ok(credits) => {
            let directors = credits.directors();
            if !directors.is_empty() {
                tracing::info!("Director: {}", directors.join(", "));
            }
            for member in credits.cast.iter().take(TOP_CAST) {
                tracing::info!("  {} as {}", member.name, member.character);
            }
        }
        Err(e) => tracing::warn!(error = %e, "Credits unavailable"),
    }

    match videos {
        Ok(videos) => match videos.trailer().and_then(|v| v.youtube_url()) {
            Some(url) => tracing::info!("Trailer:  {url}"),
            None => tracing::info!("Trailer:  not available"),
        },
        Err(e) => tracing::warn!(error = %e, "Videos unavailable"),
    }

    match recommendations {
        Ok(page) if !page.results.is_empty() => {
            tracing::info!("Recommended:");
            let shown = page.results.len().min(TOP_RECOMMENDATIONS);
            log_movies(page.results.get(..shown).unwrap_or_default());
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Recommendations unavailable"),
    }

    match open_watchlist(dir) {
        Ok(watchlist) if watchlist.contains(args.id) => tracing::info!("In your watchlist"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Watchlist unavailable"),
    }

    Ok(())
}

/// Runs the `genres` subcommand.
///
/// # Errors
///
/// Returns an error if the catalog cannot be built or the request fails.
#[instrument(skip_all)]
async fn run_genres(dir: Option<&PathBuf>) -> Result<()> {
    let catalog = build_catalog(dir)?;
    let genres = catalog
        .genres()
        .await
        .map_err(request_failed("genre list request failed"))?;
    tracing::info!("ID\tName");
    for genre in &genres.genres {
        tracing::info!("{}\t{}", genre.id, genre.name);
    }
    Ok(())
}

/// Runs the `for-you` subcommand.
///
/// # Errors
///
/// Returns an error if the database or catalog cannot be opened, or a page
/// request fails.
#[instrument(skip_all)]
async fn run_for_you(args: &ForYouArgs, dir: Option<&PathBuf>) -> Result<()> {
    let watchlist = open_watchlist(dir)?;
    let params = for_you_params(watchlist.list());
    match params.with_genres {
        Some(ref genres) => tracing::info!("Based on genres {genres} from your watchlist"),
        None => tracing::info!("No genres in your watchlist yet; showing popular movies"),
    }

    let catalog = build_catalog(dir)?;
    log_pages(&catalog.discover_pages(params), args.pages).await
}

/// Runs the `watchlist list` subcommand.
///
/// # Errors
///
/// Returns an error if the database cannot be opened.
#[instrument(skip_all)]
fn run_watchlist_list(dir: Option<&PathBuf>) -> Result<()> {
    let watchlist = open_watchlist(dir)?;
    if watchlist.is_empty() {
        tracing::info!("Watchlist is empty");
        return Ok(());
    }
    let count = watchlist.len();
    tracing::info!(
        "Watchlist ({count} {}):",
        if count == 1 { "movie" } else { "movies" }
    );
    log_movies(watchlist.list());
    Ok(())
}

/// Runs the `watchlist add` subcommand.
///
/// # Errors
///
/// Returns an error if the database or catalog cannot be opened, or the
/// movie detail request fails.
#[instrument(skip_all, fields(id = args.id))]
async fn run_watchlist_add(args: &MovieArgs, dir: Option<&PathBuf>) -> Result<()> {
    let mut watchlist = open_watchlist(dir)?;
    if watchlist.contains(args.id) {
        tracing::info!("Movie {} is already in the watchlist", args.id);
        return Ok(());
    }

    let catalog = build_catalog(dir)?;
    let detail = catalog
        .movie(args.id)
        .await
        .map_err(request_failed(format!("movie {} request failed", args.id)))?;
    watchlist.add(detail.to_summary());
    tracing::info!("Added {} ({})", detail.title, detail.id);
    Ok(())
}

/// Runs the `watchlist remove` subcommand.
///
/// # Errors
///
/// Returns an error if the database cannot be opened.
#[instrument(skip_all, fields(id = args.id))]
fn run_watchlist_remove(args: &MovieArgs, dir: Option<&PathBuf>) -> Result<()> {
    let mut watchlist = open_watchlist(dir)?;
    if watchlist.remove(args.id) {
        tracing::info!("Removed movie {}", args.id);
    } else {
        tracing::info!("Movie {} is not in the watchlist", args.id);
    }
    Ok(())
}

/// Runs the `watchlist clear` subcommand.
///
/// # Errors
///
/// Returns an error if the database cannot be opened.
#[instrument(skip_all)]
fn run_watchlist_clear(dir: Option<&PathBuf>) -> Result<()> {
    let mut watchlist = open_watchlist(dir)?;
    let count = watchlist.len();
    watchlist.clear();
    tracing::info!("Watchlist cleared ({count} removed)");
    Ok(())
}

/// Entry point.
///
/// # Errors
///
/// Returns an error if subcommand execution fails.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    #[cfg(not(feature = "otel"))]
    {
        fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_target(false)
            .init();
    }

    #[cfg(feature = "otel")]
    {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);

        let otel_layer = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .ok()
            .and_then(|_| {
                let exporter = opentelemetry_otlp::SpanExporter::builder()
                    .with_http()
                    .build()
                    .ok()?;

                let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
                    .with_simple_exporter(exporter)
                    .build();

                let tracer = opentelemetry::trace::TracerProvider::tracer(
                    &tracer_provider,
                    env!("CARGO_PKG_NAME"),
                );
                opentelemetry::global::set_tracer_provider(tracer_provider);

                Some(tracing_opentelemetry::layer().with_tracer(tracer))
            });

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(otel_layer)
            .init();
    }

    let cli = Cli::parse();
    let dir = cli.dir.as_ref();
    match cli.command {
        Commands::Popular(args) => run_popular(&args, dir).await,
        Commands::TopRated(args) => run_top_rated(&args, dir).await,
        Commands::Discover(args) => run_discover(&args, dir).await,
        Commands::Search(args) => run_search(&args, dir).await,
        Commands::Movie(args) => run_movie(&args, dir).await,
        Commands::Genres => run_genres(dir).await,
        Commands::ForYou(args) => run_for_you(&args, dir).await,
        Commands::Watchlist(cmd) => match cmd.command {
            WatchlistSubcommands::List => run_watchlist_list(dir),
            WatchlistSubcommands::Add(args) => run_watchlist_add(&args, dir).await,
            WatchlistSubcommands::Remove(args) => run_watchlist_remove(&args, dir),
            WatchlistSubcommands::Clear => run_watchlist_clear(dir),
        },
    }
}
