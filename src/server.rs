use crate::cache::TtlCache;
use crate::calendar::CalendarEvent;
use crate::config::AppConfig;
use crate::content::content_client;
use crate::document::Document;
use crate::error::Result;
use crate::feed::FeedItem;
use crate::icons::IconCache;
use crate::store::DocumentStore;
use crate::uptime::HealthMonitor;
use crate::weather::WeatherReport;
use crate::{board, content, settings, uptime};
use axum::{
    routing::{get, patch, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;

/// Shared state handed to every request handler
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<DocumentStore>,
    pub monitor: Arc<HealthMonitor>,
    pub feeds: TtlCache<Vec<FeedItem>>,
    pub calendars: TtlCache<Vec<CalendarEvent>>,
    pub weather: TtlCache<WeatherReport>,
    pub icons: IconCache,
    /// Client for feeds, calendars and weather
    pub http: reqwest::Client,
}

impl AppState {
    /// Build every component from the process configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be constructed.
    pub fn new(config: AppConfig) -> Result<Self> {
        let defaults = Document {
            ping_interval: config.ping_interval_secs,
            ..Document::default()
        };
        let store = Arc::new(DocumentStore::with_defaults(&config.data_file, defaults));
        let monitor = Arc::new(HealthMonitor::new(store.clone())?);
        let http = content_client()?;

        Ok(Self {
            feeds: TtlCache::new("feed", config.feed_ttl),
            calendars: TtlCache::new("calendar", config.ical_ttl),
            weather: TtlCache::new("weather", config.weather_ttl),
            icons: IconCache::new(&config.icon_dir, config.icon_source.clone(), http.clone()),
            config,
            store,
            monitor,
            http,
        })
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let static_files = ServeDir::new(&state.config.static_dir);

    Router::new()
        .route("/api/status", get(uptime::status))
        .route("/api/status/stream", get(uptime::status_stream))
        .route("/api/rss", get(content::rss))
        .route("/api/ical", get(content::ical))
        .route("/api/weather", get(content::weather))
        .route("/api/icon/:slug", get(content::icon))
        .route(
            "/api/config",
            get(settings::get_config).put(settings::update_config),
        )
        .route("/api/config/export", get(settings::export_config))
        .route("/api/config/import", post(settings::import_config))
        .route(
            "/api/favicon",
            get(settings::get_favicon)
                .put(settings::put_favicon)
                .delete(settings::delete_favicon),
        )
        .route("/api/groups", post(board::create_group))
        .route(
            "/api/groups/:id",
            patch(board::update_group).delete(board::delete_group),
        )
        .route("/api/groups/:id/links", post(board::create_link))
        .route(
            "/api/links/:id",
            patch(board::update_link).delete(board::delete_link),
        )
        .route("/api/links/:id/move", post(board::move_link))
        .route("/api/widgets/:kind", post(board::create_widget))
        .route(
            "/api/widgets/:kind/:id",
            patch(board::update_widget).delete(board::delete_widget),
        )
        .route("/api/layout", put(board::update_layout))
        .fallback_service(static_files)
        .with_state(state)
}

/// Serve the application on an already-bound listener until `cancel_token` fires.
///
/// The health monitor is started alongside the server and stopped with it.
///
/// # Errors
///
/// Returns an error if the server fails while running.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    cancel_token: CancellationToken,
) -> Result<()> {
    let monitor = tokio::spawn(state.monitor.clone().run(cancel_token.child_token()));
    let app = router(state);

    tracing::info!("Site launched on: http://{}", listener.local_addr()?);
    let shutdown = cancel_token.clone();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;

    cancel_token.cancel();
    if let Err(e) = monitor.await {
        tracing::error!("Health monitor task failed: {e}");
    }
    result?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Run the web server on the configured port.
///
/// # Errors
///
/// Returns an error if:
/// - The address string cannot be parsed into a valid `SocketAddr`
/// - The server fails to bind to the specified address
/// - An HTTP client cannot be constructed
pub async fn run(config: AppConfig, cancel_token: CancellationToken) -> Result<()> {
    tracing::info!("Initializing server");
    tracing::info!("Using document {}", config.data_file.display());

    let address: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    tracing::info!("Binding server to address: {address}");
    let listener = TcpListener::bind(address).await?;

    let state = Arc::new(AppState::new(config)?);
    serve(listener, state, cancel_token).await
}
