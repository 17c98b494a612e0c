use crate::calendar::{fetch_calendar, CalendarEvent};
use crate::error::{IronDashError, Result};
use crate::feed::{fetch_feed, FeedItem};
use crate::server::AppState;
use crate::weather::{fetch_weather, forecast_url, WeatherReport};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for fetching a feed, calendar or weather report
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Client used for all external content fetches
///
/// # Errors
///
/// Returns an error if the client cannot be built.
pub fn content_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .user_agent(concat!("iron-dash/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| IronDashError::Generic(format!("Failed to build HTTP client: {e}")))
}

/// GET `url` and return the body as text.
///
/// # Errors
///
/// Returns [`IronDashError::Upstream`] for connection errors, timeouts and
/// non-success statuses.
pub async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| IronDashError::Upstream(format!("Failed to fetch {url}: {e}")))?;
    let response = response
        .error_for_status()
        .map_err(|e| IronDashError::Upstream(format!("Failed to fetch {url}: {e}")))?;
    response
        .text()
        .await
        .map_err(|e| IronDashError::Upstream(format!("Failed to read {url}: {e}")))
}

#[derive(Debug, Deserialize)]
pub struct SourceQuery {
    pub url: Option<String>,
}

impl SourceQuery {
    fn require_url(self) -> Result<String> {
        let raw = self
            .url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| IronDashError::Validation("Missing url parameter".to_string()))?;
        match url::Url::parse(&raw) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(raw),
            _ => Err(IronDashError::Validation(format!("Invalid URL format: {raw}"))),
        }
    }
}

/// `GET /api/rss?url=`
pub async fn rss(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<Vec<FeedItem>>> {
    let url = query.require_url()?;
    let items = state
        .feeds
        .get_or_fetch(&url, || fetch_feed(&state.http, &url))
        .await?;
    Ok(Json(items))
}

/// `GET /api/ical?url=`
pub async fn ical(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<Vec<CalendarEvent>>> {
    let url = query.require_url()?;
    let events = state
        .calendars
        .get_or_fetch(&url, || fetch_calendar(&state.http, &url))
        .await?;
    Ok(Json(events))
}

/// `GET /api/weather`: current conditions for the configured location
pub async fn weather(State(state): State<Arc<AppState>>) -> Result<Json<WeatherReport>> {
    let settings = state.store.load().weather;
    if !settings.enabled {
        return Err(IronDashError::Validation(
            "Weather is not enabled".to_string(),
        ));
    }
    let url = forecast_url(&state.config.weather_api, &settings)?;
    let report = state
        .weather
        .get_or_fetch(&url, || fetch_weather(&state.http, &url, &settings.units))
        .await?;
    Ok(Json(report))
}

/// `GET /api/icon/:slug`
pub async fn icon(State(state): State<Arc<AppState>>, Path(slug): Path<String>) -> Response {
    match state.icons.get(&slug).await {
        Some(svg) => (
            [
                (header::CONTENT_TYPE, "image/svg+xml"),
                (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
            ],
            svg,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_query_requires_url() {
        let err = SourceQuery { url: None }.require_url().unwrap_err();
        assert!(matches!(err, IronDashError::Validation(_)));

        let err = SourceQuery {
            url: Some("   ".to_string()),
        }
        .require_url()
        .unwrap_err();
        assert!(matches!(err, IronDashError::Validation(_)));
    }

    #[test]
    fn test_source_query_rejects_non_http() {
        for raw in ["ftp://example.com/feed", "javascript:alert(1)", "feed"] {
            let query = SourceQuery {
                url: Some(raw.to_string()),
            };
            assert!(query.require_url().is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn test_source_query_trims() {
        let url = SourceQuery {
            url: Some(" https://example.com/rss ".to_string()),
        }
        .require_url()
        .unwrap();
        assert_eq!(url, "https://example.com/rss");
    }
}
