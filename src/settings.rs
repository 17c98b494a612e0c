use crate::document::Document;
use crate::error::{IronDashError, Result};
use crate::extract::ApiJson;
use crate::server::AppState;
use axum::{
    body::Bytes,
    extract::{Json, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// `GET /api/config`
pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<Document> {
    tracing::debug!("Serving dashboard document");
    Json(state.store.load())
}

/// `PUT /api/config`: overlay the settings present in the payload
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<Value>,
) -> Result<Json<Document>> {
    let doc = state.store.apply_partial(&payload).await?;
    info!("Configuration updated");
    Ok(Json(doc))
}

/// `GET /api/config/export`: the full document as a download
pub async fn export_config(State(state): State<Arc<AppState>>) -> Result<Response> {
    let body = serde_json::to_string_pretty(&state.store.load())?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/json"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"iron-dash-config.json\"",
            ),
        ],
        body,
    )
        .into_response())
}

/// `POST /api/config/import`: restore a previously exported document
pub async fn import_config(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<Value>,
) -> Result<Json<Document>> {
    let doc = state.store.import(&payload).await?;
    // Widgets may point at different sources now.
    for feed in &doc.feeds {
        state.feeds.evict(&feed.url);
    }
    for calendar in &doc.calendars {
        state.calendars.evict(&calendar.url);
    }
    Ok(Json(doc))
}

/// `GET /api/favicon`
pub async fn get_favicon(State(state): State<Arc<AppState>>) -> Response {
    match state.store.load_favicon() {
        Some((bytes, mime)) => ([(header::CONTENT_TYPE, mime)], bytes).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// `PUT /api/favicon`: raw image bytes, typed by the `Content-Type` header
pub async fn put_favicon(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    let mime = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();
    if !mime.starts_with("image/") {
        return Err(IronDashError::Validation(
            "Favicon must be uploaded with an image content type".to_string(),
        ));
    }
    if body.is_empty() {
        return Err(IronDashError::Validation("Favicon is empty".to_string()));
    }

    state.store.save_favicon(&body, mime)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/favicon`
pub async fn delete_favicon(State(state): State<Arc<AppState>>) -> Result<StatusCode> {
    state.store.clear_favicon()?;
    Ok(StatusCode::NO_CONTENT)
}
