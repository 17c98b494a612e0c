//! Group, link and widget endpoints
//!
//! Every handler is a single `load → mutate → save` through
//! [`crate::store::DocumentStore::update`]; the document operations themselves
//! live in [`crate::document`].

use crate::document::{Group, Link, WidgetKind};
use crate::error::Result;
use crate::extract::ApiJson;
use crate::server::AppState;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// `POST /api/groups`
pub async fn create_group(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<Value>,
) -> Result<(StatusCode, Json<Group>)> {
    let group = state.store.update(|doc| doc.add_group(&payload)).await?;
    info!("Created group {} ({})", group.name, group.id);
    Ok((StatusCode::CREATED, Json(group)))
}

/// `PATCH /api/groups/:id`
pub async fn update_group(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<Value>,
) -> Result<Json<Group>> {
    let group = state
        .store
        .update(|doc| doc.update_group(&id, &payload))
        .await?;
    Ok(Json(group))
}

/// `DELETE /api/groups/:id`
pub async fn delete_group(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let group = state.store.update(|doc| doc.delete_group(&id)).await?;
    info!(
        "Deleted group {} with {} links",
        group.id,
        group.links.len()
    );
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/groups/:id/links`
pub async fn create_link(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
    ApiJson(payload): ApiJson<Value>,
) -> Result<(StatusCode, Json<Link>)> {
    let link = state
        .store
        .update(|doc| doc.add_link(&group_id, &payload))
        .await?;
    info!("Created link {} in group {group_id}", link.id);
    Ok((StatusCode::CREATED, Json(link)))
}

/// `PATCH /api/links/:id`
pub async fn update_link(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<Value>,
) -> Result<Json<Link>> {
    let link = state
        .store
        .update(|doc| doc.update_link(&id, &payload))
        .await?;
    Ok(Json(link))
}

/// `DELETE /api/links/:id`
pub async fn delete_link(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.store.update(|doc| doc.delete_link(&id)).await?;
    info!("Deleted link {id}");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveLink {
    pub group_id: String,
    pub index: Option<usize>,
}

/// `POST /api/links/:id/move`
pub async fn move_link(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<MoveLink>,
) -> Result<StatusCode> {
    state
        .store
        .update(|doc| doc.move_link(&id, &payload.group_id, payload.index))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/widgets/:kind`
pub async fn create_widget(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    ApiJson(payload): ApiJson<Value>,
) -> Result<(StatusCode, Json<Value>)> {
    let kind: WidgetKind = kind.parse()?;
    let widget = state
        .store
        .update(|doc| doc.add_widget(kind, &payload))
        .await?;
    info!("Created {kind:?} widget {}", widget["id"]);
    Ok((StatusCode::CREATED, Json(widget)))
}

/// `PATCH /api/widgets/:kind/:id`
pub async fn update_widget(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, String)>,
    ApiJson(payload): ApiJson<Value>,
) -> Result<Json<Value>> {
    let kind: WidgetKind = kind.parse()?;
    let change = state
        .store
        .update(|doc| doc.update_widget(kind, &id, &payload))
        .await?;
    if let Some(old) = change.stale_source {
        evict_source(&state, kind, &old);
    }
    Ok(Json(change.widget))
}

/// `DELETE /api/widgets/:kind/:id`
pub async fn delete_widget(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<StatusCode> {
    let kind: WidgetKind = kind.parse()?;
    let source = state
        .store
        .update(|doc| doc.delete_widget(kind, &id))
        .await?;
    if let Some(url) = source {
        evict_source(&state, kind, &url);
    }
    Ok(StatusCode::NO_CONTENT)
}

fn evict_source(state: &AppState, kind: WidgetKind, url: &str) {
    match kind {
        WidgetKind::Feeds => {
            state.feeds.evict(url);
        }
        WidgetKind::Calendars => {
            state.calendars.evict(url);
        }
        _ => {}
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutUpdate {
    pub widget_order: Option<Vec<String>>,
    pub col_span: Option<BTreeMap<String, u32>>,
}

/// `PUT /api/layout`
pub async fn update_layout(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<LayoutUpdate>,
) -> Result<StatusCode> {
    state
        .store
        .update(|doc| {
            doc.set_layout(payload.widget_order, payload.col_span);
            Ok(())
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
