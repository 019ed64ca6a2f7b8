use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;

use reclaim_db::Database;
use reclaim_db::models::ItemRow;
use reclaim_types::api::{Claims, CreateItemRequest, CreateItemResponse, UpdateItemRequest};
use reclaim_types::models::{Item, ItemStatus, ItemType};

use crate::auth::{AppState, caller_scope};
use crate::error::ApiError;
use crate::util::parse_db_time;

pub(crate) fn item_from_row(row: ItemRow) -> Item {
    Item {
        id: row.id,
        title: row.title,
        description: row.description,
        item_type: row.item_type,
        image_url: row.image_url,
        status: row.status,
        user_id: row.user_id,
        owner_username: row.owner_username,
        created_at: parse_db_time(&row.created_at),
        updated_at: parse_db_time(&row.updated_at),
    }
}

pub fn create(db: &Database, owner_id: i64, req: &CreateItemRequest) -> Result<i64, ApiError> {
    if req.title.trim().is_empty() || req.description.trim().is_empty() {
        return Err(ApiError::MissingFields("title and description are required"));
    }
    let item_id = db.create_item(
        &req.title,
        &req.description,
        req.item_type,
        req.image_url.as_deref(),
        owner_id,
    )?;
    Ok(item_id)
}

/// Browse listing. `status` defaults to active at this surface; "all" lifts
/// the restriction (the admin panel path). The keyword filter matches title
/// or description, case-insensitively.
pub fn browse(
    db: &Database,
    item_type: Option<ItemType>,
    status: Option<ItemStatus>,
    keyword: Option<&str>,
) -> Result<Vec<Item>, ApiError> {
    let rows = db.list_items(item_type, status)?;
    let mut items: Vec<Item> = rows.into_iter().map(item_from_row).collect();

    if let Some(q) = keyword {
        let q = q.to_lowercase();
        if !q.is_empty() {
            items.retain(|i| {
                i.title.to_lowercase().contains(&q) || i.description.to_lowercase().contains(&q)
            });
        }
    }
    Ok(items)
}

pub fn mine(db: &Database, owner_id: i64) -> Result<Vec<Item>, ApiError> {
    Ok(db.user_items(owner_id)?.into_iter().map(item_from_row).collect())
}

pub fn update(
    db: &Database,
    actor: &Claims,
    item_id: i64,
    req: &UpdateItemRequest,
) -> Result<(), ApiError> {
    if req.title.trim().is_empty() || req.description.trim().is_empty() {
        return Err(ApiError::MissingFields("title and description are required"));
    }
    let changed = db.update_item(
        item_id,
        &req.title,
        &req.description,
        req.status,
        caller_scope(actor),
    )?;
    if !changed {
        return Err(ApiError::UpdateFailed);
    }
    Ok(())
}

pub fn delete(db: &Database, actor: &Claims, item_id: i64) -> Result<(), ApiError> {
    if !db.delete_item(item_id, caller_scope(actor))? {
        return Err(ApiError::UpdateFailed);
    }
    Ok(())
}

/// Status filter at the browse surface: absent means the public default
/// (active only), "all" lifts the restriction, anything else must name a
/// real status.
pub fn parse_status_filter(raw: Option<&str>) -> Result<Option<ItemStatus>, ApiError> {
    match raw {
        None => Ok(Some(ItemStatus::Active)),
        Some("all") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(|_| ApiError::InvalidStatusFilter),
    }
}

// -- Handlers --

#[derive(Debug, Deserialize)]
pub struct ItemQuery {
    pub item_type: Option<ItemType>,
    /// "active" (default), "claimed", "resolved", or "all".
    pub status: Option<String>,
    pub q: Option<String>,
}

pub async fn create_item(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let item_id = create(&state.db, claims.sub, &req)?;
    Ok((StatusCode::CREATED, Json(CreateItemResponse { item_id })))
}

pub async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<ItemQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = parse_status_filter(query.status.as_deref())?;

    // Listing can scan the whole table; keep it off the async runtime.
    let db = state.clone();
    let items = tokio::task::spawn_blocking(move || {
        browse(&db.db, query.item_type, status, query.q.as_deref())
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(anyhow::anyhow!(e))
    })??;

    Ok(Json(items))
}

pub async fn my_items(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let items = mine(&state.db, claims.sub)?;
    Ok(Json(items))
}

pub async fn update_item(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    update(&state.db, &claims, item_id, &req)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_item(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    delete(&state.db, &claims, item_id)?;
    Ok(StatusCode::NO_CONTENT)
}
