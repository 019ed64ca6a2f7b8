//! Admin-only surface: the system overview and admin-account creation.
//! Item moderation reuses the regular item endpoints, where the admin role
//! already bypasses ownership checks.

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use tracing::info;

use reclaim_db::Database;
use reclaim_types::api::{Claims, ItemStats, RegisterResponse};

use crate::auth::{AppState, check_permission, create_token, register_user};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateAdminRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
}

fn require_admin(claims: &Claims) -> Result<(), ApiError> {
    if !check_permission(claims, None) {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

/// Grant admin access to a new account. Same validation path as regular
/// registration with the role forced to admin.
pub fn create_admin(
    db: &Database,
    actor: &Claims,
    username: &str,
    password: &str,
    email: Option<&str>,
) -> Result<i64, ApiError> {
    require_admin(actor)?;
    let (user_id, _) = register_user(db, username, password, "admin", email)?;
    info!("admin '{}' created account '{}'", actor.username, username);
    Ok(user_id)
}

pub fn stats(db: &Database, actor: &Claims) -> Result<ItemStats, ApiError> {
    require_admin(actor)?;
    Ok(db.item_stats()?)
}

// -- Handlers --

pub async fn create_admin_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateAdminRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = create_admin(
        &state.db,
        &claims,
        &req.username,
        &req.password,
        req.email.as_deref(),
    )?;
    let token = create_token(
        &state.jwt_secret,
        user_id,
        &req.username,
        reclaim_types::models::Role::Admin,
    )?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { user_id, token }),
    ))
}

pub async fn item_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = stats(&state.db, &claims)?;
    Ok(Json(stats))
}
