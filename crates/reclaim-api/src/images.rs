//! Image-intake adapter: validates uploads and forwards them to the imgbb
//! hosting API, falling back to a placeholder URL when no API key is
//! configured (development setups).

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, header},
    response::IntoResponse,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tracing::warn;

use reclaim_db::Database;
use reclaim_types::api::{Claims, UploadImageResponse};

use crate::auth::{AppState, caller_scope, check_permission};
use crate::error::ApiError;

pub const MAX_IMAGE_SIZE_MB: u32 = 5;
const MAX_IMAGE_BYTES: usize = (MAX_IMAGE_SIZE_MB as usize) * 1024 * 1024;

const ALLOWED_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "image/gif"];

/// Hosted images expire after 30 days.
const UPLOAD_EXPIRATION_SECS: &str = "2592000";
const IMGBB_ENDPOINT: &str = "https://api.imgbb.com/1/upload";
const PLACEHOLDER_URL: &str = "https://via.placeholder.com/300x200?text=Lost+Found+Item";

/// Size limit first, then MIME type, mirroring the order errors are
/// reported to the user.
pub fn validate_image(bytes: &[u8], content_type: &str) -> Result<(), ApiError> {
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ApiError::ImageTooLarge(MAX_IMAGE_SIZE_MB));
    }
    // Ignore any charset/boundary suffix on the declared type
    let mime = content_type.split(';').next().unwrap_or("").trim();
    if !ALLOWED_TYPES.contains(&mime) {
        return Err(ApiError::UnsupportedImageType);
    }
    Ok(())
}

pub struct ImageStore {
    api_key: Option<String>,
    endpoint: String,
    client: reqwest::Client,
}

impl ImageStore {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            endpoint: IMGBB_ENDPOINT.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Forward the image to the hosting API and return the hosted URL.
    /// Without an API key the caller gets a placeholder URL so development
    /// setups keep working end to end.
    pub async fn upload(&self, bytes: &[u8]) -> Result<String, ApiError> {
        let Some(key) = &self.api_key else {
            warn!("no image host API key configured; using placeholder URL");
            return Ok(PLACEHOLDER_URL.to_string());
        };

        let encoded = B64.encode(bytes);
        let response = self
            .client
            .post(&self.endpoint)
            .form(&[
                ("key", key.as_str()),
                ("image", encoded.as_str()),
                ("expiration", UPLOAD_EXPIRATION_SECS),
            ])
            .send()
            .await
            .map_err(|e| {
                warn!("image host unreachable: {}", e);
                ApiError::UploadFailed
            })?;

        let body: serde_json::Value = response.json().await.map_err(|_| ApiError::UploadFailed)?;
        if !body
            .get("success")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
        {
            let reason = body
                .pointer("/error/message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown error");
            warn!("image upload rejected: {}", reason);
            return Err(ApiError::UploadFailed);
        }

        body.pointer("/data/url")
            .and_then(serde_json::Value::as_str)
            .map(String::from)
            .ok_or(ApiError::UploadFailed)
    }
}

/// Pre-flight for an image attachment: the item must exist and the caller
/// must own it (or be an admin). Runs before anything is sent to the image
/// host, so unauthorized attempts never consume upload quota or leave
/// orphaned hosted images behind.
pub fn authorize_image_attach(db: &Database, actor: &Claims, item_id: i64) -> Result<(), ApiError> {
    let owner = db.item_owner(item_id)?.ok_or(ApiError::UpdateFailed)?;
    if !check_permission(actor, Some(owner)) {
        return Err(ApiError::UpdateFailed);
    }
    Ok(())
}

// -- Handler --

/// POST /items/{id}/image — raw image bytes in the body, MIME type in the
/// Content-Type header. Owner or admin only, same collapsed failure as any
/// other item mutation.
pub async fn attach_image(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    authorize_image_attach(&state.db, &claims, item_id)?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    validate_image(&bytes, content_type)?;

    let image_url = state.images.upload(&bytes).await?;

    // The owner-scoped write remains the atomic enforcement point in case
    // the item was deleted between the pre-flight and the upload.
    if !state
        .db
        .set_item_image(item_id, &image_url, caller_scope(&claims))?
    {
        return Err(ApiError::UpdateFailed);
    }

    Ok(Json(UploadImageResponse { image_url }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::register_user;
    use reclaim_types::models::{ItemType, Role};

    #[test]
    fn accepts_allowed_types_under_limit() {
        for mime in ["image/jpeg", "image/jpg", "image/png", "image/gif"] {
            validate_image(&[0u8; 16], mime).unwrap();
        }
        validate_image(&[0u8; 16], "image/png; charset=binary").unwrap();
    }

    #[test]
    fn rejects_oversized_images() {
        let big = vec![0u8; MAX_IMAGE_BYTES + 1];
        assert!(matches!(
            validate_image(&big, "image/png"),
            Err(ApiError::ImageTooLarge(5))
        ));
        // Exactly at the limit is fine
        let at_limit = vec![0u8; MAX_IMAGE_BYTES];
        validate_image(&at_limit, "image/png").unwrap();
    }

    #[test]
    fn rejects_unsupported_types() {
        for mime in ["image/webp", "application/pdf", "text/html", ""] {
            assert!(matches!(
                validate_image(&[0u8; 16], mime),
                Err(ApiError::UnsupportedImageType)
            ));
        }
    }

    #[tokio::test]
    async fn upload_without_key_returns_placeholder() {
        let store = ImageStore::new(None);
        let url = store.upload(&[1, 2, 3]).await.unwrap();
        assert_eq!(url, PLACEHOLDER_URL);
    }

    fn claims(sub: i64, role: Role) -> Claims {
        Claims {
            sub,
            username: format!("user{sub}"),
            role,
            exp: 0,
        }
    }

    // Attachment authorization runs before any contact with the image host;
    // a non-owner must be rejected at this gate.
    #[test]
    fn only_owner_or_admin_may_attach() {
        let db = Database::open_in_memory().unwrap();
        let (alice, _) = register_user(&db, "alice", "secret1", "student", None).unwrap();
        let (bob, _) = register_user(&db, "bob", "secret1", "student", None).unwrap();
        let item = db
            .create_item("Backpack", "", ItemType::Lost, None, alice)
            .unwrap();

        assert!(matches!(
            authorize_image_attach(&db, &claims(bob, Role::Student), item),
            Err(ApiError::UpdateFailed)
        ));
        authorize_image_attach(&db, &claims(alice, Role::Student), item).unwrap();
        authorize_image_attach(&db, &claims(999, Role::Admin), item).unwrap();
    }

    #[test]
    fn attach_to_missing_item_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let (alice, _) = register_user(&db, "alice", "secret1", "student", None).unwrap();
        assert!(matches!(
            authorize_image_attach(&db, &claims(alice, Role::Student), 9999),
            Err(ApiError::UpdateFailed)
        ));
    }
}
