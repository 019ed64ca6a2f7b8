use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

/// Every failure the service can surface. Each variant maps to a status code
/// and a human-readable message; none are fatal to the process and nothing
/// retries.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    MissingFields(&'static str),
    #[error("password must be at least 6 characters long")]
    PasswordTooShort,
    #[error("invalid role")]
    InvalidRole,
    #[error("unknown status filter; expected active, claimed, resolved, or all")]
    InvalidStatusFilter,
    #[error("username already exists")]
    UsernameTaken,
    #[error("user not found")]
    UserNotFound,
    #[error("invalid password")]
    InvalidPassword,
    #[error("admin access required")]
    Forbidden,
    /// Absent row and failed ownership check are deliberately collapsed;
    /// the conditional UPDATE/DELETE cannot tell them apart.
    #[error("item not found or not yours to modify")]
    UpdateFailed,
    #[error("image size must be less than {0} MB")]
    ImageTooLarge(u32),
    #[error("only JPEG, PNG, and GIF images are allowed")]
    UnsupportedImageType,
    #[error("image upload failed")]
    UploadFailed,
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFields(_)
            | ApiError::PasswordTooShort
            | ApiError::InvalidRole
            | ApiError::InvalidStatusFilter => StatusCode::BAD_REQUEST,
            ApiError::UsernameTaken => StatusCode::CONFLICT,
            ApiError::UserNotFound | ApiError::UpdateFailed => StatusCode::NOT_FOUND,
            ApiError::InvalidPassword => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::ImageTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedImageType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::UploadFailed => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(e) = &self {
            error!("internal error: {e:#}");
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}
