use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use sha2::{Digest, Sha256};

use reclaim_db::Database;
use reclaim_types::api::{
    Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, SessionUser,
};
use reclaim_types::models::Role;

use crate::error::ApiError;
use crate::images::ImageStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub images: ImageStore,
}

/// SHA-256 hex digest of the plaintext. Deterministic and unsalted — this is
/// the stored-credential format the deployed databases already hold. Known
/// weakness: without a per-user salt, equal passwords share a digest.
/// Switching to a salted KDF changes the stored format and needs a
/// migration, so it is not done silently here.
pub fn hash_password(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

/// Register a new user. Validation order: required fields, password length,
/// role membership, then the insert (which reports a duplicate username).
/// Returns the new id together with the parsed role.
pub fn register_user(
    db: &Database,
    username: &str,
    password: &str,
    role: &str,
    email: Option<&str>,
) -> Result<(i64, Role), ApiError> {
    if username.is_empty() || password.is_empty() {
        return Err(ApiError::MissingFields("username and password are required"));
    }
    if password.len() < 6 {
        return Err(ApiError::PasswordTooShort);
    }
    let role: Role = role.parse().map_err(|_| ApiError::InvalidRole)?;

    let password_hash = hash_password(password);
    let email = email.filter(|e| !e.is_empty());
    match db.create_user(username, &password_hash, role, email)? {
        Some(user_id) => Ok((user_id, role)),
        None => Err(ApiError::UsernameTaken),
    }
}

/// Verify credentials by re-hashing and comparing against the stored digest.
pub fn login_user(db: &Database, username: &str, password: &str) -> Result<SessionUser, ApiError> {
    let user = db
        .get_user_by_username(username)?
        .ok_or(ApiError::UserNotFound)?;

    if user.password_hash != hash_password(password) {
        return Err(ApiError::InvalidPassword);
    }

    Ok(SessionUser {
        id: user.id,
        username: user.username,
        role: user.role,
        email: user.email,
    })
}

/// The single pre-flight authorization decision. Admins pass unconditionally;
/// everyone else only when they own the resource. Handlers use this to pick
/// between the owner-scoped and unscoped persistence statements, which are
/// the atomic enforcement point.
pub fn check_permission(actor: &Claims, resource_owner: Option<i64>) -> bool {
    if actor.role == Role::Admin {
        return true;
    }
    matches!(resource_owner, Some(owner) if owner == actor.sub)
}

/// Owner argument for a mutating persistence call: admins get the
/// unconditional statement, everyone else the owner-scoped one.
pub fn caller_scope(actor: &Claims) -> Option<i64> {
    if check_permission(actor, None) {
        None
    } else {
        Some(actor.sub)
    }
}

pub fn create_token(secret: &str, user_id: i64, username: &str, role: Role) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        role,
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

// -- Handlers --

/// Public registration. The role is always student here; `register_user`'s
/// role parameter exists for the admin-creation path and the seed.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (user_id, role) = register_user(
        &state.db,
        &req.username,
        &req.password,
        "student",
        req.email.as_deref(),
    )?;

    let token = create_token(&state.jwt_secret, user_id, &req.username, role)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { user_id, token }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = login_user(&state.db, &req.username, &req.password)?;
    let token = create_token(&state.jwt_secret, user.id, &user.username, user.role)?;

    Ok(Json(LoginResponse {
        user_id: user.id,
        username: user.username,
        role: user.role,
        token,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn claims(sub: i64, role: Role) -> Claims {
        Claims {
            sub,
            username: format!("user{sub}"),
            role,
            exp: 0,
        }
    }

    #[test]
    fn digest_is_deterministic_and_not_plaintext() {
        let a = hash_password("secret1");
        let b = hash_password("secret1");
        assert_eq!(a, b);
        assert_ne!(a, "secret1");
        assert_ne!(a, hash_password("secret2"));
        // 256 bits, hex-encoded
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn validation_order() {
        let db = test_db();
        assert!(matches!(
            register_user(&db, "", "secret1", "student", None),
            Err(ApiError::MissingFields(_))
        ));
        assert!(matches!(
            register_user(&db, "alice", "", "student", None),
            Err(ApiError::MissingFields(_))
        ));
        // Short password reported before the bogus role is even looked at
        assert!(matches!(
            register_user(&db, "alice", "abc", "wizard", None),
            Err(ApiError::PasswordTooShort)
        ));
        assert!(matches!(
            register_user(&db, "alice", "secret1", "wizard", None),
            Err(ApiError::InvalidRole)
        ));
    }

    #[test]
    fn register_then_login_round_trip() {
        let db = test_db();
        let (id, role) = register_user(&db, "alice", "secret1", "student", Some("a@campus.edu")).unwrap();
        assert_eq!(role, Role::Student);

        let user = login_user(&db, "alice", "secret1").unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.username, "alice");
        assert_eq!(user.role, Role::Student);
        assert_eq!(user.email.as_deref(), Some("a@campus.edu"));
    }

    #[test]
    fn login_failures_are_distinct() {
        let db = test_db();
        register_user(&db, "alice", "secret1", "student", None).unwrap();

        assert!(matches!(
            login_user(&db, "alice", "wrong-password"),
            Err(ApiError::InvalidPassword)
        ));
        assert!(matches!(
            login_user(&db, "nobody", "secret1"),
            Err(ApiError::UserNotFound)
        ));
    }

    #[test]
    fn duplicate_registration_rejected() {
        let db = test_db();
        register_user(&db, "alice", "secret1", "student", None).unwrap();
        assert!(matches!(
            register_user(&db, "alice", "other-password", "admin", None),
            Err(ApiError::UsernameTaken)
        ));
        // Original credentials still valid
        assert!(login_user(&db, "alice", "secret1").is_ok());
    }

    #[test]
    fn empty_email_stored_as_null() {
        let db = test_db();
        register_user(&db, "alice", "secret1", "student", Some("")).unwrap();
        assert!(login_user(&db, "alice", "secret1").unwrap().email.is_none());
    }

    #[test]
    fn public_register_payload_cannot_choose_a_role() {
        let payload = r#"{"username":"mallory","password":"secret1","role":"admin"}"#;
        assert!(serde_json::from_str::<RegisterRequest>(payload).is_err());
    }

    #[tokio::test]
    async fn register_handler_always_creates_students() {
        let state: AppState = Arc::new(AppStateInner {
            db: test_db(),
            jwt_secret: "test-secret".into(),
            images: ImageStore::new(None),
        });

        let req: RegisterRequest =
            serde_json::from_str(r#"{"username":"mallory","password":"secret1"}"#).unwrap();
        register(State(state.clone()), Json(req)).await.unwrap();

        let row = state.db.get_user_by_username("mallory").unwrap().unwrap();
        assert_eq!(row.role, Role::Student);
    }

    #[test]
    fn permission_check() {
        let admin = claims(1, Role::Admin);
        let student = claims(2, Role::Student);

        assert!(check_permission(&admin, None));
        assert!(check_permission(&admin, Some(99)));
        assert!(check_permission(&student, Some(2)));
        assert!(!check_permission(&student, Some(3)));
        assert!(!check_permission(&student, None));

        assert_eq!(caller_scope(&admin), None);
        assert_eq!(caller_scope(&student), Some(2));
    }
}
