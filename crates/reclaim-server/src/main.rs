use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use reclaim_api::auth::{self, AppState, AppStateInner};
use reclaim_api::images::ImageStore;
use reclaim_api::middleware::require_auth;
use reclaim_api::{admin, images, inbox, items};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reclaim=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("RECLAIM_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("RECLAIM_DB_PATH").unwrap_or_else(|_| "reclaim.db".into());
    let host = std::env::var("RECLAIM_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("RECLAIM_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let imgbb_key = std::env::var("RECLAIM_IMGBB_KEY").ok();

    // Init database
    let db = reclaim_db::Database::open(&PathBuf::from(&db_path))?;

    // Seed the default admin account, insert-if-absent. Seeding only happens
    // when a credential is configured; there is no hardcoded password.
    match std::env::var("RECLAIM_ADMIN_PASSWORD") {
        Ok(password) if !password.is_empty() => {
            let username =
                std::env::var("RECLAIM_ADMIN_USER").unwrap_or_else(|_| "admin".into());
            let email = std::env::var("RECLAIM_ADMIN_EMAIL").ok();
            let inserted =
                db.seed_admin(&username, &auth::hash_password(&password), email.as_deref())?;
            if inserted {
                info!("seeded admin account '{}'", username);
            }
        }
        _ => warn!("RECLAIM_ADMIN_PASSWORD not set; no admin account seeded"),
    }

    // Shared state
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret,
        images: ImageStore::new(imgbb_key),
    });

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/items", post(items::create_item))
        .route("/items", get(items::list_items))
        .route("/items/mine", get(items::my_items))
        .route("/items/{item_id}", put(items::update_item))
        .route("/items/{item_id}", delete(items::delete_item))
        .route("/items/{item_id}/image", post(images::attach_image))
        .route("/messages", get(inbox::get_conversations))
        .route("/messages", post(inbox::send_message))
        .route("/messages/{partner_id}", get(inbox::get_conversation))
        .route("/admin/users", post(admin::create_admin_user))
        .route("/admin/stats", get(admin::item_stats))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Reclaim server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
