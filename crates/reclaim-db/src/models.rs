//! Typed row structs, built once at the persistence boundary.
//! Timestamps stay as the TEXT SQLite hands back; the API layer parses them.

use std::str::FromStr;

use reclaim_types::models::{ItemStatus, ItemType, Role};

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub email: Option<String>,
    pub created_at: String,
}

pub struct ItemRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub item_type: ItemType,
    pub image_url: Option<String>,
    pub status: ItemStatus,
    pub user_id: i64,
    pub owner_username: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct MessageRow {
    pub id: i64,
    pub sender_id: i64,
    pub sender_username: String,
    pub receiver_id: i64,
    pub receiver_username: String,
    pub item_id: Option<i64>,
    pub item_title: Option<String>,
    pub body: String,
    pub is_read: bool,
    pub created_at: String,
}

/// Parse a CHECK-constrained text column into its enum, reporting a proper
/// conversion failure instead of panicking on a corrupt row.
pub(crate) fn column_enum<T>(idx: usize, value: String) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
