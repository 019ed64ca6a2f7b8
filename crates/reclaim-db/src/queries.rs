use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

use reclaim_types::api::ItemStats;
use reclaim_types::models::{ItemStatus, ItemType, Role};

use crate::Database;
use crate::models::{ItemRow, MessageRow, UserRow, column_enum};

impl Database {
    // -- Users --

    /// Insert a new user. Returns `Ok(None)` when the username is already
    /// taken; the failed insert leaves no partial row behind.
    pub fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
        email: Option<&str>,
    ) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let res = conn.execute(
                "INSERT INTO users (username, password_hash, role, email) VALUES (?1, ?2, ?3, ?4)",
                params![username, password_hash, role.as_str(), email],
            );
            match res {
                Ok(_) => Ok(Some(conn.last_insert_rowid())),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Ok(None)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", &[&username]))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", &[&id]))
    }

    /// Insert-if-absent admin seed, keyed by username. Returns true when a
    /// row was actually inserted.
    pub fn seed_admin(
        &self,
        username: &str,
        password_hash: &str,
        email: Option<&str>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO users (username, password_hash, role, email)
                 VALUES (?1, ?2, 'admin', ?3)",
                params![username, password_hash, email],
            )?;
            Ok(inserted > 0)
        })
    }

    // -- Items --

    pub fn create_item(
        &self,
        title: &str,
        description: &str,
        item_type: ItemType,
        image_url: Option<&str>,
        owner_id: i64,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO items (title, description, item_type, image_url, user_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![title, description, item_type.as_str(), image_url, owner_id],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// All items joined with their owner's username, newest first (id breaks
    /// ties within one second). `status = None` means no status restriction;
    /// callers wanting the public browse default pass `Some(Active)`.
    pub fn list_items(
        &self,
        item_type: Option<ItemType>,
        status: Option<ItemStatus>,
    ) -> Result<Vec<ItemRow>> {
        self.with_conn(|conn| {
            let mut sql = String::from(
                "SELECT i.id, i.title, i.description, i.item_type, i.image_url, i.status,
                        i.user_id, u.username, i.created_at, i.updated_at
                 FROM items i
                 JOIN users u ON i.user_id = u.id",
            );

            let mut clauses: Vec<String> = Vec::new();
            let mut values: Vec<&str> = Vec::new();
            if let Some(t) = item_type {
                clauses.push(format!("i.item_type = ?{}", values.len() + 1));
                values.push(t.as_str());
            }
            if let Some(s) = status {
                clauses.push(format!("i.status = ?{}", values.len() + 1));
                values.push(s.as_str());
            }
            if !clauses.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clauses.join(" AND "));
            }
            sql.push_str(" ORDER BY i.created_at DESC, i.id DESC");

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(values), item_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn user_items(&self, owner_id: i64) -> Result<Vec<ItemRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT i.id, i.title, i.description, i.item_type, i.image_url, i.status,
                        i.user_id, u.username, i.created_at, i.updated_at
                 FROM items i
                 JOIN users u ON i.user_id = u.id
                 WHERE i.user_id = ?1
                 ORDER BY i.created_at DESC, i.id DESC",
            )?;
            let rows = stmt
                .query_map([owner_id], item_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Update title, description and status. With `Some(caller)` the UPDATE
    /// only applies when the caller owns the item; with `None` it applies
    /// unconditionally (admin path). Returns false when no row changed —
    /// absent item and failed ownership check are indistinguishable.
    pub fn update_item(
        &self,
        item_id: i64,
        title: &str,
        description: &str,
        status: ItemStatus,
        caller: Option<i64>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = match caller {
                Some(user_id) => conn.execute(
                    "UPDATE items
                     SET title = ?1, description = ?2, status = ?3, updated_at = datetime('now')
                     WHERE id = ?4 AND user_id = ?5",
                    params![title, description, status.as_str(), item_id, user_id],
                )?,
                None => conn.execute(
                    "UPDATE items
                     SET title = ?1, description = ?2, status = ?3, updated_at = datetime('now')
                     WHERE id = ?4",
                    params![title, description, status.as_str(), item_id],
                )?,
            };
            Ok(changed > 0)
        })
    }

    /// Same ownership-conditional semantics as [`Database::update_item`].
    pub fn delete_item(&self, item_id: i64, caller: Option<i64>) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = match caller {
                Some(user_id) => conn.execute(
                    "DELETE FROM items WHERE id = ?1 AND user_id = ?2",
                    params![item_id, user_id],
                )?,
                None => conn.execute("DELETE FROM items WHERE id = ?1", [item_id])?,
            };
            Ok(deleted > 0)
        })
    }

    pub fn item_owner(&self, item_id: i64) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let owner = conn
                .query_row("SELECT user_id FROM items WHERE id = ?1", [item_id], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(owner)
        })
    }

    pub fn set_item_image(&self, item_id: i64, image_url: &str, caller: Option<i64>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = match caller {
                Some(user_id) => conn.execute(
                    "UPDATE items SET image_url = ?1, updated_at = datetime('now')
                     WHERE id = ?2 AND user_id = ?3",
                    params![image_url, item_id, user_id],
                )?,
                None => conn.execute(
                    "UPDATE items SET image_url = ?1, updated_at = datetime('now') WHERE id = ?2",
                    params![image_url, item_id],
                )?,
            };
            Ok(changed > 0)
        })
    }

    /// Item counts for the admin overview, in a single scan.
    pub fn item_stats(&self) -> Result<ItemStats> {
        self.with_conn(|conn| {
            let stats = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN item_type = 'lost' THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN item_type = 'found' THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0)
                 FROM items",
                [],
                |row| {
                    Ok(ItemStats {
                        total: row.get(0)?,
                        lost: row.get(1)?,
                        found: row.get(2)?,
                        active: row.get(3)?,
                    })
                },
            )?;
            Ok(stats)
        })
    }

    // -- Messages --

    pub fn create_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        item_id: Option<i64>,
        body: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (sender_id, receiver_id, item_id, message)
                 VALUES (?1, ?2, ?3, ?4)",
                params![sender_id, receiver_id, item_id, body],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Everything the user sent or received, enriched with participant
    /// usernames and the item title when the item still exists, newest first.
    pub fn user_messages(&self, user_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.sender_id, s.username, m.receiver_id, r.username,
                        m.item_id, i.title, m.message, m.is_read, m.created_at
                 FROM messages m
                 JOIN users s ON m.sender_id = s.id
                 JOIN users r ON m.receiver_id = r.id
                 LEFT JOIN items i ON m.item_id = i.id
                 WHERE m.sender_id = ?1 OR m.receiver_id = ?1
                 ORDER BY m.created_at DESC, m.id DESC",
            )?;
            let rows = stmt
                .query_map([user_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Item context of the most recent message between two users, if any.
    /// Used to keep the item reference sticky when replying in a thread.
    pub fn thread_item_context(&self, user_a: i64, user_b: i64) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let item_id: Option<Option<i64>> = conn
                .query_row(
                    "SELECT item_id FROM messages
                     WHERE (sender_id = ?1 AND receiver_id = ?2)
                        OR (sender_id = ?2 AND receiver_id = ?1)
                     ORDER BY created_at DESC, id DESC
                     LIMIT 1",
                    params![user_a, user_b],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(item_id.flatten())
        })
    }

    /// Idempotent; a no-op when the message is already read or the id does
    /// not exist.
    pub fn mark_message_read(&self, message_id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE messages SET is_read = 1 WHERE id = ?1", [message_id])?;
            Ok(())
        })
    }
}

fn query_user(
    conn: &Connection,
    filter: &str,
    filter_params: &[&dyn rusqlite::types::ToSql],
) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, username, password_hash, role, email, created_at FROM users WHERE {filter}"
    );
    let row = conn
        .query_row(&sql, filter_params, |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password_hash: row.get(2)?,
                role: column_enum(3, row.get(3)?)?,
                email: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .optional()?;
    Ok(row)
}

fn item_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ItemRow> {
    Ok(ItemRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        item_type: column_enum(3, row.get(3)?)?,
        image_url: row.get(4)?,
        status: column_enum(5, row.get(5)?)?,
        user_id: row.get(6)?,
        owner_username: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        sender_username: row.get(2)?,
        receiver_id: row.get(3)?,
        receiver_username: row.get(4)?,
        item_id: row.get(5)?,
        item_title: row.get(6)?,
        body: row.get(7)?,
        is_read: row.get(8)?,
        created_at: row.get(9)?,
    })
}
