//! Turns the flat, bidirectional message list into per-partner conversations.
//! Grouping is purely by partner id: every item discussed with the same
//! partner lands in one conversation.

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;

use reclaim_db::Database;
use reclaim_db::models::MessageRow;
use reclaim_types::api::{
    Claims, Conversation, ConversationSummary, ConversationThread, SendMessageRequest,
    SendMessageResponse,
};
use reclaim_types::models::Message;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::util::parse_db_time;

pub(crate) fn message_from_row(row: MessageRow) -> Message {
    Message {
        id: row.id,
        sender_id: row.sender_id,
        sender_username: row.sender_username,
        receiver_id: row.receiver_id,
        receiver_username: row.receiver_username,
        item_id: row.item_id,
        item_title: row.item_title,
        body: row.body,
        is_read: row.is_read,
        created_at: parse_db_time(&row.created_at),
    }
}

/// Partition messages by conversation partner (the other participant),
/// ordering conversations by most recent activity and each thread
/// oldest-to-newest. `unread` counts messages the viewer received and has
/// not read yet.
pub fn group_conversations(viewer_id: i64, messages: Vec<Message>) -> Vec<Conversation> {
    let mut by_partner: HashMap<i64, Conversation> = HashMap::new();

    for msg in messages {
        let (partner_id, partner_username) = if msg.sender_id == viewer_id {
            (msg.receiver_id, msg.receiver_username.clone())
        } else {
            (msg.sender_id, msg.sender_username.clone())
        };

        let conv = by_partner.entry(partner_id).or_insert_with(|| Conversation {
            partner_id,
            partner_username,
            last_activity: msg.created_at,
            unread: 0,
            messages: Vec::new(),
        });
        if msg.created_at > conv.last_activity {
            conv.last_activity = msg.created_at;
        }
        if msg.receiver_id == viewer_id && !msg.is_read {
            conv.unread += 1;
        }
        conv.messages.push(msg);
    }

    let mut conversations: Vec<Conversation> = by_partner.into_values().collect();
    for conv in &mut conversations {
        conv.messages
            .sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
    }
    conversations.sort_by(|a, b| {
        b.last_activity
            .cmp(&a.last_activity)
            .then(a.partner_id.cmp(&b.partner_id))
    });
    conversations
}

pub fn list_conversations(db: &Database, viewer_id: i64) -> Result<Vec<ConversationSummary>, ApiError> {
    let messages = db
        .user_messages(viewer_id)?
        .into_iter()
        .map(message_from_row)
        .collect();

    let summaries = group_conversations(viewer_id, messages)
        .into_iter()
        .map(|c| ConversationSummary {
            partner_id: c.partner_id,
            partner_username: c.partner_username,
            last_activity: c.last_activity,
            unread: c.unread,
        })
        .collect();
    Ok(summaries)
}

/// One thread, oldest first. Viewing it marks every unread message addressed
/// to the viewer as read — a render-triggered side effect, not a separate
/// user action. The returned payload still shows the pre-view read state.
pub fn view_conversation(
    db: &Database,
    viewer_id: i64,
    partner_id: i64,
) -> Result<ConversationThread, ApiError> {
    let partner = db.get_user_by_id(partner_id)?.ok_or(ApiError::UserNotFound)?;

    let mut messages: Vec<Message> = db
        .user_messages(viewer_id)?
        .into_iter()
        .filter(|m| m.sender_id == partner_id || m.receiver_id == partner_id)
        .map(message_from_row)
        .collect();
    messages.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));

    for msg in &messages {
        if msg.receiver_id == viewer_id && !msg.is_read {
            db.mark_message_read(msg.id)?;
        }
    }

    Ok(ConversationThread {
        partner_id,
        partner_username: partner.username,
        messages,
    })
}

/// Send a message. An absent `item_id` inherits the item context of the most
/// recent message in the thread, so replies stay attached to the item being
/// discussed until a different one is referenced.
pub fn send(db: &Database, sender_id: i64, req: &SendMessageRequest) -> Result<i64, ApiError> {
    if req.body.trim().is_empty() {
        return Err(ApiError::MissingFields("message text is required"));
    }
    if db.get_user_by_id(req.receiver_id)?.is_none() {
        return Err(ApiError::UserNotFound);
    }

    let item_id = match req.item_id {
        Some(id) => Some(id),
        None => db.thread_item_context(sender_id, req.receiver_id)?,
    };

    let message_id = db.create_message(sender_id, req.receiver_id, item_id, &req.body)?;
    Ok(message_id)
}

// -- Handlers --

pub async fn get_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    // The inbox reads the full message history; run it off the async runtime.
    let db = state.clone();
    let summaries = tokio::task::spawn_blocking(move || list_conversations(&db.db, claims.sub))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!(e))
        })??;
    Ok(Json(summaries))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(partner_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let thread =
        tokio::task::spawn_blocking(move || view_conversation(&db.db, claims.sub, partner_id))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal(anyhow::anyhow!(e))
            })??;
    Ok(Json(thread))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message_id = send(&state.db, claims.sub, &req)?;
    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse { message_id }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::register_user;
    use chrono::{TimeZone, Utc};
    use reclaim_types::models::ItemType;

    fn msg(id: i64, sender: i64, receiver: i64, minute: u32, read: bool) -> Message {
        Message {
            id,
            sender_id: sender,
            sender_username: format!("user{sender}"),
            receiver_id: receiver,
            receiver_username: format!("user{receiver}"),
            item_id: None,
            item_title: None,
            body: format!("message {id}"),
            is_read: read,
            created_at: Utc.with_ymd_and_hms(2026, 8, 24, 12, minute, 0).unwrap(),
        }
    }

    #[test]
    fn empty_inbox_is_empty_not_an_error() {
        assert!(group_conversations(1, Vec::new()).is_empty());
    }

    #[test]
    fn groups_by_partner_and_orders_by_recency() {
        // Alice (1) talks to Bob (2) and Carol (3), interleaved.
        let messages = vec![
            msg(1, 1, 2, 0, true),   // alice -> bob
            msg(2, 3, 1, 1, false),  // carol -> alice
            msg(3, 2, 1, 2, false),  // bob -> alice
            msg(4, 1, 3, 3, true),   // alice -> carol, most recent
        ];

        let convs = group_conversations(1, messages);
        assert_eq!(convs.len(), 2);

        // Carol's thread is the most recently active
        assert_eq!(convs[0].partner_id, 3);
        assert_eq!(convs[1].partner_id, 2);

        // Oldest first within each thread
        assert_eq!(
            convs[0].messages.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![2, 4]
        );
        assert_eq!(
            convs[1].messages.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![1, 3]
        );

        // Unread counts only received-and-unread messages
        assert_eq!(convs[0].unread, 1);
        assert_eq!(convs[1].unread, 1);
    }

    #[test]
    fn partner_name_comes_from_the_other_side() {
        let convs = group_conversations(1, vec![msg(1, 1, 2, 0, false)]);
        assert_eq!(convs[0].partner_username, "user2");

        let convs = group_conversations(2, vec![msg(1, 1, 2, 0, false)]);
        assert_eq!(convs[0].partner_username, "user1");
    }

    #[test]
    fn sent_messages_never_count_as_unread() {
        let convs = group_conversations(1, vec![msg(1, 1, 2, 0, false)]);
        assert_eq!(convs[0].unread, 0);
    }

    fn setup() -> (Database, i64, i64) {
        let db = Database::open_in_memory().unwrap();
        let (alice, _) = register_user(&db, "alice", "secret1", "student", None).unwrap();
        let (bob, _) = register_user(&db, "bob", "secret1", "student", None).unwrap();
        (db, alice, bob)
    }

    #[test]
    fn viewing_a_thread_marks_received_messages_read() {
        let (db, alice, bob) = setup();
        db.create_message(alice, bob, None, "hi bob").unwrap();
        db.create_message(bob, alice, None, "hi alice").unwrap();

        let thread = view_conversation(&db, bob, alice).unwrap();
        assert_eq!(thread.partner_username, "alice");
        assert_eq!(thread.messages.len(), 2);

        // Bob's received message is now read; his sent one is untouched
        let rows = db.user_messages(bob).unwrap();
        for row in rows {
            if row.receiver_id == bob {
                assert!(row.is_read);
            } else {
                assert!(!row.is_read);
            }
        }
    }

    #[test]
    fn viewing_unknown_partner_fails() {
        let (db, alice, _) = setup();
        assert!(matches!(
            view_conversation(&db, alice, 9999),
            Err(ApiError::UserNotFound)
        ));
    }

    #[test]
    fn reply_inherits_item_context() {
        let (db, alice, bob) = setup();
        let item = db
            .create_item("Backpack", "lost", ItemType::Lost, None, alice)
            .unwrap();

        // First message explicitly references the item
        send(
            &db,
            bob,
            &SendMessageRequest {
                receiver_id: alice,
                item_id: Some(item),
                body: "I think I found it".into(),
            },
        )
        .unwrap();

        // Reply without an item id stays on the same item
        send(
            &db,
            alice,
            &SendMessageRequest {
                receiver_id: bob,
                item_id: None,
                body: "Where?".into(),
            },
        )
        .unwrap();

        let thread = view_conversation(&db, alice, bob).unwrap();
        assert_eq!(thread.messages.len(), 2);
        assert!(thread.messages.iter().all(|m| m.item_id == Some(item)));
        assert_eq!(thread.messages[1].item_title.as_deref(), Some("Backpack"));
    }

    #[test]
    fn send_rejects_empty_body_and_unknown_receiver() {
        let (db, alice, _) = setup();
        assert!(matches!(
            send(
                &db,
                alice,
                &SendMessageRequest {
                    receiver_id: alice,
                    item_id: None,
                    body: "   ".into()
                }
            ),
            Err(ApiError::MissingFields(_))
        ));
        assert!(matches!(
            send(
                &db,
                alice,
                &SendMessageRequest {
                    receiver_id: 9999,
                    item_id: None,
                    body: "hello".into()
                }
            ),
            Err(ApiError::UserNotFound)
        ));
    }
}
