//! Conversation and message queries

use super::models::parse_column;
use super::Database;
use crate::domain::{message::participant_pair, Conversation, Message, MessagePage, Participant};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{debug, info};

// ?1 is the viewer whose unread count is reported
const CONVERSATION_SELECT: &str = "SELECT c.id, c.contract_id, c.last_message, c.last_message_time, \
    c.created_at, c.updated_at, \
    c.participant_a, COALESCE(ua.full_name, 'Unknown'), ua.role, \
    c.participant_b, COALESCE(ub.full_name, 'Unknown'), ub.role, \
    (SELECT COUNT(*) FROM messages m \
     WHERE m.conversation_id = c.id AND m.sender_id != ?1 AND m.is_read = 0) \
    FROM conversations c \
    LEFT JOIN users ua ON ua.id = c.participant_a \
    LEFT JOIN users ub ON ub.id = c.participant_b";

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let mut participants = Vec::with_capacity(2);
    for base in [6, 9] {
        // a deleted account leaves no role to show
        if row.get::<_, Option<String>>(base + 2)?.is_some() {
            participants.push(Participant {
                id: row.get(base)?,
                name: row.get(base + 1)?,
                role: parse_column(row, base + 2)?,
            });
        }
    }

    Ok(Conversation {
        id: row.get(0)?,
        participants,
        contract_id: row.get(1)?,
        last_message: row.get(2)?,
        last_message_time: row.get(3)?,
        unread_count: row.get(12)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_name: row.get(3)?,
        content: row.get(4)?,
        timestamp: row.get(5)?,
        is_read: row.get(6)?,
    })
}

fn load_conversation(conn: &Connection, id: &str, viewer: &str) -> rusqlite::Result<Option<Conversation>> {
    conn.query_row(
        &format!("{} WHERE c.id = ?2", CONVERSATION_SELECT),
        [viewer, id],
        conversation_from_row,
    )
    .optional()
}

/// Conversation and message queries
pub struct ConversationQueries<'a> {
    db: &'a Database,
}

impl<'a> ConversationQueries<'a> {
    /// Create a new query instance
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Open the conversation between two users, or return the existing one
    ///
    /// A pair of users shares a single conversation; `contract_id` is only
    /// recorded when the conversation is first created.
    pub async fn open(
        &self,
        viewer: &str,
        other: &str,
        contract_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Conversation> {
        let (a, b) = participant_pair(viewer, other);

        let conn = self.db.conn();
        let mut conn = conn.lock().await;
        let tx = conn.transaction()?;

        let created = tx.execute(
            r#"
            INSERT OR IGNORE INTO conversations (id, participant_a, participant_b, contract_id,
                                                 created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
            rusqlite::params![uuid::Uuid::new_v4().to_string(), a, b, contract_id, at],
        )?;
        let id: String = tx.query_row(
            "SELECT id FROM conversations WHERE participant_a = ?1 AND participant_b = ?2",
            [a, b],
            |row| row.get(0),
        )?;
        let conversation = load_conversation(&tx, &id, viewer)?
            .ok_or_else(|| anyhow::anyhow!("conversation {} vanished", id))?;
        tx.commit()?;

        if created > 0 {
            info!("DB: Created conversation: id={}, between {} and {}", id, a, b);
        }
        Ok(conversation)
    }

    /// A conversation as `viewer` sees it
    pub async fn get(&self, id: &str, viewer: &str) -> Result<Option<Conversation>> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        Ok(load_conversation(&conn, id, viewer)?)
    }

    /// The user's conversations, most recently active first
    pub async fn list_for_user(&self, user_id: &str, limit: u32) -> Result<Vec<Conversation>> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE c.participant_a = ?1 OR c.participant_b = ?1 \
             ORDER BY c.updated_at DESC LIMIT ?2",
            CONVERSATION_SELECT
        ))?;
        let rows = stmt.query_map(rusqlite::params![user_id, limit], conversation_from_row)?;

        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row?);
        }
        debug!("DB: Listed {} conversations for {}", conversations.len(), user_id);
        Ok(conversations)
    }

    /// A page of messages, oldest first, marking the other side's as read
    ///
    /// The returned messages carry their read flag from before the call.
    pub async fn read_page(&self, id: &str, reader: &str, page: MessagePage) -> Result<Vec<Message>> {
        let conn = self.db.conn();
        let mut conn = conn.lock().await;
        let tx = conn.transaction()?;

        let messages = {
            let mut stmt = tx.prepare(
                r#"
                SELECT id, conversation_id, sender_id, sender_name, content, created_at, is_read
                FROM messages
                WHERE conversation_id = ?1
                ORDER BY created_at ASC, seq ASC
                LIMIT ?2 OFFSET ?3
                "#,
            )?;
            let rows = stmt.query_map(rusqlite::params![id, page.limit, page.skip], message_from_row)?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            messages
        };

        let marked = tx.execute(
            "UPDATE messages SET is_read = 1 WHERE conversation_id = ?1 AND sender_id != ?2 AND is_read = 0",
            [id, reader],
        )?;
        tx.commit()?;

        debug!(
            "DB: Read {} messages of {}, marked {} read for {}",
            messages.len(),
            id,
            marked,
            reader
        );
        Ok(messages)
    }

    /// Store a message and move the conversation's latest-message preview
    pub async fn append(&self, message: &Message, preview: &str) -> Result<()> {
        let conn = self.db.conn();
        let mut conn = conn.lock().await;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, sender_name, content, created_at, is_read)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            rusqlite::params![
                &message.id,
                &message.conversation_id,
                &message.sender_id,
                &message.sender_name,
                &message.content,
                message.timestamp,
                message.is_read,
            ],
        )?;
        tx.execute(
            r#"
            UPDATE conversations
            SET last_message = ?1, last_message_time = ?2, updated_at = ?2
            WHERE id = ?3
            "#,
            rusqlite::params![preview, message.timestamp, &message.conversation_id],
        )?;
        tx.commit()?;

        info!(
            "DB: Stored message: id={}, conversation_id={}, sender_id={}",
            message.id, message.conversation_id, message.sender_id
        );
        Ok(())
    }
}
