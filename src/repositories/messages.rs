use crate::models::messages::{Conversation, Message, Sender};

use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct MessageRepository {
    conn: PgPool,
}

impl MessageRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    pub async fn insert(&self, user_id: Uuid, sender: Sender, body: &str) -> Result<Message, anyhow::Error> {
        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (id, user_id, sender, body)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(sender)
        .bind(body)
        .fetch_one(&self.conn)
        .await?;

        Ok(message)
    }

    /// Returns the thread and marks messages sent by `mark_read_from` as read.
    pub async fn thread(&self, user_id: Uuid, mark_read_from: Sender) -> Result<Vec<Message>, anyhow::Error> {
        sqlx::query("UPDATE messages SET is_read = TRUE WHERE user_id = $1 AND sender = $2 AND NOT is_read")
            .bind(user_id)
            .bind(mark_read_from)
            .execute(&self.conn)
            .await?;

        let messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(messages)
    }

    pub async fn conversations(&self) -> Result<Vec<Conversation>, anyhow::Error> {
        let mut conversations = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT DISTINCT ON (m.user_id)
                m.user_id,
                u.display_name,
                m.body AS last_message,
                m.created_at AS last_message_at,
                (SELECT COUNT(1) FROM messages x
                 WHERE x.user_id = m.user_id AND x.sender = 'user' AND NOT x.is_read) AS unread
            FROM messages m
            JOIN users u ON u.id = m.user_id
            ORDER BY m.user_id, m.created_at DESC
            "#,
        )
        .fetch_all(&self.conn)
        .await?;

        conversations.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));

        Ok(conversations)
    }
}
