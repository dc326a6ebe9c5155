use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_MESSAGE_CHARS: usize = 2_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Admin,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub user_id: Uuid,
    pub sender: Sender,
    pub body: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MessageInput {
    pub body: String,
}

impl MessageInput {
    pub fn normalized(self) -> Result<String, String> {
        let body = self.body.trim();
        let len = body.chars().count();
        if len == 0 || len > MAX_MESSAGE_CHARS {
            return Err(format!(
                "message must be between 1 and {} characters",
                MAX_MESSAGE_CHARS
            ));
        }
        Ok(body.to_string())
    }
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Conversation {
    pub user_id: Uuid,
    pub display_name: String,
    pub last_message: String,
    pub last_message_at: DateTime<Utc>,
    pub unread: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_body_is_trimmed_and_bounded() {
        let ok = MessageInput {
            body: "  hello support \n".to_string(),
        };
        assert_eq!(ok.normalized().unwrap(), "hello support");

        let blank = MessageInput {
            body: " \n ".to_string(),
        };
        assert!(blank.normalized().is_err());

        let long = MessageInput {
            body: "x".repeat(MAX_MESSAGE_CHARS + 1),
        };
        assert!(long.normalized().is_err());
    }
}
