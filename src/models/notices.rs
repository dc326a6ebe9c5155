use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    #[default]
    Info,
    Warning,
    Success,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Notice {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub level: NoticeLevel,
    pub is_active: bool,
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NoticeInput {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub level: NoticeLevel,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub pinned: bool,
}

fn default_active() -> bool {
    true
}

impl NoticeInput {
    /// Trims title and body and checks their lengths.
    pub fn normalized(mut self) -> Result<Self, String> {
        self.title = self.title.trim().to_string();
        self.body = self.body.trim().to_string();

        let title_len = self.title.chars().count();
        if title_len == 0 || title_len > 200 {
            return Err("title must be between 1 and 200 characters".to_string());
        }
        let body_len = self.body.chars().count();
        if body_len == 0 || body_len > 5_000 {
            return Err("body must be between 1 and 5000 characters".to_string());
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(title: &str, body: &str) -> NoticeInput {
        NoticeInput {
            title: title.to_string(),
            body: body.to_string(),
            level: NoticeLevel::Info,
            is_active: true,
            pinned: false,
        }
    }

    #[test]
    fn trims_and_accepts_valid_notice() {
        let notice = input("  Payout delay ", " Bkash is slow today. ").normalized().unwrap();
        assert_eq!(notice.title, "Payout delay");
        assert_eq!(notice.body, "Bkash is slow today.");
    }

    #[test]
    fn rejects_blank_title_and_oversized_body() {
        assert!(input("   ", "body").normalized().is_err());
        assert!(input("title", &"x".repeat(5_001)).normalized().is_err());
    }

    #[test]
    fn missing_flags_default_to_active_unpinned_info() {
        let notice: NoticeInput = serde_json::from_str(r#"{"title":"t","body":"b"}"#).unwrap();
        assert!(notice.is_active);
        assert!(!notice.pinned);
        assert_eq!(notice.level, NoticeLevel::Info);
    }
}
