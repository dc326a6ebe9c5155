use crate::models::notices::{Notice, NoticeInput};

use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct NoticeRepository {
    conn: PgPool,
}

impl NoticeRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    pub async fn list(&self, active_only: bool) -> Result<Vec<Notice>, anyhow::Error> {
        let notices = sqlx::query_as::<_, Notice>(
            "SELECT * FROM notices WHERE is_active OR NOT $1 ORDER BY pinned DESC, created_at DESC",
        )
        .bind(active_only)
        .fetch_all(&self.conn)
        .await?;

        Ok(notices)
    }

    pub async fn insert(&self, input: &NoticeInput) -> Result<Notice, anyhow::Error> {
        let notice = sqlx::query_as::<_, Notice>(
            r#"
            INSERT INTO notices (id, title, body, level, is_active, pinned)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.title)
        .bind(&input.body)
        .bind(input.level)
        .bind(input.is_active)
        .bind(input.pinned)
        .fetch_one(&self.conn)
        .await?;

        Ok(notice)
    }

    pub async fn update(&self, id: Uuid, input: &NoticeInput) -> Result<Option<Notice>, anyhow::Error> {
        let notice = sqlx::query_as::<_, Notice>(
            r#"
            UPDATE notices
            SET title = $2, body = $3, level = $4, is_active = $5, pinned = $6, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.title)
        .bind(&input.body)
        .bind(input.level)
        .bind(input.is_active)
        .bind(input.pinned)
        .fetch_optional(&self.conn)
        .await?;

        Ok(notice)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, anyhow::Error> {
        let result = sqlx::query("DELETE FROM notices WHERE id = $1")
            .bind(id)
            .execute(&self.conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
