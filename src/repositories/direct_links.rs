use crate::models::direct_links::{DirectLink, DirectLinkInput};

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

#[derive(Clone)]
pub struct DirectLinkRepository {
    conn: PgPool,
}

impl DirectLinkRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    pub fn pool(&self) -> &PgPool {
        &self.conn
    }

    pub async fn list(&self, active_only: bool) -> Result<Vec<DirectLink>, anyhow::Error> {
        let links = sqlx::query_as::<_, DirectLink>(
            "SELECT * FROM direct_links WHERE is_active OR NOT $1 ORDER BY created_at DESC",
        )
        .bind(active_only)
        .fetch_all(&self.conn)
        .await?;

        Ok(links)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<DirectLink>, anyhow::Error> {
        let link = sqlx::query_as::<_, DirectLink>("SELECT * FROM direct_links WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(link)
    }

    pub async fn insert(&self, input: &DirectLinkInput) -> Result<DirectLink, anyhow::Error> {
        let link = sqlx::query_as::<_, DirectLink>(
            r#"
            INSERT INTO direct_links (id, title, url, reward_micros, is_active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.title)
        .bind(&input.url)
        .bind(input.reward_micros)
        .bind(input.is_active)
        .fetch_one(&self.conn)
        .await?;

        Ok(link)
    }

    pub async fn update(
        &self,
        id: Uuid,
        input: &DirectLinkInput,
    ) -> Result<Option<DirectLink>, anyhow::Error> {
        let link = sqlx::query_as::<_, DirectLink>(
            r#"
            UPDATE direct_links
            SET title = $2, url = $3, reward_micros = $4, is_active = $5, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.title)
        .bind(&input.url)
        .bind(input.reward_micros)
        .bind(input.is_active)
        .fetch_optional(&self.conn)
        .await?;

        Ok(link)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, anyhow::Error> {
        let result = sqlx::query("DELETE FROM direct_links WHERE id = $1")
            .bind(id)
            .execute(&self.conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Most recent rewarded click per link for this user.
    pub async fn last_rewarded_clicks(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<(Uuid, DateTime<Utc>)>, anyhow::Error> {
        let rows: Vec<(Uuid, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT link_id, MAX(created_at)
            FROM direct_link_clicks
            WHERE user_id = $1 AND reward_micros > 0
            GROUP BY link_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(rows)
    }

    pub async fn last_rewarded_click(
        conn: &mut PgConnection,
        user_id: Uuid,
        link_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, anyhow::Error> {
        let at: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT MAX(created_at) FROM direct_link_clicks WHERE user_id = $1 AND link_id = $2 AND reward_micros > 0",
        )
        .bind(user_id)
        .bind(link_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(at)
    }

    pub async fn record_click(
        conn: &mut PgConnection,
        user_id: Uuid,
        link_id: Uuid,
        reward_micros: i64,
    ) -> Result<Uuid, anyhow::Error> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO direct_link_clicks (id, link_id, user_id, reward_micros) VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(link_id)
        .bind(user_id)
        .bind(reward_micros)
        .execute(&mut *conn)
        .await?;

        sqlx::query("UPDATE direct_links SET clicks = clicks + 1 WHERE id = $1")
            .bind(link_id)
            .execute(&mut *conn)
            .await?;

        Ok(id)
    }
}
