use crate::models::security::{NewViolation, SecurityViolation};
use crate::models::Page;

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

#[derive(Clone)]
pub struct SecurityRepository {
    conn: PgPool,
}

impl SecurityRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    pub fn pool(&self) -> &PgPool {
        &self.conn
    }

    pub async fn insert(
        conn: &mut PgConnection,
        violation: &NewViolation,
    ) -> Result<SecurityViolation, anyhow::Error> {
        let violation = sqlx::query_as::<_, SecurityViolation>(
            r#"
            INSERT INTO security_violations (id, user_id, kind, details, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(violation.user_id)
        .bind(violation.kind)
        .bind(&violation.details)
        .bind(&violation.ip_address)
        .bind(&violation.user_agent)
        .fetch_one(&mut *conn)
        .await?;

        Ok(violation)
    }

    pub async fn count_for_user(conn: &mut PgConnection, user_id: Uuid) -> Result<i64, anyhow::Error> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM security_violations WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&mut *conn)
                .await?;

        Ok(count)
    }

    pub async fn list(
        &self,
        user_id: Option<Uuid>,
        page: Page,
    ) -> Result<(Vec<SecurityViolation>, i64), anyhow::Error> {
        let violations = sqlx::query_as::<_, SecurityViolation>(
            r#"
            SELECT * FROM security_violations
            WHERE $1::UUID IS NULL OR user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.conn)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM security_violations WHERE $1::UUID IS NULL OR user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.conn)
        .await?;

        Ok((violations, total))
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, anyhow::Error> {
        let result = sqlx::query("DELETE FROM security_violations WHERE id = $1")
            .bind(id)
            .execute(&self.conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
