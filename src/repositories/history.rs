use crate::models::history::{History, HistoryKind, NewHistory};
use crate::models::Page;

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

#[derive(Clone)]
pub struct HistoryRepository {
    conn: PgPool,
}

impl HistoryRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    pub async fn insert(conn: &mut PgConnection, entry: &NewHistory) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO history (id, user_id, kind, amount_micros, description, reference_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.user_id)
        .bind(entry.kind)
        .bind(entry.amount_micros)
        .bind(&entry.description)
        .bind(entry.reference_id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Entries of `kind` for the user since `since`.
    pub async fn count_since(
        conn: &mut PgConnection,
        user_id: Uuid,
        kind: HistoryKind,
        since: DateTime<Utc>,
    ) -> Result<i64, anyhow::Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM history WHERE user_id = $1 AND kind = $2 AND created_at >= $3",
        )
        .bind(user_id)
        .bind(kind)
        .bind(since)
        .fetch_one(&mut *conn)
        .await?;

        Ok(count)
    }

    pub async fn count_today(
        &self,
        user_id: Uuid,
        kind: HistoryKind,
        now: DateTime<Utc>,
    ) -> Result<i64, anyhow::Error> {
        let mut conn = self.conn.acquire().await?;
        Self::count_since(&mut *conn, user_id, kind, start_of_day(now)).await
    }

    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        page: Page,
    ) -> Result<(Vec<History>, i64), anyhow::Error> {
        let items = sqlx::query_as::<_, History>(
            "SELECT * FROM history WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.conn)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM history WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.conn)
            .await?;

        Ok((items, total))
    }
}

/// UTC midnight of the day containing `now`.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn start_of_day_is_utc_midnight() {
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 17, 45, 12).unwrap();
        assert_eq!(
            start_of_day(now),
            Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap()
        );
    }
}
