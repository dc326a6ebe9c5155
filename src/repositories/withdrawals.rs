use crate::models::withdrawals::{Withdrawal, WithdrawalQuote, WithdrawalStatus};
use crate::models::Page;

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

#[derive(Clone)]
pub struct WithdrawalRepository {
    conn: PgPool,
}

impl WithdrawalRepository {
    pub fn new(conn: PgPool) -> Self {
        WithdrawalRepository { conn }
    }

    pub async fn insert(
        conn: &mut PgConnection,
        user_id: Uuid,
        account: &str,
        quote: &WithdrawalQuote,
    ) -> Result<Withdrawal, anyhow::Error> {
        let withdrawal = sqlx::query_as::<_, Withdrawal>(
            r#"
            INSERT INTO withdrawals
            (id, user_id, method, account, amount_micros, fee_micros, net_micros,
             payout_currency, payout_amount_minor, exchange_rate, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(quote.method)
        .bind(account)
        .bind(quote.amount_micros)
        .bind(quote.fee_micros)
        .bind(quote.net_micros)
        .bind(quote.payout_currency)
        .bind(quote.payout_amount_minor)
        .bind(quote.exchange_rate)
        .fetch_one(&mut *conn)
        .await?;

        Ok(withdrawal)
    }

    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<Withdrawal>, anyhow::Error> {
        let withdrawal =
            sqlx::query_as::<_, Withdrawal>("SELECT * FROM withdrawals WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;

        Ok(withdrawal)
    }

    pub async fn resolve(
        conn: &mut PgConnection,
        id: Uuid,
        status: WithdrawalStatus,
        note: Option<&str>,
    ) -> Result<Withdrawal, anyhow::Error> {
        let withdrawal = sqlx::query_as::<_, Withdrawal>(
            r#"
            UPDATE withdrawals
            SET status = $2, admin_note = $3, processed_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(note)
        .fetch_one(&mut *conn)
        .await?;

        Ok(withdrawal)
    }

    pub async fn has_pending(conn: &mut PgConnection, user_id: Uuid) -> Result<bool, anyhow::Error> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM withdrawals WHERE user_id = $1 AND status = 'pending')",
        )
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(exists)
    }

    pub async fn last_requested_at(
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, anyhow::Error> {
        let at: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT MAX(created_at) FROM withdrawals WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&mut *conn)
                .await?;

        Ok(at)
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Withdrawal>, anyhow::Error> {
        let withdrawals = sqlx::query_as::<_, Withdrawal>(
            "SELECT * FROM withdrawals WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(withdrawals)
    }

    pub async fn list(
        &self,
        status: Option<WithdrawalStatus>,
        page: Page,
    ) -> Result<(Vec<Withdrawal>, i64), anyhow::Error> {
        let withdrawals = sqlx::query_as::<_, Withdrawal>(
            r#"
            SELECT * FROM withdrawals
            WHERE $1::TEXT IS NULL OR status = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.conn)
        .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM withdrawals WHERE $1::TEXT IS NULL OR status = $1")
                .bind(status)
                .fetch_one(&self.conn)
                .await?;

        Ok((withdrawals, total))
    }

    pub fn pool(&self) -> &PgPool {
        &self.conn
    }
}
