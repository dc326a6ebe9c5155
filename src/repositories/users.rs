use crate::models::users::{DashboardStats, NewUser, Referral, Role, User};
use crate::models::Page;

use chrono::{DateTime, Utc};
use rand::Rng;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

const REFERRAL_CODE_LEN: usize = 8;
const REFERRAL_CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

fn generate_referral_code() -> String {
    let mut rng = rand::thread_rng();
    (0..REFERRAL_CODE_LEN)
        .map(|_| REFERRAL_CODE_CHARSET[rng.gen_range(0..REFERRAL_CODE_CHARSET.len())] as char)
        .collect()
}

#[derive(Clone)]
pub struct UserRepository {
    conn: PgPool,
}

impl UserRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    pub fn pool(&self) -> &PgPool {
        &self.conn
    }

    /// Inserts a user, resolving `referral_code` to the referrer. Unknown codes are ignored.
    pub async fn insert_user(
        conn: &mut PgConnection,
        new_user: &NewUser,
    ) -> Result<User, anyhow::Error> {
        let referred_by: Option<Uuid> = match &new_user.referral_code {
            Some(code) => {
                sqlx::query_scalar("SELECT id FROM users WHERE referral_code = $1")
                    .bind(code.trim().to_uppercase())
                    .fetch_optional(&mut *conn)
                    .await?
            }
            None => None,
        };

        let role = if new_user.is_admin {
            Role::Admin
        } else {
            Role::User
        };

        // A fresh random code collides only rarely; retry a few times before giving up.
        for _ in 0..5 {
            let user = sqlx::query_as::<_, User>(
                r#"
                INSERT INTO users
                (id, email, password_hash, telegram_id, username, display_name, role, referral_code, referred_by)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (referral_code) DO NOTHING
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .bind(new_user.telegram_id)
            .bind(&new_user.username)
            .bind(&new_user.display_name)
            .bind(role)
            .bind(generate_referral_code())
            .bind(referred_by)
            .fetch_optional(&mut *conn)
            .await?;

            if let Some(user) = user {
                return Ok(user);
            }
        }

        anyhow::bail!("Could not allocate a unique referral code")
    }

    pub async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, anyhow::Error> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, anyhow::Error> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.conn)
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_telegram_id(
        &self,
        telegram_id: i64,
    ) -> Result<Option<User>, anyhow::Error> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE telegram_id = $1")
            .bind(telegram_id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(user)
    }

    /// Locks the user row for the rest of the surrounding transaction.
    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<User>, anyhow::Error> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(user)
    }

    /// Adds `amount` to the balance and lifetime earnings.
    /// Referral commissions also count towards `referral_earnings_micros`.
    pub async fn credit(
        conn: &mut PgConnection,
        id: Uuid,
        amount: i64,
        is_referral: bool,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            UPDATE users SET
                balance_micros = balance_micros + $2,
                total_earned_micros = total_earned_micros + $2,
                referral_earnings_micros = referral_earnings_micros + CASE WHEN $3 THEN $2 ELSE 0 END,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(amount)
        .bind(is_referral)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Moves the balance by a signed amount without touching lifetime earnings.
    pub async fn adjust_balance(
        conn: &mut PgConnection,
        id: Uuid,
        delta: i64,
    ) -> Result<i64, anyhow::Error> {
        let balance: i64 = sqlx::query_scalar(
            r#"
            UPDATE users SET balance_micros = balance_micros + $2, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            RETURNING balance_micros
            "#,
        )
        .bind(id)
        .bind(delta)
        .fetch_one(&mut *conn)
        .await?;

        Ok(balance)
    }

    pub async fn record_ad_watch(
        conn: &mut PgConnection,
        id: Uuid,
        reward: i64,
        at: DateTime<Utc>,
    ) -> Result<User, anyhow::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                balance_micros = balance_micros + $2,
                total_earned_micros = total_earned_micros + $2,
                ads_watched = ads_watched + 1,
                last_ad_watched_at = $3,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(reward)
        .bind(at)
        .fetch_one(&mut *conn)
        .await?;

        Ok(user)
    }

    pub async fn add_withdrawn(
        conn: &mut PgConnection,
        id: Uuid,
        amount: i64,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            "UPDATE users SET total_withdrawn_micros = total_withdrawn_micros + $2, updated_at = CURRENT_TIMESTAMP WHERE id = $1",
        )
        .bind(id)
        .bind(amount)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn update_telegram_profile(
        &self,
        id: Uuid,
        username: Option<&str>,
        display_name: &str,
    ) -> Result<User, anyhow::Error> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET username = $2, display_name = $3, updated_at = CURRENT_TIMESTAMP WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(username)
        .bind(display_name)
        .fetch_one(&self.conn)
        .await?;

        Ok(user)
    }

    pub async fn set_role(&self, id: Uuid, role: Role) -> Result<User, anyhow::Error> {
        let mut conn = self.conn.acquire().await?;
        Self::update_role(&mut *conn, id, role).await
    }

    pub async fn update_role(
        conn: &mut PgConnection,
        id: Uuid,
        role: Role,
    ) -> Result<User, anyhow::Error> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET role = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(role)
        .fetch_one(&mut *conn)
        .await?;

        Ok(user)
    }

    pub async fn set_ban(
        conn: &mut PgConnection,
        id: Uuid,
        banned: bool,
        reason: Option<&str>,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            "UPDATE users SET is_banned = $2, ban_reason = $3, updated_at = CURRENT_TIMESTAMP WHERE id = $1",
        )
        .bind(id)
        .bind(banned)
        .bind(if banned { reason } else { None })
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn delete_user(&self, id: Uuid) -> Result<bool, anyhow::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_referrals(&self, id: Uuid) -> Result<i64, anyhow::Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE referred_by = $1")
            .bind(id)
            .fetch_one(&self.conn)
            .await?;

        Ok(count)
    }

    pub async fn list_referrals(&self, id: Uuid) -> Result<Vec<Referral>, anyhow::Error> {
        let referrals = sqlx::query_as::<_, Referral>(
            "SELECT id, display_name, ads_watched, created_at FROM users WHERE referred_by = $1 ORDER BY created_at DESC",
        )
        .bind(id)
        .fetch_all(&self.conn)
        .await?;

        Ok(referrals)
    }

    pub async fn list_users(
        &self,
        search: Option<&str>,
        page: Page,
    ) -> Result<(Vec<User>, i64), anyhow::Error> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.replace('%', "\\%").replace('_', "\\_")));

        let filter = r#"
            $1::TEXT IS NULL
            OR email ILIKE $1
            OR username ILIKE $1
            OR display_name ILIKE $1
            OR referral_code ILIKE $1
        "#;

        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT * FROM users WHERE {} ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            filter
        ))
        .bind(&pattern)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.conn)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(1) FROM users WHERE {}", filter))
            .bind(&pattern)
            .fetch_one(&self.conn)
            .await?;

        Ok((users, total))
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats, anyhow::Error> {
        let stats = sqlx::query_as::<_, DashboardStats>(
            r#"
            SELECT
                (SELECT COUNT(1) FROM users) AS total_users,
                (SELECT COUNT(1) FROM users WHERE is_banned) AS banned_users,
                (SELECT COALESCE(SUM(ads_watched), 0)::BIGINT FROM users) AS total_ads_watched,
                (SELECT COALESCE(SUM(balance_micros), 0)::BIGINT FROM users) AS outstanding_balance_micros,
                (SELECT COUNT(1) FROM withdrawals WHERE status = 'pending') AS pending_withdrawals,
                (SELECT COALESCE(SUM(amount_micros), 0)::BIGINT FROM withdrawals WHERE status = 'pending') AS pending_withdrawal_micros,
                (SELECT COALESCE(SUM(amount_micros), 0)::BIGINT FROM withdrawals WHERE status = 'approved') AS approved_withdrawal_micros
            "#,
        )
        .fetch_one(&self.conn)
        .await?;

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referral_codes_use_unambiguous_charset() {
        for _ in 0..100 {
            let code = generate_referral_code();
            assert_eq!(code.len(), REFERRAL_CODE_LEN);
            assert!(code.bytes().all(|b| REFERRAL_CODE_CHARSET.contains(&b)));
            assert!(!code.contains('O') && !code.contains('0') && !code.contains('I'));
        }
    }
}
