use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub telegram_id: Option<i64>,
    pub username: Option<String>,
    pub display_name: String,
    pub role: Role,
    pub referral_code: String,
    pub referred_by: Option<Uuid>,
    pub balance_micros: i64,
    pub total_earned_micros: i64,
    pub referral_earnings_micros: i64,
    pub total_withdrawn_micros: i64,
    pub ads_watched: i64,
    pub last_ad_watched_at: Option<DateTime<Utc>>,
    pub is_banned: bool,
    pub ban_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
impl User {
    /// A fresh, unbanned account for tests.
    pub fn sample(role: Role) -> Self {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: Some("a@example.com".to_string()),
            password_hash: None,
            telegram_id: None,
            username: None,
            display_name: "A".to_string(),
            role,
            referral_code: "ABCDEFGH".to_string(),
            referred_by: None,
            balance_micros: 0,
            total_earned_micros: 0,
            referral_earnings_micros: 0,
            total_withdrawn_micros: 0,
            ads_watched: 0,
            last_ad_watched_at: None,
            is_banned: false,
            ban_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Everything needed to create an account, from either sign-in path.
#[derive(Clone, Debug, Default)]
pub struct NewUser {
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub telegram_id: Option<i64>,
    pub username: Option<String>,
    pub display_name: String,
    pub referral_code: Option<String>,
    pub is_admin: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct Profile {
    #[serde(flatten)]
    pub user: User,
    pub referral_count: i64,
    pub next_ad_in_secs: i64,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Referral {
    pub id: Uuid,
    pub display_name: String,
    pub ads_watched: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReferralSummary {
    pub referral_code: String,
    pub total_commission_micros: i64,
    pub referrals: Vec<Referral>,
}

/// Admin-side edit of a user. Every field is optional.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UserUpdate {
    pub is_banned: Option<bool>,
    pub ban_reason: Option<String>,
    pub role: Option<Role>,
    pub balance_adjustment_micros: Option<i64>,
    pub note: Option<String>,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct DashboardStats {
    pub total_users: i64,
    pub banned_users: i64,
    pub total_ads_watched: i64,
    pub outstanding_balance_micros: i64,
    pub pending_withdrawals: i64,
    pub pending_withdrawal_micros: i64,
    pub approved_withdrawal_micros: i64,
}
