use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    AdWatch,
    ReferralCommission,
    DirectLink,
    Achievement,
    WithdrawalRequest,
    WithdrawalRefund,
    AdminAdjustment,
    SignupBonus,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct History {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: HistoryKind,
    pub amount_micros: i64,
    pub description: String,
    pub reference_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A pending activity-log line, written inside the transaction that moved the money.
#[derive(Clone, Debug)]
pub struct NewHistory {
    pub user_id: Uuid,
    pub kind: HistoryKind,
    pub amount_micros: i64,
    pub description: String,
    pub reference_id: Option<Uuid>,
}

impl NewHistory {
    pub fn new(user_id: Uuid, kind: HistoryKind, amount_micros: i64, description: impl Into<String>) -> Self {
        Self {
            user_id,
            kind,
            amount_micros,
            description: description.into(),
            reference_id: None,
        }
    }

    pub fn with_reference(mut self, reference_id: Uuid) -> Self {
        self.reference_id = Some(reference_id);
        self
    }
}
