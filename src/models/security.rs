use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_DETAILS_CHARS: usize = 1_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    DevtoolsOpen,
    AdBlocker,
    AutoClicker,
    MultipleAccounts,
    VpnProxy,
    TabHidden,
    Other,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct SecurityViolation {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub kind: ViolationKind,
    pub details: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ViolationReport {
    pub kind: ViolationKind,
    #[serde(default)]
    pub details: String,
}

#[derive(Clone, Debug)]
pub struct NewViolation {
    pub user_id: Option<Uuid>,
    pub kind: ViolationKind,
    pub details: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl NewViolation {
    pub fn new(
        user_id: Option<Uuid>,
        report: ViolationReport,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            user_id,
            kind: report.kind,
            details: report.details.chars().take(MAX_DETAILS_CHARS).collect(),
            ip_address,
            user_agent,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ViolationOutcome {
    pub violation: SecurityViolation,
    pub total_violations: i64,
    pub banned: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ViolationFilter {
    pub user_id: Option<Uuid>,
}

/// Whether `count` violations should trigger an automatic ban.
pub fn reaches_ban_threshold(count: i64, max_violations: i64) -> bool {
    max_violations > 0 && count >= max_violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn details_are_truncated() {
        let report = ViolationReport {
            kind: ViolationKind::AutoClicker,
            details: "a".repeat(MAX_DETAILS_CHARS + 50),
        };
        let violation = NewViolation::new(None, report, None, None);
        assert_eq!(violation.details.chars().count(), MAX_DETAILS_CHARS);
    }

    #[test]
    fn ban_threshold() {
        assert!(!reaches_ban_threshold(4, 5));
        assert!(reaches_ban_threshold(5, 5));
        assert!(!reaches_ban_threshold(100, 0));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let parsed = serde_json::from_str::<ViolationReport>(r#"{"kind":"screen_recorder"}"#);
        assert!(parsed.is_err());
    }
}
