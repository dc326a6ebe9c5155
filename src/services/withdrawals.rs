use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::notifications::{notify, NotificationRequest};
use super::{active_admin, active_user, RequestHandler, Responder, Service, ServiceError};
use crate::models::history::{HistoryKind, NewHistory};
use crate::models::settings::RewardSettings;
use crate::models::withdrawals::{
    NewWithdrawal, QuoteError, Withdrawal, WithdrawalAction, WithdrawalDecision, WithdrawalMethod,
    WithdrawalQuote, WithdrawalStatus,
};
use crate::models::{format_usd, Page, Paginated};
use crate::repositories::history::HistoryRepository;
use crate::repositories::settings::SettingsRepository;
use crate::repositories::users::UserRepository;
use crate::repositories::withdrawals::WithdrawalRepository;

pub enum WithdrawalRequest {
    Quote {
        user_id: Uuid,
        method: WithdrawalMethod,
        amount_micros: i64,
        response: Responder<WithdrawalQuote>,
    },
    Create {
        user_id: Uuid,
        request: NewWithdrawal,
        response: Responder<Withdrawal>,
    },
    ListMine {
        user_id: Uuid,
        response: Responder<Vec<Withdrawal>>,
    },
    ListAll {
        status: Option<WithdrawalStatus>,
        page: Page,
        response: Responder<Paginated<Withdrawal>>,
    },
    Decide {
        admin_id: Uuid,
        id: Uuid,
        decision: WithdrawalDecision,
        response: Responder<Withdrawal>,
    },
}

/// What the validation needs to know about the requesting user.
#[derive(Clone, Debug)]
pub struct WithdrawalContext {
    pub is_banned: bool,
    pub balance_micros: i64,
    pub has_pending: bool,
    pub last_requested_at: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

/// Checks a withdrawal request against the user's state and the current settings.
/// Rules are evaluated in a fixed order and the first failure wins.
pub fn validate_withdrawal(
    request: &NewWithdrawal,
    context: &WithdrawalContext,
    settings: &RewardSettings,
) -> Result<WithdrawalQuote, ServiceError> {
    if settings.maintenance_mode {
        return Err(ServiceError::Unavailable(
            "Withdrawals are paused for maintenance".to_string(),
        ));
    }
    if context.is_banned {
        return Err(ServiceError::Forbidden("Account is banned".to_string()));
    }

    let method = request.method;
    if !settings.methods.limits(method).enabled {
        return Err(QuoteError::MethodDisabled(method.as_str()).into());
    }
    if !method.is_valid_account(request.account.trim()) {
        return Err(ServiceError::Validation(format!(
            "Invalid {} account",
            method.as_str()
        )));
    }

    let quote = WithdrawalQuote::calculate(method, request.amount_micros, settings)?;

    if context.has_pending {
        return Err(ServiceError::Conflict(
            "A withdrawal is already pending".to_string(),
        ));
    }

    if let Some(last) = context.last_requested_at {
        let cooldown_secs = settings.withdrawal_cooldown_hours.saturating_mul(3_600);
        let retry_after_secs = cooldown_secs.saturating_sub((context.now - last).num_seconds());
        if retry_after_secs > 0 {
            return Err(ServiceError::Cooldown {
                message: format!(
                    "Only one withdrawal every {} hours",
                    settings.withdrawal_cooldown_hours
                ),
                retry_after_secs,
            });
        }
    }

    if request.amount_micros > context.balance_micros {
        return Err(ServiceError::InsufficientBalance);
    }

    Ok(quote)
}

/// Balance effects of an admin decision on a withdrawal.
#[derive(Clone, Debug, PartialEq)]
pub struct Settlement {
    pub status: WithdrawalStatus,
    /// Returned to the user's balance.
    pub refund_micros: i64,
    /// Added to the user's lifetime withdrawn total.
    pub withdrawn_micros: i64,
}

/// Only pending withdrawals can be decided. The full debited amount, fee
/// included, goes back on rejection.
pub fn settle(
    withdrawal: &Withdrawal,
    action: WithdrawalAction,
) -> Result<Settlement, ServiceError> {
    if withdrawal.status != WithdrawalStatus::Pending {
        return Err(ServiceError::Conflict(
            "Withdrawal has already been processed".to_string(),
        ));
    }

    Ok(match action {
        WithdrawalAction::Approve => Settlement {
            status: WithdrawalStatus::Approved,
            refund_micros: 0,
            withdrawn_micros: withdrawal.amount_micros,
        },
        WithdrawalAction::Reject => Settlement {
            status: WithdrawalStatus::Rejected,
            refund_micros: withdrawal.amount_micros,
            withdrawn_micros: 0,
        },
    })
}

#[derive(Clone)]
pub struct WithdrawalRequestHandler {
    repository: WithdrawalRepository,
    users: UserRepository,
    settings: SettingsRepository,
    notifications: mpsc::Sender<NotificationRequest>,
}

impl WithdrawalRequestHandler {
    pub fn new(
        sql_conn: PgPool,
        settings: SettingsRepository,
        notifications: mpsc::Sender<NotificationRequest>,
    ) -> Self {
        WithdrawalRequestHandler {
            repository: WithdrawalRepository::new(sql_conn.clone()),
            users: UserRepository::new(sql_conn),
            settings,
            notifications,
        }
    }

    async fn quote(
        &self,
        user_id: Uuid,
        method: WithdrawalMethod,
        amount_micros: i64,
    ) -> Result<WithdrawalQuote, ServiceError> {
        active_user(&self.users, user_id).await?;
        let settings = self.settings.current().await;
        Ok(WithdrawalQuote::calculate(method, amount_micros, &settings)?)
    }

    async fn create(
        &self,
        user_id: Uuid,
        request: NewWithdrawal,
    ) -> Result<Withdrawal, ServiceError> {
        let settings = self.settings.current().await;
        let mut tx = self
            .repository
            .pool()
            .begin()
            .await
            .map_err(ServiceError::database)?;

        let user = UserRepository::lock(&mut *tx, user_id)
            .await
            .map_err(ServiceError::database)?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;
        let has_pending = WithdrawalRepository::has_pending(&mut *tx, user_id)
            .await
            .map_err(ServiceError::database)?;
        let last_requested_at = WithdrawalRepository::last_requested_at(&mut *tx, user_id)
            .await
            .map_err(ServiceError::database)?;

        let context = WithdrawalContext {
            is_banned: user.is_banned,
            balance_micros: user.balance_micros,
            has_pending,
            last_requested_at,
            now: Utc::now(),
        };
        let quote = validate_withdrawal(&request, &context, &settings).inspect_err(|e| {
            log::debug!("Withdrawal rejected for {}: {}", user_id, e);
        })?;

        UserRepository::adjust_balance(&mut *tx, user_id, -quote.amount_micros)
            .await
            .map_err(ServiceError::database)?;
        let withdrawal =
            WithdrawalRepository::insert(&mut *tx, user_id, request.account.trim(), &quote)
                .await
                .map_err(ServiceError::database)?;
        HistoryRepository::insert(
            &mut *tx,
            &NewHistory::new(
                user_id,
                HistoryKind::WithdrawalRequest,
                -quote.amount_micros,
                format!("Withdrawal via {}", quote.method.as_str()),
            )
            .with_reference(withdrawal.id),
        )
        .await
        .map_err(ServiceError::database)?;

        tx.commit().await.map_err(ServiceError::database)?;
        log::info!(
            "Withdrawal {} created: {} micros via {} for user {}",
            withdrawal.id,
            withdrawal.amount_micros,
            withdrawal.method.as_str(),
            user_id
        );

        Ok(withdrawal)
    }

    async fn list_mine(&self, user_id: Uuid) -> Result<Vec<Withdrawal>, ServiceError> {
        active_user(&self.users, user_id).await?;
        self.repository
            .list_for_user(user_id)
            .await
            .map_err(ServiceError::database)
    }

    async fn list_all(
        &self,
        status: Option<WithdrawalStatus>,
        page: Page,
    ) -> Result<Paginated<Withdrawal>, ServiceError> {
        let (items, total) = self
            .repository
            .list(status, page)
            .await
            .map_err(ServiceError::database)?;

        Ok(Paginated::new(items, page, total))
    }

    async fn decide(
        &self,
        admin_id: Uuid,
        id: Uuid,
        decision: WithdrawalDecision,
    ) -> Result<Withdrawal, ServiceError> {
        active_admin(&self.users, admin_id).await?;
        let note = decision
            .note
            .as_deref()
            .map(str::trim)
            .filter(|note| !note.is_empty());

        let mut tx = self
            .repository
            .pool()
            .begin()
            .await
            .map_err(ServiceError::database)?;

        let pending = WithdrawalRepository::lock(&mut *tx, id)
            .await
            .map_err(ServiceError::database)?
            .ok_or_else(|| ServiceError::NotFound("Withdrawal not found".to_string()))?;
        let settlement = settle(&pending, decision.action)?;

        let withdrawal = WithdrawalRepository::resolve(&mut *tx, id, settlement.status, note)
            .await
            .map_err(ServiceError::database)?;
        if settlement.withdrawn_micros > 0 {
            UserRepository::add_withdrawn(&mut *tx, pending.user_id, settlement.withdrawn_micros)
                .await
                .map_err(ServiceError::database)?;
        }
        if settlement.refund_micros > 0 {
            UserRepository::adjust_balance(&mut *tx, pending.user_id, settlement.refund_micros)
                .await
                .map_err(ServiceError::database)?;
            HistoryRepository::insert(
                &mut *tx,
                &NewHistory::new(
                    pending.user_id,
                    HistoryKind::WithdrawalRefund,
                    settlement.refund_micros,
                    "Withdrawal rejected, amount refunded",
                )
                .with_reference(id),
            )
            .await
            .map_err(ServiceError::database)?;
        }

        tx.commit().await.map_err(ServiceError::database)?;
        log::info!(
            "Withdrawal {} {:?} by admin {}",
            id,
            withdrawal.status,
            admin_id
        );

        notify(
            &self.notifications,
            withdrawal.user_id,
            decision_message(&withdrawal),
        );

        Ok(withdrawal)
    }
}

fn decision_message(withdrawal: &Withdrawal) -> String {
    let amount = format_usd(withdrawal.amount_micros);
    let mut text = match withdrawal.status {
        WithdrawalStatus::Approved => format!(
            "Your {} withdrawal of {} has been approved.",
            withdrawal.method.as_str(),
            amount
        ),
        _ => format!(
            "Your {} withdrawal of {} was rejected and the amount returned to your balance.",
            withdrawal.method.as_str(),
            amount
        ),
    };
    if let Some(note) = &withdrawal.admin_note {
        text.push_str("\nNote: ");
        text.push_str(note);
    }
    text
}

#[async_trait]
impl RequestHandler<WithdrawalRequest> for WithdrawalRequestHandler {
    async fn handle_request(&self, request: WithdrawalRequest) {
        match request {
            WithdrawalRequest::Quote {
                user_id,
                method,
                amount_micros,
                response,
            } => {
                let quote = self.quote(user_id, method, amount_micros).await;
                let _ = response.send(quote);
            }
            WithdrawalRequest::Create {
                user_id,
                request,
                response,
            } => {
                let withdrawal = self.create(user_id, request).await;
                let _ = response.send(withdrawal);
            }
            WithdrawalRequest::ListMine { user_id, response } => {
                let withdrawals = self.list_mine(user_id).await;
                let _ = response.send(withdrawals);
            }
            WithdrawalRequest::ListAll {
                status,
                page,
                response,
            } => {
                let withdrawals = self.list_all(status, page).await;
                let _ = response.send(withdrawals);
            }
            WithdrawalRequest::Decide {
                admin_id,
                id,
                decision,
                response,
            } => {
                let withdrawal = self.decide(admin_id, id, decision).await;
                let _ = response.send(withdrawal);
            }
        }
    }
}

pub struct WithdrawalService;

impl WithdrawalService {
    pub fn new() -> Self {
        WithdrawalService {}
    }
}

#[async_trait]
impl Service<WithdrawalRequest, WithdrawalRequestHandler> for WithdrawalService {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MICROS_PER_USD;
    use chrono::Duration;

    fn bkash(amount_micros: i64) -> NewWithdrawal {
        NewWithdrawal {
            method: WithdrawalMethod::Bkash,
            account: "01712345678".to_string(),
            amount_micros,
        }
    }

    fn context() -> WithdrawalContext {
        WithdrawalContext {
            is_banned: false,
            balance_micros: 20 * MICROS_PER_USD,
            has_pending: false,
            last_requested_at: None,
            now: Utc::now(),
        }
    }

    #[test]
    fn valid_request_returns_quote() {
        let quote =
            validate_withdrawal(&bkash(5 * MICROS_PER_USD), &context(), &RewardSettings::default())
                .unwrap();
        assert_eq!(quote.amount_micros, 5 * MICROS_PER_USD);
        assert_eq!(quote.fee_micros, 100_000);
    }

    #[test]
    fn maintenance_wins_over_everything() {
        let settings = RewardSettings {
            maintenance_mode: true,
            ..Default::default()
        };
        let ctx = WithdrawalContext {
            is_banned: true,
            ..context()
        };
        let err = validate_withdrawal(&bkash(1), &ctx, &settings).unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
    }

    #[test]
    fn banned_is_checked_before_request_shape() {
        let ctx = WithdrawalContext {
            is_banned: true,
            ..context()
        };
        let err = validate_withdrawal(&bkash(1), &ctx, &RewardSettings::default()).unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[test]
    fn disabled_method_is_checked_before_account() {
        let mut settings = RewardSettings::default();
        settings.methods.bkash.enabled = false;
        let mut request = bkash(5 * MICROS_PER_USD);
        request.account = "bogus".to_string();

        let err = validate_withdrawal(&request, &context(), &settings).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(msg) if msg.contains("disabled")));
    }

    #[test]
    fn account_format_is_checked_before_limits() {
        let mut request = bkash(1);
        request.account = "+8801712345678".to_string();

        let err =
            validate_withdrawal(&request, &context(), &RewardSettings::default()).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(msg) if msg.contains("account")));
    }

    #[test]
    fn limits_are_checked_before_pending() {
        let ctx = WithdrawalContext {
            has_pending: true,
            ..context()
        };
        let err = validate_withdrawal(&bkash(1), &ctx, &RewardSettings::default()).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(msg) if msg.contains("minimum")));

        let err = validate_withdrawal(&bkash(51 * MICROS_PER_USD), &ctx, &RewardSettings::default())
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(msg) if msg.contains("maximum")));
    }

    #[test]
    fn pending_withdrawal_conflicts_before_cooldown() {
        let ctx = WithdrawalContext {
            has_pending: true,
            last_requested_at: Some(Utc::now()),
            ..context()
        };
        let err = validate_withdrawal(&bkash(5 * MICROS_PER_USD), &ctx, &RewardSettings::default())
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn recent_request_is_in_cooldown() {
        let now = Utc::now();
        let ctx = WithdrawalContext {
            last_requested_at: Some(now - Duration::hours(23)),
            balance_micros: 0,
            now,
            ..context()
        };
        let err = validate_withdrawal(&bkash(5 * MICROS_PER_USD), &ctx, &RewardSettings::default())
            .unwrap_err();
        match err {
            ServiceError::Cooldown {
                retry_after_secs, ..
            } => assert_eq!(retry_after_secs, 3_600),
            other => panic!("unexpected error: {:?}", other),
        }

        let ctx = WithdrawalContext {
            last_requested_at: Some(now - Duration::hours(25)),
            now,
            ..context()
        };
        assert!(
            validate_withdrawal(&bkash(5 * MICROS_PER_USD), &ctx, &RewardSettings::default())
                .is_ok()
        );
    }

    fn pending(amount_micros: i64) -> Withdrawal {
        let quote = WithdrawalQuote::calculate(
            WithdrawalMethod::Bkash,
            amount_micros,
            &RewardSettings::default(),
        )
        .unwrap();
        let now = Utc::now();
        Withdrawal {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            method: quote.method,
            account: "01712345678".to_string(),
            amount_micros: quote.amount_micros,
            fee_micros: quote.fee_micros,
            net_micros: quote.net_micros,
            payout_currency: quote.payout_currency,
            payout_amount_minor: quote.payout_amount_minor,
            exchange_rate: quote.exchange_rate,
            status: WithdrawalStatus::Pending,
            admin_note: None,
            processed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn rejecting_refunds_the_full_debited_amount() {
        let balance = 20 * MICROS_PER_USD;
        let quote = validate_withdrawal(&bkash(5 * MICROS_PER_USD), &context(), &RewardSettings::default())
            .unwrap();
        let after_request = balance - quote.amount_micros;

        let settlement = settle(&pending(quote.amount_micros), WithdrawalAction::Reject).unwrap();
        assert_eq!(settlement.status, WithdrawalStatus::Rejected);
        assert_eq!(settlement.withdrawn_micros, 0);
        // The fee is returned too.
        assert_eq!(after_request + settlement.refund_micros, balance);
    }

    #[test]
    fn approving_counts_towards_total_withdrawn() {
        let settlement =
            settle(&pending(5 * MICROS_PER_USD), WithdrawalAction::Approve).unwrap();
        assert_eq!(
            settlement,
            Settlement {
                status: WithdrawalStatus::Approved,
                refund_micros: 0,
                withdrawn_micros: 5 * MICROS_PER_USD,
            }
        );
    }

    #[test]
    fn decided_withdrawal_cannot_be_decided_again() {
        for status in [WithdrawalStatus::Approved, WithdrawalStatus::Rejected] {
            let mut withdrawal = pending(5 * MICROS_PER_USD);
            withdrawal.status = status;
            for action in [WithdrawalAction::Approve, WithdrawalAction::Reject] {
                assert!(matches!(
                    settle(&withdrawal, action),
                    Err(ServiceError::Conflict(_))
                ));
            }
        }
    }

    #[test]
    fn oversized_cooldown_does_not_overflow() {
        let settings = RewardSettings {
            withdrawal_cooldown_hours: i64::MAX / 1_000,
            ..Default::default()
        };
        let ctx = WithdrawalContext {
            last_requested_at: Some(Utc::now()),
            ..context()
        };
        assert!(matches!(
            validate_withdrawal(&bkash(5 * MICROS_PER_USD), &ctx, &settings),
            Err(ServiceError::Cooldown { .. })
        ));
    }

    #[test]
    fn balance_is_checked_last() {
        let ctx = WithdrawalContext {
            balance_micros: 4 * MICROS_PER_USD,
            ..context()
        };
        let err = validate_withdrawal(&bkash(5 * MICROS_PER_USD), &ctx, &RewardSettings::default())
            .unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientBalance));
    }
}
