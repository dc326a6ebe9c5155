use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::achievements::AchievementTracker;
use super::{active_user, RequestHandler, Responder, Service, ServiceError};
use crate::models::achievements::{AchievementDef, Metric};
use crate::models::history::{HistoryKind, NewHistory};
use crate::models::settings::RewardSettings;
use crate::repositories::history::{start_of_day, HistoryRepository};
use crate::repositories::settings::SettingsRepository;
use crate::repositories::users::UserRepository;

pub enum AdRequest {
    Watch {
        user_id: Uuid,
        ad_network: Option<String>,
        response: Responder<AdWatchOutcome>,
    },
    Status {
        user_id: Uuid,
        response: Responder<AdStatus>,
    },
}

#[derive(Debug, Serialize)]
pub struct AdWatchOutcome {
    pub reward_micros: i64,
    pub balance_micros: i64,
    pub ads_watched: i64,
    pub watched_today: i64,
    pub daily_limit: i64,
    pub next_ad_in_secs: i64,
    pub achievements: Vec<&'static AchievementDef>,
}

#[derive(Debug, Serialize)]
pub struct AdStatus {
    pub reward_micros: i64,
    pub cooldown_secs: i64,
    pub next_ad_in_secs: i64,
    pub watched_today: i64,
    pub daily_limit: i64,
    pub maintenance_mode: bool,
}

#[derive(Debug, PartialEq)]
pub enum AdRejection {
    Cooldown { retry_after_secs: i64 },
    DailyLimit { limit: i64, retry_after_secs: i64 },
}

impl From<AdRejection> for ServiceError {
    fn from(rejection: AdRejection) -> Self {
        match rejection {
            AdRejection::Cooldown { retry_after_secs } => ServiceError::Cooldown {
                message: format!("Please wait {} seconds between ads", retry_after_secs),
                retry_after_secs,
            },
            AdRejection::DailyLimit {
                limit,
                retry_after_secs,
            } => ServiceError::Cooldown {
                message: format!("Daily limit of {} ads reached", limit),
                retry_after_secs,
            },
        }
    }
}

/// Whole seconds, rounded up, until another ad may be credited.
pub fn seconds_until_next_ad(
    last_watched: Option<DateTime<Utc>>,
    cooldown_secs: i64,
    now: DateTime<Utc>,
) -> i64 {
    let Some(last) = last_watched else {
        return 0;
    };

    let remaining_ms = cooldown_secs
        .saturating_mul(1_000)
        .saturating_sub((now - last).num_milliseconds());
    if remaining_ms <= 0 {
        0
    } else {
        remaining_ms.saturating_add(999) / 1_000
    }
}

pub fn check_ad_watch(
    last_watched: Option<DateTime<Utc>>,
    watched_today: i64,
    settings: &RewardSettings,
    now: DateTime<Utc>,
) -> Result<(), AdRejection> {
    let retry_after_secs = seconds_until_next_ad(last_watched, settings.ad_cooldown_secs, now);
    if retry_after_secs > 0 {
        return Err(AdRejection::Cooldown { retry_after_secs });
    }

    if settings.daily_ad_limit > 0 && watched_today >= settings.daily_ad_limit {
        let next_day = start_of_day(now) + Duration::days(1);
        return Err(AdRejection::DailyLimit {
            limit: settings.daily_ad_limit,
            retry_after_secs: (next_day - now).num_seconds().max(1),
        });
    }

    Ok(())
}

/// Referrer's cut of `earned`, rounded down.
pub fn referral_commission(earned: i64, commission_bps: i64) -> i64 {
    (i128::from(earned) * i128::from(commission_bps) / 10_000) as i64
}

#[derive(Clone)]
pub struct AdRequestHandler {
    users: UserRepository,
    history: HistoryRepository,
    settings: SettingsRepository,
    achievements: AchievementTracker,
}

impl AdRequestHandler {
    pub fn new(sql_conn: PgPool, settings: SettingsRepository) -> Self {
        AdRequestHandler {
            users: UserRepository::new(sql_conn.clone()),
            history: HistoryRepository::new(sql_conn.clone()),
            achievements: AchievementTracker::new(sql_conn),
            settings,
        }
    }

    async fn watch(
        &self,
        user_id: Uuid,
        ad_network: Option<String>,
    ) -> Result<AdWatchOutcome, ServiceError> {
        let settings = self.settings.current().await;
        if settings.maintenance_mode {
            return Err(ServiceError::Unavailable(
                "Rewards are paused for maintenance".to_string(),
            ));
        }

        let now = Utc::now();
        let mut tx = self
            .users
            .pool()
            .begin()
            .await
            .map_err(ServiceError::database)?;

        let user = UserRepository::lock(&mut *tx, user_id)
            .await
            .map_err(ServiceError::database)?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;
        if user.is_banned {
            return Err(ServiceError::Forbidden("Account is banned".to_string()));
        }

        let watched_today =
            HistoryRepository::count_since(&mut *tx, user_id, HistoryKind::AdWatch, start_of_day(now))
                .await
                .map_err(ServiceError::database)?;

        if let Err(rejection) = check_ad_watch(user.last_ad_watched_at, watched_today, &settings, now)
        {
            log::debug!("Ad watch rejected for {}: {:?}", user_id, rejection);
            return Err(rejection.into());
        }

        let reward = settings.ad_reward_micros;
        let user = UserRepository::record_ad_watch(&mut *tx, user_id, reward, now)
            .await
            .map_err(ServiceError::database)?;

        let description = match ad_network.as_deref().map(str::trim) {
            Some(network) if !network.is_empty() => format!("Watched ad ({})", network),
            _ => "Watched ad".to_string(),
        };
        HistoryRepository::insert(
            &mut *tx,
            &NewHistory::new(user_id, HistoryKind::AdWatch, reward, description),
        )
        .await
        .map_err(ServiceError::database)?;

        let commission = referral_commission(reward, settings.referral_commission_bps);
        if let (Some(referrer), true) = (user.referred_by, commission > 0) {
            UserRepository::credit(&mut *tx, referrer, commission, true)
                .await
                .map_err(ServiceError::database)?;
            HistoryRepository::insert(
                &mut *tx,
                &NewHistory::new(
                    referrer,
                    HistoryKind::ReferralCommission,
                    commission,
                    format!("Commission from {}", user.display_name),
                )
                .with_reference(user_id),
            )
            .await
            .map_err(ServiceError::database)?;
        }

        tx.commit().await.map_err(ServiceError::database)?;

        let achievements = match self
            .achievements
            .evaluate(user_id, Metric::AdsWatched, user.ads_watched)
            .await
        {
            Ok(unlocked) => unlocked,
            Err(e) => {
                log::error!("Could not evaluate achievements for {}: {}", user_id, e);
                Vec::new()
            }
        };
        let bonus: i64 = achievements.iter().map(|a| a.reward_micros).sum();

        Ok(AdWatchOutcome {
            reward_micros: reward,
            balance_micros: user.balance_micros + bonus,
            ads_watched: user.ads_watched,
            watched_today: watched_today + 1,
            daily_limit: settings.daily_ad_limit,
            next_ad_in_secs: settings.ad_cooldown_secs,
            achievements,
        })
    }

    async fn status(&self, user_id: Uuid) -> Result<AdStatus, ServiceError> {
        let settings = self.settings.current().await;
        let now = Utc::now();

        let user = active_user(&self.users, user_id).await?;
        let watched_today = self
            .history
            .count_today(user_id, HistoryKind::AdWatch, now)
            .await
            .map_err(ServiceError::database)?;

        Ok(AdStatus {
            reward_micros: settings.ad_reward_micros,
            cooldown_secs: settings.ad_cooldown_secs,
            next_ad_in_secs: seconds_until_next_ad(
                user.last_ad_watched_at,
                settings.ad_cooldown_secs,
                now,
            ),
            watched_today,
            daily_limit: settings.daily_ad_limit,
            maintenance_mode: settings.maintenance_mode,
        })
    }
}

#[async_trait]
impl RequestHandler<AdRequest> for AdRequestHandler {
    async fn handle_request(&self, request: AdRequest) {
        match request {
            AdRequest::Watch {
                user_id,
                ad_network,
                response,
            } => {
                let outcome = self.watch(user_id, ad_network).await;
                let _ = response.send(outcome);
            }
            AdRequest::Status { user_id, response } => {
                let status = self.status(user_id).await;
                let _ = response.send(status);
            }
        }
    }
}

pub struct AdService;

impl AdService {
    pub fn new() -> Self {
        AdService {}
    }
}

#[async_trait]
impl Service<AdRequest, AdRequestHandler> for AdService {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn first_ad_is_always_allowed() {
        let settings = RewardSettings::default();
        assert_eq!(check_ad_watch(None, 0, &settings, Utc::now()), Ok(()));
    }

    #[test]
    fn ad_within_cooldown_is_rejected_with_remaining_seconds() {
        let settings = RewardSettings::default();
        let now = Utc::now();
        let last = now - Duration::milliseconds(10_200);

        assert_eq!(
            check_ad_watch(Some(last), 1, &settings, now),
            Err(AdRejection::Cooldown {
                retry_after_secs: 5
            })
        );
    }

    #[test]
    fn ad_after_cooldown_is_allowed() {
        let settings = RewardSettings::default();
        let now = Utc::now();
        let last = now - Duration::seconds(15);

        assert_eq!(check_ad_watch(Some(last), 1, &settings, now), Ok(()));
    }

    #[test]
    fn daily_limit_applies_after_cooldown() {
        let settings = RewardSettings {
            daily_ad_limit: 3,
            ..Default::default()
        };
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 22, 30, 0).unwrap();
        let last = now - Duration::minutes(5);

        // Retry once the UTC day rolls over.
        assert_eq!(
            check_ad_watch(Some(last), 3, &settings, now),
            Err(AdRejection::DailyLimit {
                limit: 3,
                retry_after_secs: 5_400
            })
        );

        let unlimited = RewardSettings {
            daily_ad_limit: 0,
            ..Default::default()
        };
        assert_eq!(check_ad_watch(Some(last), 10_000, &unlimited, now), Ok(()));
    }

    #[test]
    fn daily_limit_error_points_to_midnight() {
        let err: ServiceError = AdRejection::DailyLimit {
            limit: 200,
            retry_after_secs: 600,
        }
        .into();
        assert!(matches!(
            err,
            ServiceError::Cooldown {
                retry_after_secs: 600,
                ..
            }
        ));
    }

    #[test]
    fn huge_cooldown_saturates_instead_of_overflowing() {
        let now = Utc::now();
        assert!(seconds_until_next_ad(Some(now), i64::MAX, now) > 0);
    }

    #[test]
    fn commission_rounds_down() {
        assert_eq!(referral_commission(500, 1_000), 50);
        assert_eq!(referral_commission(333, 1_000), 33);
        assert_eq!(referral_commission(500, 0), 0);
    }

    #[test]
    fn cooldown_rejection_maps_to_429_error_with_message() {
        let err: ServiceError = AdRejection::Cooldown {
            retry_after_secs: 7,
        }
        .into();
        match err {
            ServiceError::Cooldown {
                message,
                retry_after_secs,
            } => {
                assert_eq!(retry_after_secs, 7);
                assert!(message.contains("7 seconds between ads"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
