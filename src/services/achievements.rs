use sqlx::PgPool;
use uuid::Uuid;

use super::ServiceError;
use crate::models::achievements::{self, AchievementDef, AchievementStatus, Metric};
use crate::models::history::{HistoryKind, NewHistory};
use crate::repositories::achievements::AchievementRepository;
use crate::repositories::history::HistoryRepository;
use crate::repositories::users::UserRepository;

/// Awards catalogue milestones. Shared by the services whose actions move a counter.
#[derive(Clone)]
pub struct AchievementTracker {
    repository: AchievementRepository,
}

impl AchievementTracker {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: AchievementRepository::new(pool),
        }
    }

    /// Unlocks every milestone `value` has reached and credits the bonus for
    /// the ones that were not unlocked before.
    pub async fn evaluate(
        &self,
        user_id: Uuid,
        metric: Metric,
        value: i64,
    ) -> Result<Vec<&'static AchievementDef>, ServiceError> {
        let candidates: Vec<_> = achievements::reached(metric, value).collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self
            .repository
            .pool()
            .begin()
            .await
            .map_err(ServiceError::database)?;

        let mut unlocked = Vec::new();
        for def in candidates {
            let is_new = AchievementRepository::unlock(&mut *tx, user_id, def)
                .await
                .map_err(ServiceError::database)?;
            if !is_new {
                continue;
            }

            if def.reward_micros > 0 {
                UserRepository::credit(&mut *tx, user_id, def.reward_micros, false)
                    .await
                    .map_err(ServiceError::database)?;
                HistoryRepository::insert(
                    &mut *tx,
                    &NewHistory::new(
                        user_id,
                        HistoryKind::Achievement,
                        def.reward_micros,
                        format!("Achievement unlocked: {}", def.title),
                    ),
                )
                .await
                .map_err(ServiceError::database)?;
            }
            unlocked.push(def);
        }

        tx.commit().await.map_err(ServiceError::database)?;

        for def in &unlocked {
            log::info!("User {} unlocked achievement {}", user_id, def.code);
        }

        Ok(unlocked)
    }

    /// Like `evaluate`, but only logs failures. Used after the main action committed.
    pub async fn evaluate_quietly(&self, user_id: Uuid, metric: Metric, value: i64) {
        if let Err(e) = self.evaluate(user_id, metric, value).await {
            log::error!("Could not evaluate achievements for {}: {}", user_id, e);
        }
    }

    pub async fn statuses(&self, user_id: Uuid) -> Result<Vec<AchievementStatus>, ServiceError> {
        let unlocked = self
            .repository
            .list_for_user(user_id)
            .await
            .map_err(ServiceError::database)?;

        Ok(achievements::statuses(&unlocked))
    }
}
