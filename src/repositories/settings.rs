use std::sync::Arc;

use sqlx::types::Json;
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::models::settings::RewardSettings;

/// Reward settings backed by the single `app_settings` row, cached in memory.
/// Every handler shares one cache, so an admin update is visible immediately.
#[derive(Clone)]
pub struct SettingsRepository {
    conn: PgPool,
    cache: Arc<RwLock<RewardSettings>>,
}

impl SettingsRepository {
    /// Loads the stored settings, seeding the row with `initial` on first start.
    pub async fn load(conn: PgPool, initial: RewardSettings) -> Result<Self, anyhow::Error> {
        sqlx::query("INSERT INTO app_settings (id, rewards) VALUES (1, $1) ON CONFLICT (id) DO NOTHING")
            .bind(Json(&initial))
            .execute(&conn)
            .await?;

        let Json(stored): Json<RewardSettings> =
            sqlx::query_scalar("SELECT rewards FROM app_settings WHERE id = 1")
                .fetch_one(&conn)
                .await?;

        stored
            .validate()
            .map_err(|e| anyhow::anyhow!("Stored reward settings are invalid: {}", e))?;
        log::info!("Loaded reward settings: {:?}", stored);

        Ok(Self {
            conn,
            cache: Arc::new(RwLock::new(stored)),
        })
    }

    pub async fn current(&self) -> RewardSettings {
        self.cache.read().await.clone()
    }

    pub async fn update(&self, settings: RewardSettings) -> Result<RewardSettings, anyhow::Error> {
        let mut cache = self.cache.write().await;

        sqlx::query("UPDATE app_settings SET rewards = $1, updated_at = CURRENT_TIMESTAMP WHERE id = 1")
            .bind(Json(&settings))
            .execute(&self.conn)
            .await?;

        *cache = settings.clone();
        Ok(settings)
    }

    #[cfg(test)]
    pub fn in_memory(conn: PgPool, settings: RewardSettings) -> Self {
        Self {
            conn,
            cache: Arc::new(RwLock::new(settings)),
        }
    }
}
