use crate::models::achievements::{Achievement, AchievementDef};

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

#[derive(Clone)]
pub struct AchievementRepository {
    conn: PgPool,
}

impl AchievementRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    /// Records the unlock. Returns `false` when the user already had it.
    pub async fn unlock(
        conn: &mut PgConnection,
        user_id: Uuid,
        def: &AchievementDef,
    ) -> Result<bool, anyhow::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO achievements (id, user_id, code, reward_micros)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, code) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(def.code)
        .bind(def.reward_micros)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Achievement>, anyhow::Error> {
        let achievements = sqlx::query_as::<_, Achievement>(
            "SELECT * FROM achievements WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(achievements)
    }

    pub fn pool(&self) -> &PgPool {
        &self.conn
    }
}
