use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{active_admin, RequestHandler, Responder, Service, ServiceError};
use crate::models::history::{HistoryKind, NewHistory};
use crate::models::settings::{PublicSettings, RewardSettings};
use crate::models::users::{DashboardStats, Role, User, UserUpdate};
use crate::models::{Page, Paginated};
use crate::repositories::history::HistoryRepository;
use crate::repositories::settings::SettingsRepository;
use crate::repositories::users::UserRepository;

pub enum AdminRequest {
    Stats {
        response: Responder<DashboardStats>,
    },
    ListUsers {
        search: Option<String>,
        page: Page,
        response: Responder<Paginated<User>>,
    },
    GetUser {
        id: Uuid,
        response: Responder<User>,
    },
    UpdateUser {
        admin_id: Uuid,
        id: Uuid,
        update: UserUpdate,
        response: Responder<User>,
    },
    DeleteUser {
        admin_id: Uuid,
        id: Uuid,
        response: Responder<()>,
    },
    GetSettings {
        response: Responder<RewardSettings>,
    },
    UpdateSettings {
        settings: RewardSettings,
        response: Responder<RewardSettings>,
    },
    PublicSettings {
        response: Responder<PublicSettings>,
    },
}

/// New balance after an admin adjustment, refusing overflow and negative results.
pub fn adjusted_balance(balance_micros: i64, delta: i64) -> Result<i64, ServiceError> {
    balance_micros
        .checked_add(delta)
        .filter(|balance| *balance >= 0)
        .ok_or_else(|| {
            ServiceError::Validation("Adjustment would make the balance invalid".to_string())
        })
}

/// Rejects updates an admin must not apply to their own account.
pub fn check_self_update(admin_id: Uuid, id: Uuid, update: &UserUpdate) -> Result<(), ServiceError> {
    if admin_id != id {
        return Ok(());
    }
    if update.is_banned == Some(true) {
        return Err(ServiceError::Validation("You cannot ban yourself".to_string()));
    }
    if update.role == Some(Role::User) {
        return Err(ServiceError::Validation(
            "You cannot remove your own admin role".to_string(),
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct AdminRequestHandler {
    users: UserRepository,
    settings: SettingsRepository,
}

impl AdminRequestHandler {
    pub fn new(sql_conn: PgPool, settings: SettingsRepository) -> Self {
        AdminRequestHandler {
            users: UserRepository::new(sql_conn),
            settings,
        }
    }

    async fn get_user(&self, id: Uuid) -> Result<User, ServiceError> {
        self.users
            .get_user_by_id(id)
            .await
            .map_err(ServiceError::database)?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))
    }

    async fn list_users(
        &self,
        search: Option<String>,
        page: Page,
    ) -> Result<Paginated<User>, ServiceError> {
        let (items, total) = self
            .users
            .list_users(search.as_deref(), page)
            .await
            .map_err(ServiceError::database)?;

        Ok(Paginated::new(items, page, total))
    }

    async fn update_user(
        &self,
        admin_id: Uuid,
        id: Uuid,
        update: UserUpdate,
    ) -> Result<User, ServiceError> {
        check_self_update(admin_id, id, &update)?;
        active_admin(&self.users, admin_id).await?;
        let note = update
            .note
            .as_deref()
            .map(str::trim)
            .filter(|note| !note.is_empty());

        let mut tx = self
            .users
            .pool()
            .begin()
            .await
            .map_err(ServiceError::database)?;

        let user = UserRepository::lock(&mut *tx, id)
            .await
            .map_err(ServiceError::database)?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;

        if let Some(delta) = update.balance_adjustment_micros.filter(|delta| *delta != 0) {
            adjusted_balance(user.balance_micros, delta)?;

            UserRepository::adjust_balance(&mut *tx, id, delta)
                .await
                .map_err(ServiceError::database)?;
            HistoryRepository::insert(
                &mut *tx,
                &NewHistory::new(
                    id,
                    HistoryKind::AdminAdjustment,
                    delta,
                    note.unwrap_or("Balance adjusted by support"),
                )
                .with_reference(admin_id),
            )
            .await
            .map_err(ServiceError::database)?;
            log::info!("Admin {} adjusted balance of {} by {}", admin_id, id, delta);
        }

        if let Some(banned) = update.is_banned {
            if banned != user.is_banned {
                let reason = update
                    .ban_reason
                    .as_deref()
                    .map(str::trim)
                    .filter(|reason| !reason.is_empty())
                    .unwrap_or("banned by admin");
                UserRepository::set_ban(&mut *tx, id, banned, Some(reason))
                    .await
                    .map_err(ServiceError::database)?;
                log::info!("Admin {} set ban={} on user {}", admin_id, banned, id);
            }
        }

        if let Some(role) = update.role.filter(|role| *role != user.role) {
            UserRepository::update_role(&mut *tx, id, role)
                .await
                .map_err(ServiceError::database)?;
            log::info!("Admin {} changed role of {} to {}", admin_id, id, role.as_str());
        }

        tx.commit().await.map_err(ServiceError::database)?;

        self.get_user(id).await
    }

    async fn delete_user(&self, admin_id: Uuid, id: Uuid) -> Result<(), ServiceError> {
        if admin_id == id {
            return Err(ServiceError::Validation(
                "You cannot delete your own account".to_string(),
            ));
        }
        active_admin(&self.users, admin_id).await?;

        if !self
            .users
            .delete_user(id)
            .await
            .map_err(ServiceError::database)?
        {
            return Err(ServiceError::NotFound("User not found".to_string()));
        }

        log::info!("Admin {} deleted user {}", admin_id, id);
        Ok(())
    }

    async fn update_settings(
        &self,
        settings: RewardSettings,
    ) -> Result<RewardSettings, ServiceError> {
        settings.validate().map_err(ServiceError::Validation)?;
        let settings = self
            .settings
            .update(settings)
            .await
            .map_err(ServiceError::database)?;

        log::info!("Reward settings changed: {:?}", settings);
        Ok(settings)
    }
}

#[async_trait]
impl RequestHandler<AdminRequest> for AdminRequestHandler {
    async fn handle_request(&self, request: AdminRequest) {
        match request {
            AdminRequest::Stats { response } => {
                let stats = self
                    .users
                    .dashboard_stats()
                    .await
                    .map_err(ServiceError::database);
                let _ = response.send(stats);
            }
            AdminRequest::ListUsers {
                search,
                page,
                response,
            } => {
                let users = self.list_users(search, page).await;
                let _ = response.send(users);
            }
            AdminRequest::GetUser { id, response } => {
                let user = self.get_user(id).await;
                let _ = response.send(user);
            }
            AdminRequest::UpdateUser {
                admin_id,
                id,
                update,
                response,
            } => {
                let user = self.update_user(admin_id, id, update).await;
                let _ = response.send(user);
            }
            AdminRequest::DeleteUser {
                admin_id,
                id,
                response,
            } => {
                let result = self.delete_user(admin_id, id).await;
                let _ = response.send(result);
            }
            AdminRequest::GetSettings { response } => {
                let _ = response.send(Ok(self.settings.current().await));
            }
            AdminRequest::UpdateSettings { settings, response } => {
                let settings = self.update_settings(settings).await;
                let _ = response.send(settings);
            }
            AdminRequest::PublicSettings { response } => {
                let _ = response.send(Ok(self.settings.current().await.into()));
            }
        }
    }
}

pub struct AdminService;

impl AdminService {
    pub fn new() -> Self {
        AdminService {}
    }
}

#[async_trait]
impl Service<AdminRequest, AdminRequestHandler> for AdminService {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::users::NewUser;
    use sqlx::postgres::PgPoolOptions;

    async fn insert_user(pool: &PgPool, email: &str, is_admin: bool) -> User {
        let mut conn = pool.acquire().await.unwrap();
        UserRepository::insert_user(
            &mut *conn,
            &NewUser {
                email: Some(email.to_string()),
                display_name: email.to_string(),
                is_admin,
                ..Default::default()
            },
        )
        .await
        .unwrap()
    }

    #[test]
    fn admin_cannot_ban_or_demote_themselves() {
        let admin = Uuid::new_v4();

        let ban = UserUpdate {
            is_banned: Some(true),
            ..Default::default()
        };
        assert!(matches!(
            check_self_update(admin, admin, &ban),
            Err(ServiceError::Validation(_))
        ));

        let demote = UserUpdate {
            role: Some(Role::User),
            ..Default::default()
        };
        assert!(check_self_update(admin, admin, &demote).is_err());

        let adjust = UserUpdate {
            balance_adjustment_micros: Some(100),
            ..Default::default()
        };
        assert!(check_self_update(admin, admin, &adjust).is_ok());
        assert!(check_self_update(admin, Uuid::new_v4(), &ban).is_ok());
    }

    #[test]
    fn adjustment_cannot_overflow_or_go_negative() {
        assert_eq!(adjusted_balance(1_000, -400).unwrap(), 600);
        assert_eq!(adjusted_balance(1_000, -1_000).unwrap(), 0);
        assert!(matches!(
            adjusted_balance(1_000, -1_001),
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            adjusted_balance(i64::MAX, 1),
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn settings_requests_are_served_from_cache() {
        // Lazy pool, never connected: these requests must not touch the database.
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let settings = RewardSettings {
            ad_reward_micros: 750,
            ..Default::default()
        };
        let handler =
            AdminRequestHandler::new(pool.clone(), SettingsRepository::in_memory(pool, settings));

        let (tx, rx) = tokio::sync::oneshot::channel();
        handler
            .handle_request(AdminRequest::PublicSettings { response: tx })
            .await;
        let public = rx.await.unwrap().unwrap();
        assert_eq!(public.ad_reward_micros, 750);

        let invalid = RewardSettings {
            referral_commission_bps: 20_000,
            ..Default::default()
        };
        let (tx, rx) = tokio::sync::oneshot::channel();
        handler
            .handle_request(AdminRequest::UpdateSettings {
                settings: invalid,
                response: tx,
            })
            .await;
        assert!(matches!(
            rx.await.unwrap(),
            Err(ServiceError::Validation(_))
        ));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn demoted_admin_is_refused_and_role_change_commits_with_the_rest(pool: PgPool) {
        let handler = AdminRequestHandler::new(
            pool.clone(),
            SettingsRepository::in_memory(pool.clone(), RewardSettings::default()),
        );
        let first = insert_user(&pool, "first@example.com", true).await;
        let second = insert_user(&pool, "second@example.com", true).await;

        let updated = handler
            .update_user(
                first.id,
                second.id,
                UserUpdate {
                    role: Some(Role::User),
                    is_banned: Some(true),
                    balance_adjustment_micros: Some(1_000),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.role, Role::User);
        assert!(updated.is_banned);
        assert_eq!(updated.balance_micros, 1_000);

        let err = handler.delete_user(second.id, first.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let err = handler
            .update_user(
                second.id,
                first.id,
                UserUpdate {
                    balance_adjustment_micros: Some(5),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }
}
