use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::achievements::AchievementTracker;
use super::ads::seconds_until_next_ad;
use super::{RequestHandler, Responder, Service, ServiceError};
use crate::auth::{password, telegram};
use crate::models::achievements::{AchievementStatus, Metric};
use crate::models::history::{History, HistoryKind, NewHistory};
use crate::models::users::{NewUser, Profile, ReferralSummary, Role, User};
use crate::models::{Page, Paginated};
use crate::repositories::history::HistoryRepository;
use crate::repositories::settings::SettingsRepository;
use crate::repositories::users::UserRepository;
use crate::settings::Auth;

pub enum UserRequest {
    Register {
        email: String,
        password: String,
        display_name: Option<String>,
        referral_code: Option<String>,
        response: Responder<User>,
    },
    Login {
        email: String,
        password: String,
        response: Responder<User>,
    },
    TelegramLogin {
        init_data: String,
        response: Responder<User>,
    },
    GetProfile {
        id: Uuid,
        response: Responder<Profile>,
    },
    GetReferrals {
        id: Uuid,
        response: Responder<ReferralSummary>,
    },
    GetHistory {
        id: Uuid,
        page: Page,
        response: Responder<Paginated<History>>,
    },
    GetAchievements {
        id: Uuid,
        response: Responder<Vec<AchievementStatus>>,
    },
    AuthorizeAdmin {
        id: Uuid,
        response: Responder<User>,
    },
}

/// Lower-cases and trims an email, rejecting obviously malformed ones.
pub fn normalize_email(email: &str) -> Result<String, ServiceError> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
        }
        None => false,
    };

    if !valid || email.len() > 254 || email.chars().any(char::is_whitespace) {
        return Err(ServiceError::Validation("Invalid email address".to_string()));
    }

    Ok(email)
}

#[derive(Clone)]
pub struct UserRequestHandler {
    repository: UserRepository,
    history: HistoryRepository,
    settings: SettingsRepository,
    achievements: AchievementTracker,
    auth: Auth,
}

impl UserRequestHandler {
    pub fn new(sql_conn: PgPool, settings: SettingsRepository, auth: Auth) -> Self {
        UserRequestHandler {
            repository: UserRepository::new(sql_conn.clone()),
            history: HistoryRepository::new(sql_conn.clone()),
            achievements: AchievementTracker::new(sql_conn),
            settings,
            auth,
        }
    }

    fn is_admin_email(&self, email: &str) -> bool {
        self.auth
            .admin_emails
            .iter()
            .any(|admin| admin.trim().eq_ignore_ascii_case(email))
    }

    async fn active_user(&self, id: Uuid) -> Result<User, ServiceError> {
        super::active_user(&self.repository, id).await
    }

    /// Creates the account, pays the signup bonus and rewards the referrer's milestones.
    async fn create_user(&self, new_user: NewUser) -> Result<User, ServiceError> {
        let bonus = self.settings.current().await.signup_bonus_micros;

        let mut tx = self
            .repository
            .pool()
            .begin()
            .await
            .map_err(ServiceError::database)?;

        let mut user = UserRepository::insert_user(&mut *tx, &new_user)
            .await
            .map_err(|e| {
                let duplicate = matches!(
                    e.downcast_ref::<sqlx::Error>(),
                    Some(sqlx::Error::Database(db)) if db.is_unique_violation()
                );
                if duplicate {
                    ServiceError::Conflict("Account already exists".to_string())
                } else {
                    ServiceError::database(e)
                }
            })?;

        if bonus > 0 {
            UserRepository::credit(&mut *tx, user.id, bonus, false)
                .await
                .map_err(ServiceError::database)?;
            HistoryRepository::insert(
                &mut *tx,
                &NewHistory::new(user.id, HistoryKind::SignupBonus, bonus, "Welcome bonus"),
            )
            .await
            .map_err(ServiceError::database)?;
            user.balance_micros += bonus;
            user.total_earned_micros += bonus;
        }

        tx.commit().await.map_err(ServiceError::database)?;
        log::info!("Created user {} (referred by {:?})", user.id, user.referred_by);

        if let Some(referrer) = user.referred_by {
            match self.repository.count_referrals(referrer).await {
                Ok(count) => {
                    self.achievements
                        .evaluate_quietly(referrer, Metric::Referrals, count)
                        .await
                }
                Err(e) => log::error!("Could not count referrals for {}: {}", referrer, e),
            }
        }

        Ok(user)
    }

    async fn register(
        &self,
        email: String,
        password: String,
        display_name: Option<String>,
        referral_code: Option<String>,
    ) -> Result<User, ServiceError> {
        let email = normalize_email(&email)?;
        if password.chars().count() < password::MIN_PASSWORD_CHARS {
            return Err(ServiceError::Validation(format!(
                "Password must be at least {} characters",
                password::MIN_PASSWORD_CHARS
            )));
        }

        if self
            .repository
            .get_user_by_email(&email)
            .await
            .map_err(ServiceError::database)?
            .is_some()
        {
            return Err(ServiceError::Conflict("Email already registered".to_string()));
        }

        let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&password))
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        let display_name = display_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or("user").to_string());

        self.create_user(NewUser {
            is_admin: self.is_admin_email(&email),
            email: Some(email),
            password_hash: Some(password_hash),
            display_name,
            referral_code: referral_code.filter(|code| !code.trim().is_empty()),
            ..Default::default()
        })
        .await
    }

    async fn login(&self, email: String, password: String) -> Result<User, ServiceError> {
        let invalid = || ServiceError::Unauthorized("Invalid credentials".to_string());
        let email = normalize_email(&email).map_err(|_| invalid())?;

        let user = self
            .repository
            .get_user_by_email(&email)
            .await
            .map_err(ServiceError::database)?
            .ok_or_else(invalid)?;

        let stored_hash = user.password_hash.clone().ok_or_else(invalid)?;
        let verified =
            tokio::task::spawn_blocking(move || password::verify_password(&password, &stored_hash))
                .await
                .map_err(|e| ServiceError::Internal(e.to_string()))?;
        if !verified {
            log::debug!("Failed login for {}", email);
            return Err(invalid());
        }

        if user.is_banned {
            return Err(ServiceError::Forbidden("Account is banned".to_string()));
        }

        if !user.is_admin() && self.is_admin_email(&email) {
            return self
                .repository
                .set_role(user.id, Role::Admin)
                .await
                .map_err(ServiceError::database);
        }

        Ok(user)
    }

    async fn telegram_login(&self, init_data: String) -> Result<User, ServiceError> {
        let bot_token = self.auth.telegram_bot_token.as_deref().ok_or_else(|| {
            ServiceError::Unavailable("Telegram sign-in is not configured".to_string())
        })?;

        let data = telegram::verify_init_data(
            &init_data,
            bot_token,
            self.auth.telegram_max_auth_age_secs,
            chrono::Utc::now().timestamp(),
        )
        .map_err(|e| ServiceError::Unauthorized(e.to_string()))?;

        let is_admin = self.auth.admin_telegram_ids.contains(&data.user.id);
        let display_name = data.user.display_name();

        let existing = self
            .repository
            .get_user_by_telegram_id(data.user.id)
            .await
            .map_err(ServiceError::database)?;

        match existing {
            Some(user) => {
                if user.is_banned {
                    return Err(ServiceError::Forbidden("Account is banned".to_string()));
                }

                let mut user = self
                    .repository
                    .update_telegram_profile(user.id, data.user.username.as_deref(), &display_name)
                    .await
                    .map_err(ServiceError::database)?;
                if is_admin && !user.is_admin() {
                    user = self
                        .repository
                        .set_role(user.id, Role::Admin)
                        .await
                        .map_err(ServiceError::database)?;
                }
                Ok(user)
            }
            None => {
                self.create_user(NewUser {
                    telegram_id: Some(data.user.id),
                    username: data.user.username.clone(),
                    display_name,
                    referral_code: data.start_param,
                    is_admin,
                    ..Default::default()
                })
                .await
            }
        }
    }

    async fn get_profile(&self, id: Uuid) -> Result<Profile, ServiceError> {
        let user = self.active_user(id).await?;
        let referral_count = self
            .repository
            .count_referrals(id)
            .await
            .map_err(ServiceError::database)?;
        let cooldown = self.settings.current().await.ad_cooldown_secs;

        Ok(Profile {
            next_ad_in_secs: seconds_until_next_ad(
                user.last_ad_watched_at,
                cooldown,
                chrono::Utc::now(),
            ),
            user,
            referral_count,
        })
    }

    async fn get_referrals(&self, id: Uuid) -> Result<ReferralSummary, ServiceError> {
        let user = self.active_user(id).await?;
        let referrals = self
            .repository
            .list_referrals(id)
            .await
            .map_err(ServiceError::database)?;

        Ok(ReferralSummary {
            referral_code: user.referral_code,
            total_commission_micros: user.referral_earnings_micros,
            referrals,
        })
    }

    async fn get_history(&self, id: Uuid, page: Page) -> Result<Paginated<History>, ServiceError> {
        self.active_user(id).await?;
        let (items, total) = self
            .history
            .list_for_user(id, page)
            .await
            .map_err(ServiceError::database)?;

        Ok(Paginated::new(items, page, total))
    }

    async fn get_achievements(&self, id: Uuid) -> Result<Vec<AchievementStatus>, ServiceError> {
        self.active_user(id).await?;
        self.achievements.statuses(id).await
    }
}

#[async_trait]
impl RequestHandler<UserRequest> for UserRequestHandler {
    async fn handle_request(&self, request: UserRequest) {
        match request {
            UserRequest::Register {
                email,
                password,
                display_name,
                referral_code,
                response,
            } => {
                let user = self
                    .register(email, password, display_name, referral_code)
                    .await;
                let _ = response.send(user);
            }
            UserRequest::Login {
                email,
                password,
                response,
            } => {
                let user = self.login(email, password).await;
                let _ = response.send(user);
            }
            UserRequest::TelegramLogin {
                init_data,
                response,
            } => {
                let user = self.telegram_login(init_data).await;
                let _ = response.send(user);
            }
            UserRequest::GetProfile { id, response } => {
                let profile = self.get_profile(id).await;
                let _ = response.send(profile);
            }
            UserRequest::GetReferrals { id, response } => {
                let referrals = self.get_referrals(id).await;
                let _ = response.send(referrals);
            }
            UserRequest::GetHistory { id, page, response } => {
                let history = self.get_history(id, page).await;
                let _ = response.send(history);
            }
            UserRequest::GetAchievements { id, response } => {
                let achievements = self.get_achievements(id).await;
                let _ = response.send(achievements);
            }
            UserRequest::AuthorizeAdmin { id, response } => {
                let admin = super::active_admin(&self.repository, id).await;
                let _ = response.send(admin);
            }
        }
    }
}

pub struct UserService;

impl UserService {
    pub fn new() -> Self {
        UserService {}
    }
}

#[async_trait]
impl Service<UserRequest, UserRequestHandler> for UserService {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_email() {
        assert_eq!(
            normalize_email("  Karim@Example.COM ").unwrap(),
            "karim@example.com"
        );
    }

    #[test]
    fn rejects_malformed_emails() {
        for bad in ["", "karim", "@example.com", "karim@", "karim@example", "ka rim@example.com", "a@b@c.com", "karim@.com"] {
            assert!(normalize_email(bad).is_err(), "{} should be rejected", bad);
        }
    }
}
