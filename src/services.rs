use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::auth::SessionKeys;
use crate::models::users::{Role, User};
use crate::models::withdrawals::QuoteError;
use crate::repositories::settings::SettingsRepository;
use crate::repositories::telegram::TelegramBotApi;
use crate::repositories::users::UserRepository;
use crate::settings::Settings;

mod achievements;
mod admin;
mod ads;
mod chat;
mod direct_links;
pub mod http;
mod notices;
mod notifications;
mod security;
mod users;
mod withdrawals;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Insufficient balance")]
    InsufficientBalance,
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("{message}")]
    Cooldown { message: String, retry_after_secs: i64 },
    #[error("Unavailable: {0}")]
    Unavailable(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Communication error: {0} - {1}")]
    Communication(String, String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Logs a repository failure and hides its details behind `Database`.
    pub fn database<E: Into<anyhow::Error>>(error: E) -> Self {
        let error = error.into();
        log::error!("Database error: {:#}", error);
        ServiceError::Database(error.to_string())
    }
}

impl From<QuoteError> for ServiceError {
    fn from(error: QuoteError) -> Self {
        ServiceError::Validation(error.to_string())
    }
}

pub type Responder<T> = oneshot::Sender<Result<T, ServiceError>>;

/// Refuses banned accounts.
pub fn ensure_active(user: User) -> Result<User, ServiceError> {
    if user.is_banned {
        return Err(ServiceError::Forbidden(
            user.ban_reason
                .unwrap_or_else(|| "Account is banned".to_string()),
        ));
    }
    Ok(user)
}

/// Refuses banned accounts and anyone whose stored role is not admin.
pub fn ensure_admin(user: User) -> Result<User, ServiceError> {
    let user = ensure_active(user)?;
    if user.role != Role::Admin {
        return Err(ServiceError::Forbidden("Admin access required".to_string()));
    }
    Ok(user)
}

/// Loads the acting user from the database and refuses banned accounts.
pub async fn active_user(users: &UserRepository, id: Uuid) -> Result<User, ServiceError> {
    let user = users
        .get_user_by_id(id)
        .await
        .map_err(ServiceError::database)?
        .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;
    ensure_active(user)
}

/// Like [`active_user`], but the stored role must also be admin.
pub async fn active_admin(users: &UserRepository, id: Uuid) -> Result<User, ServiceError> {
    active_user(users, id).await.and_then(ensure_admin)
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

/// Sends a request built around a fresh reply channel and waits for the answer.
pub async fn request<T, R>(
    channel: &mpsc::Sender<T>,
    service: &str,
    build: impl FnOnce(Responder<R>) -> T,
) -> Result<R, ServiceError> {
    let (response_tx, response_rx) = oneshot::channel();

    channel
        .send(build(response_tx))
        .await
        .map_err(|e| ServiceError::Communication(service.to_string(), e.to_string()))?;

    response_rx
        .await
        .map_err(|e| ServiceError::Communication(service.to_string(), e.to_string()))?
}

/// Confirms through the user service that `id` is still an unbanned admin.
pub async fn authorize_admin(channels: &ServiceChannels, id: Uuid) -> Result<User, ServiceError> {
    request(&channels.users, "Users", |response| {
        users::UserRequest::AuthorizeAdmin { id, response }
    })
    .await
}

/// Channels into every running service, as held by the HTTP layer.
#[derive(Clone)]
pub struct ServiceChannels {
    pub users: mpsc::Sender<users::UserRequest>,
    pub ads: mpsc::Sender<ads::AdRequest>,
    pub withdrawals: mpsc::Sender<withdrawals::WithdrawalRequest>,
    pub notices: mpsc::Sender<notices::NoticeRequest>,
    pub security: mpsc::Sender<security::SecurityRequest>,
    pub direct_links: mpsc::Sender<direct_links::DirectLinkRequest>,
    pub chat: mpsc::Sender<chat::ChatRequest>,
    pub admin: mpsc::Sender<admin::AdminRequest>,
}

pub async fn start_services(pool: PgPool, settings: Settings) -> Result<(), anyhow::Error> {
    let (user_tx, mut user_rx) = mpsc::channel(512);
    let (ad_tx, mut ad_rx) = mpsc::channel(512);
    let (withdrawal_tx, mut withdrawal_rx) = mpsc::channel(512);
    let (notice_tx, mut notice_rx) = mpsc::channel(512);
    let (security_tx, mut security_rx) = mpsc::channel(512);
    let (direct_link_tx, mut direct_link_rx) = mpsc::channel(512);
    let (chat_tx, mut chat_rx) = mpsc::channel(512);
    let (admin_tx, mut admin_rx) = mpsc::channel(512);
    let (notification_tx, mut notification_rx) = mpsc::channel(512);

    let reward_settings = SettingsRepository::load(pool.clone(), settings.rewards.clone()).await?;

    let mut user_service = users::UserService::new();
    let mut ad_service = ads::AdService::new();
    let mut withdrawal_service = withdrawals::WithdrawalService::new();
    let mut notice_service = notices::NoticeService::new();
    let mut security_service = security::SecurityService::new();
    let mut direct_link_service = direct_links::DirectLinkService::new();
    let mut chat_service = chat::ChatService::new();
    let mut admin_service = admin::AdminService::new();
    let mut notification_service = notifications::NotificationService::new();

    log::info!("Starting notification service.");
    let bot_api = match (&settings.auth.telegram_bot_token, settings.telegram.notify) {
        (Some(token), true) => Some(TelegramBotApi::new(
            token.clone(),
            settings.telegram.api_url.clone(),
        )),
        _ => None,
    };
    let notification_pool = pool.clone();
    tokio::spawn(async move {
        notification_service
            .run(
                notifications::NotificationRequestHandler::new(notification_pool, bot_api),
                &mut notification_rx,
            )
            .await;
    });

    log::info!("Starting user service.");
    let user_handler = users::UserRequestHandler::new(
        pool.clone(),
        reward_settings.clone(),
        settings.auth.clone(),
    );
    tokio::spawn(async move {
        user_service.run(user_handler, &mut user_rx).await;
    });

    log::info!("Starting ad service.");
    let ad_handler = ads::AdRequestHandler::new(pool.clone(), reward_settings.clone());
    tokio::spawn(async move {
        ad_service.run(ad_handler, &mut ad_rx).await;
    });

    log::info!("Starting withdrawal service.");
    let withdrawal_handler = withdrawals::WithdrawalRequestHandler::new(
        pool.clone(),
        reward_settings.clone(),
        notification_tx.clone(),
    );
    tokio::spawn(async move {
        withdrawal_service
            .run(withdrawal_handler, &mut withdrawal_rx)
            .await;
    });

    log::info!("Starting notice service.");
    let notice_handler = notices::NoticeRequestHandler::new(pool.clone());
    tokio::spawn(async move {
        notice_service.run(notice_handler, &mut notice_rx).await;
    });

    log::info!("Starting security service.");
    let security_handler = security::SecurityRequestHandler::new(pool.clone(), reward_settings.clone());
    tokio::spawn(async move {
        security_service.run(security_handler, &mut security_rx).await;
    });

    log::info!("Starting direct link service.");
    let direct_link_handler =
        direct_links::DirectLinkRequestHandler::new(pool.clone(), reward_settings.clone());
    tokio::spawn(async move {
        direct_link_service
            .run(direct_link_handler, &mut direct_link_rx)
            .await;
    });

    log::info!("Starting chat service.");
    let chat_handler = chat::ChatRequestHandler::new(pool.clone(), notification_tx.clone());
    tokio::spawn(async move {
        chat_service.run(chat_handler, &mut chat_rx).await;
    });

    log::info!("Starting admin service.");
    let admin_handler = admin::AdminRequestHandler::new(pool.clone(), reward_settings.clone());
    tokio::spawn(async move {
        admin_service.run(admin_handler, &mut admin_rx).await;
    });

    let channels = ServiceChannels {
        users: user_tx,
        ads: ad_tx,
        withdrawals: withdrawal_tx,
        notices: notice_tx,
        security: security_tx,
        direct_links: direct_link_tx,
        chat: chat_tx,
        admin: admin_tx,
    };
    let keys = Arc::new(SessionKeys::new(
        &settings.auth.jwt_secret,
        settings.auth.session_hours,
    ));
    let address = format!("{}:{}", settings.server.host, settings.server.port);

    log::info!("Starting HTTP server.");
    http::start_http_server(channels, keys, &address).await
}

#[cfg(test)]
mod tests {
    use super::*;

    enum EchoRequest {
        Double {
            value: i64,
            response: Responder<i64>,
        },
    }

    #[derive(Clone)]
    struct EchoHandler;

    #[async_trait]
    impl RequestHandler<EchoRequest> for EchoHandler {
        async fn handle_request(&self, request: EchoRequest) {
            match request {
                EchoRequest::Double { value, response } => {
                    let result = if value < 0 {
                        Err(ServiceError::Validation("negative".to_string()))
                    } else {
                        Ok(value * 2)
                    };
                    let _ = response.send(result);
                }
            }
        }
    }

    struct EchoService;

    impl Service<EchoRequest, EchoHandler> for EchoService {}

    #[tokio::test]
    async fn request_round_trips_through_running_service() {
        let (tx, mut rx) = mpsc::channel(8);
        tokio::spawn(async move {
            EchoService.run(EchoHandler, &mut rx).await;
        });

        let doubled = request(&tx, "Echo", |response| EchoRequest::Double {
            value: 21,
            response,
        })
        .await
        .unwrap();
        assert_eq!(doubled, 42);

        let err = request(&tx, "Echo", |response| EchoRequest::Double {
            value: -1,
            response,
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn banned_or_demoted_admins_are_refused() {
        assert!(ensure_admin(User::sample(Role::Admin)).is_ok());

        let mut banned = User::sample(Role::Admin);
        banned.is_banned = true;
        banned.ban_reason = Some("fraud".to_string());
        assert!(matches!(ensure_admin(banned), Err(ServiceError::Forbidden(msg)) if msg == "fraud"));

        assert!(matches!(
            ensure_admin(User::sample(Role::User)),
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[test]
    fn banned_users_are_refused() {
        assert!(ensure_active(User::sample(Role::User)).is_ok());

        let mut banned = User::sample(Role::User);
        banned.is_banned = true;
        assert!(matches!(
            ensure_active(banned),
            Err(ServiceError::Forbidden(msg)) if msg == "Account is banned"
        ));
    }

    #[tokio::test]
    async fn closed_service_is_a_communication_error() {
        let (tx, rx) = mpsc::channel::<EchoRequest>(1);
        drop(rx);

        let err = request(&tx, "Echo", |response| EchoRequest::Double {
            value: 1,
            response,
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Communication(service, _) if service == "Echo"));
    }
}
