use std::sync::Arc;

use axum::{
    extract::FromRef,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use super::{ServiceChannels, ServiceError};
use crate::auth::SessionKeys;

mod admin;
mod ads;
mod auth;
mod chat;
mod direct_links;
mod notices;
mod security;
mod users;
mod withdrawals;

#[derive(Clone)]
pub struct AppState {
    channels: ServiceChannels,
    keys: Arc<SessionKeys>,
}

impl FromRef<AppState> for Arc<SessionKeys> {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

impl FromRef<AppState> for ServiceChannels {
    fn from_ref(state: &AppState) -> Self {
        state.channels.clone()
    }
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Validation(_) | ServiceError::InsufficientBalance => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Cooldown { .. } => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Database(_)
            | ServiceError::Communication(_, _)
            | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Validation(_) => "invalid_request",
            ServiceError::InsufficientBalance => "insufficient_balance",
            ServiceError::Unauthorized(_) => "unauthorized",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::Cooldown { .. } => "cooldown",
            ServiceError::Unavailable(_) => "unavailable",
            ServiceError::Database(_) => "database_error",
            ServiceError::Communication(_, _) | ServiceError::Internal(_) => "internal_error",
        }
    }

    fn details(&self) -> String {
        match self {
            ServiceError::NotFound(msg)
            | ServiceError::Validation(msg)
            | ServiceError::Unauthorized(msg)
            | ServiceError::Forbidden(msg)
            | ServiceError::Conflict(msg)
            | ServiceError::Unavailable(msg) => msg.clone(),
            ServiceError::InsufficientBalance => "Insufficient balance".to_string(),
            ServiceError::Cooldown { message, .. } => message.clone(),
            ServiceError::Database(_)
            | ServiceError::Communication(_, _)
            | ServiceError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed: {}", self);
        }

        let mut body = json!({
            "error": self.code(),
            "details": self.details(),
        });

        if let ServiceError::Cooldown {
            retry_after_secs, ..
        } = &self
        {
            body["retry_after_secs"] = json!(retry_after_secs);
            let mut response = (status, Json(body)).into_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            return response;
        }

        (status, Json(body)).into_response()
    }
}

fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/telegram", post(auth::telegram))
        .route("/auth/logout", post(auth::logout))
        .route("/settings", get(admin::public_settings))
        .route("/users/me", get(users::me))
        .route("/users/me/referrals", get(users::referrals))
        .route("/users/me/history", get(users::history))
        .route("/users/me/achievements", get(users::achievements))
        .route("/users/me/withdrawals", get(withdrawals::list_mine))
        .route("/ads/watch", post(ads::watch))
        .route("/ads/status", get(ads::status))
        .route("/withdrawals/quote", get(withdrawals::quote))
        .route("/withdrawals", post(withdrawals::create))
        .route("/notices", get(notices::list_active))
        .route("/direct-links", get(direct_links::list_for_user))
        .route("/direct-links/{id}/click", post(direct_links::click))
        .route("/security/violations", post(security::report))
        .route(
            "/chat/messages",
            get(chat::my_thread).post(chat::send_to_support),
        )
        .nest("/admin", admin_router());

    Router::new()
        .nest("/api", api)
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(admin::stats))
        .route("/users", get(admin::list_users))
        .route(
            "/users/{id}",
            get(admin::get_user)
                .put(admin::update_user)
                .delete(admin::delete_user),
        )
        .route(
            "/settings",
            get(admin::get_settings).put(admin::update_settings),
        )
        .route("/withdrawals", get(withdrawals::list_all))
        .route("/withdrawals/{id}", put(withdrawals::decide))
        .route(
            "/notices",
            get(notices::list_all).post(notices::create),
        )
        .route(
            "/notices/{id}",
            put(notices::update).delete(notices::remove),
        )
        .route(
            "/direct-links",
            get(direct_links::list_all).post(direct_links::create),
        )
        .route(
            "/direct-links/{id}",
            put(direct_links::update).delete(direct_links::remove),
        )
        .route("/security/violations", get(security::list))
        .route("/security/violations/{id}", delete(security::remove))
        .route("/chat", get(chat::conversations))
        .route(
            "/chat/{user_id}",
            get(chat::user_thread).post(chat::reply),
        )
}

pub async fn start_http_server(
    channels: ServiceChannels,
    keys: Arc<SessionKeys>,
    address: &str,
) -> Result<(), anyhow::Error> {
    let app = router(AppState { channels, keys });

    let listener = tokio::net::TcpListener::bind(address).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AdminSession;
    use crate::models::users::{Role, User};
    use crate::services::users::UserRequest;
    use axum::body::to_bytes;
    use axum::extract::FromRequestParts;
    use axum::http::Request;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    /// State whose user service answers every admin check with `verdict`.
    fn state_with_admin_check(
        keys: Arc<SessionKeys>,
        verdict: fn(Uuid) -> Result<User, ServiceError>,
    ) -> AppState {
        let (users, mut users_rx) = mpsc::channel(8);
        tokio::spawn(async move {
            while let Some(request) = users_rx.recv().await {
                if let UserRequest::AuthorizeAdmin { id, response } = request {
                    let _ = response.send(verdict(id));
                }
            }
        });

        let channels = ServiceChannels {
            users,
            ads: mpsc::channel(1).0,
            withdrawals: mpsc::channel(1).0,
            notices: mpsc::channel(1).0,
            security: mpsc::channel(1).0,
            direct_links: mpsc::channel(1).0,
            chat: mpsc::channel(1).0,
            admin: mpsc::channel(1).0,
        };
        AppState { channels, keys }
    }

    fn bearer(token: &str) -> axum::http::request::Parts {
        Request::builder()
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    fn stored(role: Role, is_banned: bool) -> Result<User, ServiceError> {
        let mut user = User::sample(role);
        user.is_banned = is_banned;
        crate::services::ensure_admin(user)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn errors_map_to_status_codes() {
        let cases = [
            (ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ServiceError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (ServiceError::InsufficientBalance, StatusCode::BAD_REQUEST),
            (ServiceError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (ServiceError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (ServiceError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                ServiceError::Cooldown {
                    message: "x".into(),
                    retry_after_secs: 1,
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                ServiceError::Unavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ServiceError::Database("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ServiceError::Communication("Ads".into(), "closed".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn cooldown_body_carries_retry_after() {
        let response = ServiceError::Cooldown {
            message: "Please wait 9 seconds between ads".into(),
            retry_after_secs: 9,
        }
        .into_response();

        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            "9"
        );
        let body = body_json(response).await;
        assert_eq!(body["error"], "cooldown");
        assert_eq!(body["retry_after_secs"], 9);
        assert_eq!(body["details"], "Please wait 9 seconds between ads");
    }

    #[tokio::test]
    async fn admin_extractor_rejects_regular_users() {
        let keys = Arc::new(SessionKeys::new("secret", 1));
        let state = state_with_admin_check(keys.clone(), |_| stored(Role::Admin, false));
        let token = keys.issue(&User::sample(Role::User)).unwrap();

        let err = AdminSession::from_request_parts(&mut bearer(&token), &state)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn admin_token_is_rechecked_against_stored_account() {
        let keys = Arc::new(SessionKeys::new("secret", 1));
        let token = keys.issue(&User::sample(Role::Admin)).unwrap();

        let state = state_with_admin_check(keys.clone(), |_| stored(Role::Admin, false));
        assert!(AdminSession::from_request_parts(&mut bearer(&token), &state)
            .await
            .is_ok());

        // Banned after the token was issued.
        let state = state_with_admin_check(keys.clone(), |_| stored(Role::Admin, true));
        let err = AdminSession::from_request_parts(&mut bearer(&token), &state)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        // Demoted after the token was issued.
        let state = state_with_admin_check(keys.clone(), |_| stored(Role::User, false));
        let err = AdminSession::from_request_parts(&mut bearer(&token), &state)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(msg) if msg.contains("Admin")));
    }

    #[tokio::test]
    async fn database_details_are_not_echoed() {
        let response =
            ServiceError::Database("relation \"users\" does not exist".into()).into_response();
        let body = body_json(response).await;

        assert_eq!(body["error"], "database_error");
        assert_eq!(body["details"], "Internal server error");
    }
}
