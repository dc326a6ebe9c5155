use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::users::{Role, User};
use crate::services::{authorize_admin, ServiceChannels, ServiceError};

pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: usize,
}

/// Signing material for session tokens, shared by the router state.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_hours: i64,
}

impl SessionKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_hours,
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, ServiceError> {
        let claims = Claims {
            sub: user.id,
            role: user.role,
            exp: (chrono::Utc::now() + chrono::Duration::hours(self.ttl_hours)).timestamp() as usize,
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ServiceError::Internal(format!("Could not sign session: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ServiceError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| ServiceError::Unauthorized("Invalid or expired session".to_string()))
    }

    pub fn cookie(&self, token: &str) -> String {
        format!(
            "{}={}; HttpOnly; Path=/; Max-Age={}; SameSite=Lax",
            SESSION_COOKIE,
            token,
            self.ttl_hours * 3600
        )
    }

    pub fn clear_cookie() -> String {
        format!("{}=; HttpOnly; Path=/; Max-Age=0; SameSite=Lax", SESSION_COOKIE)
    }
}

/// Pulls the session token from `Authorization: Bearer` or the session cookie.
fn token_from_parts(parts: &Parts) -> Option<String> {
    if let Some(bearer) = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(bearer.trim().to_string());
    }

    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .map(|s| s.trim())
        .find_map(|s| s.strip_prefix("session="))
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// An authenticated caller.
#[derive(Debug, Clone)]
pub struct Session(pub Claims);

impl Session {
    pub fn user_id(&self) -> Uuid {
        self.0.sub
    }
}

impl<S> FromRequestParts<S> for Session
where
    Arc<SessionKeys>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = Arc::<SessionKeys>::from_ref(state);
        let token = token_from_parts(parts)
            .ok_or_else(|| ServiceError::Unauthorized("Missing session".to_string()))?;

        keys.verify(&token).map(Session)
    }
}

/// An authenticated caller holding the admin role.
///
/// The role claim only short-circuits obvious refusals. The stored account is
/// always re-read, so a ban or demotion takes effect before the token expires.
#[derive(Debug, Clone)]
pub struct AdminSession(pub Claims);

impl AdminSession {
    pub fn user_id(&self) -> Uuid {
        self.0.sub
    }
}

impl<S> FromRequestParts<S> for AdminSession
where
    Arc<SessionKeys>: FromRef<S>,
    ServiceChannels: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Session(claims) = Session::from_request_parts(parts, state).await?;

        if claims.role != Role::Admin {
            return Err(ServiceError::Forbidden("Admin access required".to_string()));
        }

        let channels = ServiceChannels::from_ref(state);
        authorize_admin(&channels, claims.sub).await?;

        Ok(AdminSession(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[derive(Clone)]
    struct TestState(Arc<SessionKeys>);

    impl FromRef<TestState> for Arc<SessionKeys> {
        fn from_ref(state: &TestState) -> Self {
            state.0.clone()
        }
    }

    fn parts_with(header_name: header::HeaderName, value: &str) -> Parts {
        let (parts, _) = Request::builder()
            .header(header_name, value)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn issued_token_verifies() {
        let keys = SessionKeys::new("test-secret", 1);
        let user = User::sample(Role::Admin);
        let token = keys.issue(&user).unwrap();

        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, Role::Admin);
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let token = SessionKeys::new("one", 1).issue(&User::sample(Role::User)).unwrap();
        let err = SessionKeys::new("two", 1).verify(&token).unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[test]
    fn finds_token_in_cookie_header() {
        let parts = parts_with(header::COOKIE, "theme=dark; session=abc.def.ghi; lang=bn");
        assert_eq!(token_from_parts(&parts).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn bearer_header_wins() {
        let parts = parts_with(header::AUTHORIZATION, "Bearer xyz");
        assert_eq!(token_from_parts(&parts).as_deref(), Some("xyz"));
    }

    #[tokio::test]
    async fn missing_session_is_unauthorized() {
        let state = TestState(Arc::new(SessionKeys::new("secret", 1)));
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();

        let err = Session::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }
}
