use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::AppState;
use crate::auth::SessionKeys;
use crate::models::users::User;
use crate::services::users::UserRequest;
use crate::services::{request, ServiceError};

#[derive(Deserialize)]
pub struct RegisterRequest {
    email: String,
    password: String,
    display_name: Option<String>,
    referral_code: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub struct TelegramRequest {
    init_data: String,
}

#[derive(Serialize)]
struct SessionResponse {
    token: String,
    user: User,
}

/// Issues a session for `user`, returned in the body and as a cookie.
fn signed_in(state: &AppState, user: User) -> Result<impl IntoResponse, ServiceError> {
    let token = state.keys.issue(&user)?;
    let cookie = state.keys.cookie(&token);

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(SessionResponse { token, user }),
    ))
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let user = request(&state.channels.users, "Users", |response| UserRequest::Register {
        email: req.email,
        password: req.password,
        display_name: req.display_name,
        referral_code: req.referral_code,
        response,
    })
    .await?;

    signed_in(&state, user)
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let user = request(&state.channels.users, "Users", |response| UserRequest::Login {
        email: req.email,
        password: req.password,
        response,
    })
    .await?;

    signed_in(&state, user)
}

pub async fn telegram(
    State(state): State<AppState>,
    Json(req): Json<TelegramRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let user = request(&state.channels.users, "Users", |response| {
        UserRequest::TelegramLogin {
            init_data: req.init_data,
            response,
        }
    })
    .await?;

    signed_in(&state, user)
}

pub async fn logout() -> impl IntoResponse {
    (
        [(header::SET_COOKIE, SessionKeys::clear_cookie())],
        Json(json!({ "ok": true })),
    )
}
