use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::auth::AdminSession;
use crate::models::settings::{PublicSettings, RewardSettings};
use crate::models::users::{DashboardStats, User, UserUpdate};
use crate::models::{Page, Paginated};
use crate::services::admin::AdminRequest;
use crate::services::{request, ServiceError};

#[derive(Deserialize)]
pub struct UserSearch {
    search: Option<String>,
}

pub async fn stats(
    State(state): State<AppState>,
    _admin: AdminSession,
) -> Result<Json<DashboardStats>, ServiceError> {
    let stats = request(&state.channels.admin, "Admin", |response| {
        AdminRequest::Stats { response }
    })
    .await?;

    Ok(Json(stats))
}

pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(search): Query<UserSearch>,
    Query(page): Query<Page>,
) -> Result<Json<Paginated<User>>, ServiceError> {
    let users = request(&state.channels.admin, "Admin", |response| {
        AdminRequest::ListUsers {
            search: search.search,
            page,
            response,
        }
    })
    .await?;

    Ok(Json(users))
}

pub async fn get_user(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, ServiceError> {
    let user = request(&state.channels.admin, "Admin", |response| {
        AdminRequest::GetUser { id, response }
    })
    .await?;

    Ok(Json(user))
}

pub async fn update_user(
    State(state): State<AppState>,
    admin: AdminSession,
    Path(id): Path<Uuid>,
    Json(update): Json<UserUpdate>,
) -> Result<Json<User>, ServiceError> {
    let user = request(&state.channels.admin, "Admin", |response| {
        AdminRequest::UpdateUser {
            admin_id: admin.user_id(),
            id,
            update,
            response,
        }
    })
    .await?;

    Ok(Json(user))
}

pub async fn delete_user(
    State(state): State<AppState>,
    admin: AdminSession,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    request(&state.channels.admin, "Admin", |response| {
        AdminRequest::DeleteUser {
            admin_id: admin.user_id(),
            id,
            response,
        }
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_settings(
    State(state): State<AppState>,
    _admin: AdminSession,
) -> Result<Json<RewardSettings>, ServiceError> {
    let settings = request(&state.channels.admin, "Admin", |response| {
        AdminRequest::GetSettings { response }
    })
    .await?;

    Ok(Json(settings))
}

pub async fn update_settings(
    State(state): State<AppState>,
    _admin: AdminSession,
    Json(settings): Json<RewardSettings>,
) -> Result<Json<RewardSettings>, ServiceError> {
    let settings = request(&state.channels.admin, "Admin", |response| {
        AdminRequest::UpdateSettings { settings, response }
    })
    .await?;

    Ok(Json(settings))
}

pub async fn public_settings(
    State(state): State<AppState>,
) -> Result<Json<PublicSettings>, ServiceError> {
    let settings = request(&state.channels.admin, "Admin", |response| {
        AdminRequest::PublicSettings { response }
    })
    .await?;

    Ok(Json(settings))
}
