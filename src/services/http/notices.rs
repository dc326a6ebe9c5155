use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::AppState;
use crate::auth::AdminSession;
use crate::models::notices::{Notice, NoticeInput};
use crate::services::notices::NoticeRequest;
use crate::services::{request, ServiceError};

pub async fn list_active(State(state): State<AppState>) -> Result<Json<Vec<Notice>>, ServiceError> {
    let notices = request(&state.channels.notices, "Notices", |response| {
        NoticeRequest::List {
            include_inactive: false,
            response,
        }
    })
    .await?;

    Ok(Json(notices))
}

pub async fn list_all(
    State(state): State<AppState>,
    _admin: AdminSession,
) -> Result<Json<Vec<Notice>>, ServiceError> {
    let notices = request(&state.channels.notices, "Notices", |response| {
        NoticeRequest::List {
            include_inactive: true,
            response,
        }
    })
    .await?;

    Ok(Json(notices))
}

pub async fn create(
    State(state): State<AppState>,
    _admin: AdminSession,
    Json(input): Json<NoticeInput>,
) -> Result<(StatusCode, Json<Notice>), ServiceError> {
    let notice = request(&state.channels.notices, "Notices", |response| {
        NoticeRequest::Create { input, response }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(notice)))
}

pub async fn update(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<Uuid>,
    Json(input): Json<NoticeInput>,
) -> Result<Json<Notice>, ServiceError> {
    let notice = request(&state.channels.notices, "Notices", |response| {
        NoticeRequest::Update {
            id,
            input,
            response,
        }
    })
    .await?;

    Ok(Json(notice))
}

pub async fn remove(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    request(&state.channels.notices, "Notices", |response| {
        NoticeRequest::Delete { id, response }
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
