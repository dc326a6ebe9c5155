use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::AppState;
use crate::auth::{AdminSession, Session};
use crate::models::direct_links::{ClickOutcome, DirectLink, DirectLinkInput, UserDirectLink};
use crate::services::direct_links::DirectLinkRequest;
use crate::services::{request, ServiceError};

pub async fn list_for_user(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<UserDirectLink>>, ServiceError> {
    let links = request(&state.channels.direct_links, "DirectLinks", |response| {
        DirectLinkRequest::ListForUser {
            user_id: session.user_id(),
            response,
        }
    })
    .await?;

    Ok(Json(links))
}

pub async fn click(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<ClickOutcome>, ServiceError> {
    let outcome = request(&state.channels.direct_links, "DirectLinks", |response| {
        DirectLinkRequest::Click {
            user_id: session.user_id(),
            link_id: id,
            response,
        }
    })
    .await?;

    Ok(Json(outcome))
}

pub async fn list_all(
    State(state): State<AppState>,
    _admin: AdminSession,
) -> Result<Json<Vec<DirectLink>>, ServiceError> {
    let links = request(&state.channels.direct_links, "DirectLinks", |response| {
        DirectLinkRequest::ListAll { response }
    })
    .await?;

    Ok(Json(links))
}

pub async fn create(
    State(state): State<AppState>,
    _admin: AdminSession,
    Json(input): Json<DirectLinkInput>,
) -> Result<(StatusCode, Json<DirectLink>), ServiceError> {
    let link = request(&state.channels.direct_links, "DirectLinks", |response| {
        DirectLinkRequest::Create { input, response }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(link)))
}

pub async fn update(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<Uuid>,
    Json(input): Json<DirectLinkInput>,
) -> Result<Json<DirectLink>, ServiceError> {
    let link = request(&state.channels.direct_links, "DirectLinks", |response| {
        DirectLinkRequest::Update {
            id,
            input,
            response,
        }
    })
    .await?;

    Ok(Json(link))
}

pub async fn remove(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    request(&state.channels.direct_links, "DirectLinks", |response| {
        DirectLinkRequest::Delete { id, response }
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
