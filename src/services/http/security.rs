use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use uuid::Uuid;

use super::AppState;
use crate::auth::{AdminSession, Session};
use crate::models::security::{
    NewViolation, SecurityViolation, ViolationFilter, ViolationOutcome, ViolationReport,
};
use crate::models::{Page, Paginated};
use crate::services::security::SecurityRequest;
use crate::services::{request, ServiceError};

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Client address as reported by the reverse proxy: the first
/// `X-Forwarded-For` hop, falling back to `X-Real-IP`.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|forwarded| forwarded.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| header_str(headers, "x-real-ip"))
        .map(str::to_string)
}

pub async fn report(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Json(report): Json<ViolationReport>,
) -> Result<(StatusCode, Json<ViolationOutcome>), ServiceError> {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let violation = NewViolation::new(
        Some(session.user_id()),
        report,
        client_ip(&headers),
        user_agent,
    );

    let outcome = request(&state.channels.security, "Security", |response| {
        SecurityRequest::Report {
            violation,
            response,
        }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn list(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(filter): Query<ViolationFilter>,
    Query(page): Query<Page>,
) -> Result<Json<Paginated<SecurityViolation>>, ServiceError> {
    let violations = request(&state.channels.security, "Security", |response| {
        SecurityRequest::List {
            user_id: filter.user_id,
            page,
            response,
        }
    })
    .await?;

    Ok(Json(violations))
}

pub async fn remove(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    request(&state.channels.security, "Security", |response| {
        SecurityRequest::Delete { id, response }
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
