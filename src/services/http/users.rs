use axum::{
    extract::{Query, State},
    Json,
};

use super::AppState;
use crate::auth::Session;
use crate::models::achievements::AchievementStatus;
use crate::models::history::History;
use crate::models::users::{Profile, ReferralSummary};
use crate::models::{Page, Paginated};
use crate::services::users::UserRequest;
use crate::services::{request, ServiceError};

pub async fn me(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Profile>, ServiceError> {
    let profile = request(&state.channels.users, "Users", |response| {
        UserRequest::GetProfile {
            id: session.user_id(),
            response,
        }
    })
    .await?;

    Ok(Json(profile))
}

pub async fn referrals(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<ReferralSummary>, ServiceError> {
    let referrals = request(&state.channels.users, "Users", |response| {
        UserRequest::GetReferrals {
            id: session.user_id(),
            response,
        }
    })
    .await?;

    Ok(Json(referrals))
}

pub async fn history(
    State(state): State<AppState>,
    session: Session,
    Query(page): Query<Page>,
) -> Result<Json<Paginated<History>>, ServiceError> {
    let history = request(&state.channels.users, "Users", |response| {
        UserRequest::GetHistory {
            id: session.user_id(),
            page,
            response,
        }
    })
    .await?;

    Ok(Json(history))
}

pub async fn achievements(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<AchievementStatus>>, ServiceError> {
    let achievements = request(&state.channels.users, "Users", |response| {
        UserRequest::GetAchievements {
            id: session.user_id(),
            response,
        }
    })
    .await?;

    Ok(Json(achievements))
}
