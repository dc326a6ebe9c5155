use axum::{extract::State, Json};
use serde::Deserialize;

use super::AppState;
use crate::auth::Session;
use crate::services::ads::{AdRequest, AdStatus, AdWatchOutcome};
use crate::services::{request, ServiceError};

#[derive(Deserialize)]
pub struct WatchRequest {
    ad_network: Option<String>,
}

pub async fn watch(
    State(state): State<AppState>,
    session: Session,
    body: Option<Json<WatchRequest>>,
) -> Result<Json<AdWatchOutcome>, ServiceError> {
    let ad_network = body.and_then(|Json(req)| req.ad_network);
    let outcome = request(&state.channels.ads, "Ads", |response| AdRequest::Watch {
        user_id: session.user_id(),
        ad_network,
        response,
    })
    .await?;

    Ok(Json(outcome))
}

pub async fn status(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<AdStatus>, ServiceError> {
    let status = request(&state.channels.ads, "Ads", |response| AdRequest::Status {
        user_id: session.user_id(),
        response,
    })
    .await?;

    Ok(Json(status))
}
