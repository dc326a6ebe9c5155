use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::auth::{AdminSession, Session};
use crate::models::withdrawals::{
    NewWithdrawal, Withdrawal, WithdrawalDecision, WithdrawalFilter, WithdrawalMethod,
    WithdrawalQuote,
};
use crate::models::{Page, Paginated};
use crate::services::withdrawals::WithdrawalRequest;
use crate::services::{request, ServiceError};

#[derive(Deserialize)]
pub struct QuoteQuery {
    method: WithdrawalMethod,
    amount_micros: i64,
}

pub async fn quote(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<QuoteQuery>,
) -> Result<Json<WithdrawalQuote>, ServiceError> {
    let quote = request(&state.channels.withdrawals, "Withdrawals", |response| {
        WithdrawalRequest::Quote {
            user_id: session.user_id(),
            method: query.method,
            amount_micros: query.amount_micros,
            response,
        }
    })
    .await?;

    Ok(Json(quote))
}

pub async fn create(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<NewWithdrawal>,
) -> Result<(StatusCode, Json<Withdrawal>), ServiceError> {
    let withdrawal = request(&state.channels.withdrawals, "Withdrawals", |response| {
        WithdrawalRequest::Create {
            user_id: session.user_id(),
            request: req,
            response,
        }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(withdrawal)))
}

pub async fn list_mine(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<Withdrawal>>, ServiceError> {
    let withdrawals = request(&state.channels.withdrawals, "Withdrawals", |response| {
        WithdrawalRequest::ListMine {
            user_id: session.user_id(),
            response,
        }
    })
    .await?;

    Ok(Json(withdrawals))
}

pub async fn list_all(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(filter): Query<WithdrawalFilter>,
    Query(page): Query<Page>,
) -> Result<Json<Paginated<Withdrawal>>, ServiceError> {
    let withdrawals = request(&state.channels.withdrawals, "Withdrawals", |response| {
        WithdrawalRequest::ListAll {
            status: filter.status,
            page,
            response,
        }
    })
    .await?;

    Ok(Json(withdrawals))
}

pub async fn decide(
    State(state): State<AppState>,
    admin: AdminSession,
    Path(id): Path<Uuid>,
    Json(decision): Json<WithdrawalDecision>,
) -> Result<Json<Withdrawal>, ServiceError> {
    log::info!(
        "Admin {} decided {:?} on withdrawal {}",
        admin.user_id(),
        decision.action,
        id
    );
    let withdrawal = request(&state.channels.withdrawals, "Withdrawals", |response| {
        WithdrawalRequest::Decide {
            admin_id: admin.user_id(),
            id,
            decision,
            response,
        }
    })
    .await?;

    Ok(Json(withdrawal))
}
