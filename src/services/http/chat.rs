use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::AppState;
use crate::auth::{AdminSession, Session};
use crate::models::messages::{Conversation, Message, MessageInput, Sender};
use crate::services::chat::ChatRequest;
use crate::services::{request, ServiceError};

async fn thread(state: &AppState, user_id: Uuid, reader: Sender) -> Result<Json<Vec<Message>>, ServiceError> {
    let messages = request(&state.channels.chat, "Chat", |response| ChatRequest::Thread {
        user_id,
        reader,
        response,
    })
    .await?;

    Ok(Json(messages))
}

async fn send(
    state: &AppState,
    user_id: Uuid,
    sender: Sender,
    input: MessageInput,
) -> Result<(StatusCode, Json<Message>), ServiceError> {
    let message = request(&state.channels.chat, "Chat", |response| ChatRequest::Send {
        user_id,
        sender,
        input,
        response,
    })
    .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn my_thread(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<Message>>, ServiceError> {
    thread(&state, session.user_id(), Sender::User).await
}

pub async fn send_to_support(
    State(state): State<AppState>,
    session: Session,
    Json(input): Json<MessageInput>,
) -> Result<(StatusCode, Json<Message>), ServiceError> {
    send(&state, session.user_id(), Sender::User, input).await
}

pub async fn conversations(
    State(state): State<AppState>,
    _admin: AdminSession,
) -> Result<Json<Vec<Conversation>>, ServiceError> {
    let conversations = request(&state.channels.chat, "Chat", |response| {
        ChatRequest::Conversations { response }
    })
    .await?;

    Ok(Json(conversations))
}

pub async fn user_thread(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<Message>>, ServiceError> {
    thread(&state, user_id, Sender::Admin).await
}

pub async fn reply(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(user_id): Path<Uuid>,
    Json(input): Json<MessageInput>,
) -> Result<(StatusCode, Json<Message>), ServiceError> {
    send(&state, user_id, Sender::Admin, input).await
}
