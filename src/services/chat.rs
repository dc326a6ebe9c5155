use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::notifications::{notify, NotificationRequest};
use super::{ensure_active, RequestHandler, Responder, Service, ServiceError};
use crate::models::messages::{Conversation, Message, MessageInput, Sender};
use crate::models::users::User;
use crate::repositories::messages::MessageRepository;
use crate::repositories::users::UserRepository;

pub enum ChatRequest {
    Thread {
        user_id: Uuid,
        reader: Sender,
        response: Responder<Vec<Message>>,
    },
    Send {
        user_id: Uuid,
        sender: Sender,
        input: MessageInput,
        response: Responder<Message>,
    },
    Conversations {
        response: Responder<Vec<Conversation>>,
    },
}

/// Banned owners are locked out of their own thread. Support can still read
/// and answer it.
pub fn check_thread_access(owner: User, actor: Sender) -> Result<(), ServiceError> {
    match actor {
        Sender::User => ensure_active(owner).map(|_| ()),
        Sender::Admin => Ok(()),
    }
}

#[derive(Clone)]
pub struct ChatRequestHandler {
    repository: MessageRepository,
    users: UserRepository,
    notifications: mpsc::Sender<NotificationRequest>,
}

impl ChatRequestHandler {
    pub fn new(sql_conn: PgPool, notifications: mpsc::Sender<NotificationRequest>) -> Self {
        ChatRequestHandler {
            repository: MessageRepository::new(sql_conn.clone()),
            users: UserRepository::new(sql_conn),
            notifications,
        }
    }

    async fn ensure_user(&self, user_id: Uuid, actor: Sender) -> Result<(), ServiceError> {
        let owner = self
            .users
            .get_user_by_id(user_id)
            .await
            .map_err(ServiceError::database)?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;
        check_thread_access(owner, actor)
    }

    /// Returns the thread and marks the other side's messages read.
    async fn thread(&self, user_id: Uuid, reader: Sender) -> Result<Vec<Message>, ServiceError> {
        self.ensure_user(user_id, reader).await?;
        let mark_read_from = match reader {
            Sender::User => Sender::Admin,
            Sender::Admin => Sender::User,
        };

        self.repository
            .thread(user_id, mark_read_from)
            .await
            .map_err(ServiceError::database)
    }

    async fn send(
        &self,
        user_id: Uuid,
        sender: Sender,
        input: MessageInput,
    ) -> Result<Message, ServiceError> {
        let body = input.normalized().map_err(ServiceError::Validation)?;
        self.ensure_user(user_id, sender).await?;

        let message = self
            .repository
            .insert(user_id, sender, &body)
            .await
            .map_err(ServiceError::database)?;

        if sender == Sender::Admin {
            notify(
                &self.notifications,
                user_id,
                format!("Support replied: {}", message.body),
            );
        }

        Ok(message)
    }

    async fn conversations(&self) -> Result<Vec<Conversation>, ServiceError> {
        self.repository
            .conversations()
            .await
            .map_err(ServiceError::database)
    }
}

#[async_trait]
impl RequestHandler<ChatRequest> for ChatRequestHandler {
    async fn handle_request(&self, request: ChatRequest) {
        match request {
            ChatRequest::Thread {
                user_id,
                reader,
                response,
            } => {
                let messages = self.thread(user_id, reader).await;
                let _ = response.send(messages);
            }
            ChatRequest::Send {
                user_id,
                sender,
                input,
                response,
            } => {
                let message = self.send(user_id, sender, input).await;
                let _ = response.send(message);
            }
            ChatRequest::Conversations { response } => {
                let conversations = self.conversations().await;
                let _ = response.send(conversations);
            }
        }
    }
}

pub struct ChatService;

impl ChatService {
    pub fn new() -> Self {
        ChatService {}
    }
}

#[async_trait]
impl Service<ChatRequest, ChatRequestHandler> for ChatService {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::users::Role;

    #[test]
    fn banned_user_cannot_use_their_thread_but_support_can() {
        let mut owner = User::sample(Role::User);
        owner.is_banned = true;

        assert!(matches!(
            check_thread_access(owner.clone(), Sender::User),
            Err(ServiceError::Forbidden(_))
        ));
        assert!(check_thread_access(owner, Sender::Admin).is_ok());
        assert!(check_thread_access(User::sample(Role::User), Sender::User).is_ok());
    }
}
