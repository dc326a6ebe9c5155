use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{RequestHandler, Service};
use crate::repositories::telegram::TelegramBotApi;
use crate::repositories::users::UserRepository;

#[derive(Debug)]
pub enum NotificationRequest {
    Notify { user_id: Uuid, text: String },
}

/// Queues a notification without waiting for delivery.
pub fn notify(channel: &mpsc::Sender<NotificationRequest>, user_id: Uuid, text: String) {
    if let Err(e) = channel.try_send(NotificationRequest::Notify { user_id, text }) {
        log::warn!("Dropped notification for {}: {}", user_id, e);
    }
}

#[derive(Clone)]
pub struct NotificationRequestHandler {
    users: UserRepository,
    bot: Option<TelegramBotApi>,
}

impl NotificationRequestHandler {
    pub fn new(sql_conn: PgPool, bot: Option<TelegramBotApi>) -> Self {
        if bot.is_none() {
            log::info!("Telegram notifications are disabled.");
        }

        NotificationRequestHandler {
            users: UserRepository::new(sql_conn),
            bot,
        }
    }

    async fn deliver(&self, user_id: Uuid, text: &str) -> Result<(), anyhow::Error> {
        let Some(bot) = &self.bot else {
            return Ok(());
        };

        let chat_id = match self.users.get_user_by_id(user_id).await? {
            Some(user) => user.telegram_id,
            None => None,
        };
        let Some(chat_id) = chat_id else {
            log::debug!("User {} has no Telegram chat, skipping notification", user_id);
            return Ok(());
        };

        bot.send_message(chat_id, text).await
    }
}

#[async_trait]
impl RequestHandler<NotificationRequest> for NotificationRequestHandler {
    async fn handle_request(&self, request: NotificationRequest) {
        match request {
            NotificationRequest::Notify { user_id, text } => {
                if let Err(e) = self.deliver(user_id, &text).await {
                    log::error!("Could not notify user {}: {}", user_id, e);
                }
            }
        }
    }
}

pub struct NotificationService;

impl NotificationService {
    pub fn new() -> Self {
        NotificationService {}
    }
}

#[async_trait]
impl Service<NotificationRequest, NotificationRequestHandler> for NotificationService {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notify_enqueues_without_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        let user_id = Uuid::new_v4();

        notify(&tx, user_id, "hello".to_string());
        // Queue is full, the second one is dropped instead of waiting.
        notify(&tx, user_id, "dropped".to_string());

        match rx.recv().await {
            Some(NotificationRequest::Notify { user_id: id, text }) => {
                assert_eq!(id, user_id);
                assert_eq!(text, "hello");
            }
            None => panic!("expected a notification"),
        }
        assert!(rx.try_recv().is_err());
    }
}
