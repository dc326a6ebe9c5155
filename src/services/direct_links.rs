use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use super::{active_user, RequestHandler, Responder, Service, ServiceError};
use crate::models::direct_links::{
    seconds_until_rewardable, ClickOutcome, DirectLink, DirectLinkInput, UserDirectLink,
};
use crate::models::history::{HistoryKind, NewHistory};
use crate::repositories::direct_links::DirectLinkRepository;
use crate::repositories::history::HistoryRepository;
use crate::repositories::settings::SettingsRepository;
use crate::repositories::users::UserRepository;

pub enum DirectLinkRequest {
    ListForUser {
        user_id: Uuid,
        response: Responder<Vec<UserDirectLink>>,
    },
    Click {
        user_id: Uuid,
        link_id: Uuid,
        response: Responder<ClickOutcome>,
    },
    ListAll {
        response: Responder<Vec<DirectLink>>,
    },
    Create {
        input: DirectLinkInput,
        response: Responder<DirectLink>,
    },
    Update {
        id: Uuid,
        input: DirectLinkInput,
        response: Responder<DirectLink>,
    },
    Delete {
        id: Uuid,
        response: Responder<()>,
    },
}

#[derive(Clone)]
pub struct DirectLinkRequestHandler {
    repository: DirectLinkRepository,
    users: UserRepository,
    settings: SettingsRepository,
}

impl DirectLinkRequestHandler {
    pub fn new(sql_conn: PgPool, settings: SettingsRepository) -> Self {
        DirectLinkRequestHandler {
            repository: DirectLinkRepository::new(sql_conn.clone()),
            users: UserRepository::new(sql_conn),
            settings,
        }
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<UserDirectLink>, ServiceError> {
        active_user(&self.users, user_id).await?;
        let cooldown_hours = self.settings.current().await.direct_link_cooldown_hours;
        let links = self
            .repository
            .list(true)
            .await
            .map_err(ServiceError::database)?;
        let last_clicks: HashMap<Uuid, _> = self
            .repository
            .last_rewarded_clicks(user_id)
            .await
            .map_err(ServiceError::database)?
            .into_iter()
            .collect();

        let now = Utc::now();
        Ok(links
            .into_iter()
            .map(|link| UserDirectLink {
                available_in_secs: seconds_until_rewardable(
                    last_clicks.get(&link.id).copied(),
                    cooldown_hours,
                    now,
                ),
                id: link.id,
                title: link.title,
                reward_micros: link.reward_micros,
            })
            .collect())
    }

    /// Records the click and pays the reward when the link is off cooldown for this user.
    async fn click(&self, user_id: Uuid, link_id: Uuid) -> Result<ClickOutcome, ServiceError> {
        let settings = self.settings.current().await;
        let link = self
            .repository
            .get(link_id)
            .await
            .map_err(ServiceError::database)?
            .filter(|link| link.is_active)
            .ok_or_else(|| ServiceError::NotFound("Link not found".to_string()))?;

        let mut tx = self
            .repository
            .pool()
            .begin()
            .await
            .map_err(ServiceError::database)?;

        let user = UserRepository::lock(&mut *tx, user_id)
            .await
            .map_err(ServiceError::database)?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;
        if user.is_banned {
            return Err(ServiceError::Forbidden("Account is banned".to_string()));
        }

        let last_click = DirectLinkRepository::last_rewarded_click(&mut *tx, user_id, link_id)
            .await
            .map_err(ServiceError::database)?;
        let rewarded = !settings.maintenance_mode
            && link.reward_micros > 0
            && seconds_until_rewardable(last_click, settings.direct_link_cooldown_hours, Utc::now())
                == 0;
        let reward_micros = if rewarded { link.reward_micros } else { 0 };

        let click_id = DirectLinkRepository::record_click(&mut *tx, user_id, link_id, reward_micros)
            .await
            .map_err(ServiceError::database)?;

        if rewarded {
            UserRepository::credit(&mut *tx, user_id, reward_micros, false)
                .await
                .map_err(ServiceError::database)?;
            HistoryRepository::insert(
                &mut *tx,
                &NewHistory::new(
                    user_id,
                    HistoryKind::DirectLink,
                    reward_micros,
                    format!("Visited {}", link.title),
                )
                .with_reference(click_id),
            )
            .await
            .map_err(ServiceError::database)?;
        }

        tx.commit().await.map_err(ServiceError::database)?;

        Ok(ClickOutcome {
            url: link.url,
            rewarded,
            reward_micros,
        })
    }

    async fn list_all(&self) -> Result<Vec<DirectLink>, ServiceError> {
        self.repository
            .list(false)
            .await
            .map_err(ServiceError::database)
    }

    async fn create(&self, input: DirectLinkInput) -> Result<DirectLink, ServiceError> {
        let input = input.normalized().map_err(ServiceError::Validation)?;
        let link = self
            .repository
            .insert(&input)
            .await
            .map_err(ServiceError::database)?;

        log::info!("Direct link {} created", link.id);
        Ok(link)
    }

    async fn update(&self, id: Uuid, input: DirectLinkInput) -> Result<DirectLink, ServiceError> {
        let input = input.normalized().map_err(ServiceError::Validation)?;
        self.repository
            .update(id, &input)
            .await
            .map_err(ServiceError::database)?
            .ok_or_else(|| ServiceError::NotFound("Link not found".to_string()))
    }

    async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        if !self
            .repository
            .delete(id)
            .await
            .map_err(ServiceError::database)?
        {
            return Err(ServiceError::NotFound("Link not found".to_string()));
        }

        log::info!("Direct link {} deleted", id);
        Ok(())
    }
}

#[async_trait]
impl RequestHandler<DirectLinkRequest> for DirectLinkRequestHandler {
    async fn handle_request(&self, request: DirectLinkRequest) {
        match request {
            DirectLinkRequest::ListForUser { user_id, response } => {
                let links = self.list_for_user(user_id).await;
                let _ = response.send(links);
            }
            DirectLinkRequest::Click {
                user_id,
                link_id,
                response,
            } => {
                let outcome = self.click(user_id, link_id).await;
                let _ = response.send(outcome);
            }
            DirectLinkRequest::ListAll { response } => {
                let links = self.list_all().await;
                let _ = response.send(links);
            }
            DirectLinkRequest::Create { input, response } => {
                let link = self.create(input).await;
                let _ = response.send(link);
            }
            DirectLinkRequest::Update {
                id,
                input,
                response,
            } => {
                let link = self.update(id, input).await;
                let _ = response.send(link);
            }
            DirectLinkRequest::Delete { id, response } => {
                let result = self.delete(id).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct DirectLinkService;

impl DirectLinkService {
    pub fn new() -> Self {
        DirectLinkService {}
    }
}

#[async_trait]
impl Service<DirectLinkRequest, DirectLinkRequestHandler> for DirectLinkService {}
