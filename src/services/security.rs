use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{RequestHandler, Responder, Service, ServiceError};
use crate::models::security::{
    reaches_ban_threshold, NewViolation, SecurityViolation, ViolationOutcome,
};
use crate::models::{Page, Paginated};
use crate::repositories::security::SecurityRepository;
use crate::repositories::settings::SettingsRepository;
use crate::repositories::users::UserRepository;

pub const AUTO_BAN_REASON: &str = "automatic: security violations";

pub enum SecurityRequest {
    Report {
        violation: NewViolation,
        response: Responder<ViolationOutcome>,
    },
    List {
        user_id: Option<Uuid>,
        page: Page,
        response: Responder<Paginated<SecurityViolation>>,
    },
    Delete {
        id: Uuid,
        response: Responder<()>,
    },
}

#[derive(Clone)]
pub struct SecurityRequestHandler {
    repository: SecurityRepository,
    settings: SettingsRepository,
}

impl SecurityRequestHandler {
    pub fn new(sql_conn: PgPool, settings: SettingsRepository) -> Self {
        SecurityRequestHandler {
            repository: SecurityRepository::new(sql_conn),
            settings,
        }
    }

    /// Stores the violation and bans the reporter once the threshold is reached.
    async fn report(&self, violation: NewViolation) -> Result<ViolationOutcome, ServiceError> {
        let max_violations = self.settings.current().await.max_violations;
        let mut tx = self
            .repository
            .pool()
            .begin()
            .await
            .map_err(ServiceError::database)?;

        let user = match violation.user_id {
            Some(user_id) => UserRepository::lock(&mut *tx, user_id)
                .await
                .map_err(ServiceError::database)?,
            None => None,
        };

        let stored = SecurityRepository::insert(&mut *tx, &violation)
            .await
            .map_err(ServiceError::database)?;

        let mut total_violations = 0;
        let mut banned = false;
        if let Some(user) = user {
            total_violations = SecurityRepository::count_for_user(&mut *tx, user.id)
                .await
                .map_err(ServiceError::database)?;
            banned = user.is_banned;

            if !banned && reaches_ban_threshold(total_violations, max_violations) {
                UserRepository::set_ban(&mut *tx, user.id, true, Some(AUTO_BAN_REASON))
                    .await
                    .map_err(ServiceError::database)?;
                banned = true;
                log::info!(
                    "User {} banned after {} security violations",
                    user.id,
                    total_violations
                );
            }
        }

        tx.commit().await.map_err(ServiceError::database)?;
        log::debug!(
            "Security violation {:?} recorded for {:?}",
            stored.kind,
            stored.user_id
        );

        Ok(ViolationOutcome {
            violation: stored,
            total_violations,
            banned,
        })
    }

    async fn list(
        &self,
        user_id: Option<Uuid>,
        page: Page,
    ) -> Result<Paginated<SecurityViolation>, ServiceError> {
        let (items, total) = self
            .repository
            .list(user_id, page)
            .await
            .map_err(ServiceError::database)?;

        Ok(Paginated::new(items, page, total))
    }

    async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        if !self
            .repository
            .delete(id)
            .await
            .map_err(ServiceError::database)?
        {
            return Err(ServiceError::NotFound("Violation not found".to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl RequestHandler<SecurityRequest> for SecurityRequestHandler {
    async fn handle_request(&self, request: SecurityRequest) {
        match request {
            SecurityRequest::Report {
                violation,
                response,
            } => {
                let outcome = self.report(violation).await;
                let _ = response.send(outcome);
            }
            SecurityRequest::List {
                user_id,
                page,
                response,
            } => {
                let violations = self.list(user_id, page).await;
                let _ = response.send(violations);
            }
            SecurityRequest::Delete { id, response } => {
                let result = self.delete(id).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct SecurityService;

impl SecurityService {
    pub fn new() -> Self {
        SecurityService {}
    }
}

#[async_trait]
impl Service<SecurityRequest, SecurityRequestHandler> for SecurityService {}
