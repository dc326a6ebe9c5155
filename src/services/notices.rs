use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{RequestHandler, Responder, Service, ServiceError};
use crate::models::notices::{Notice, NoticeInput};
use crate::repositories::notices::NoticeRepository;

pub enum NoticeRequest {
    List {
        include_inactive: bool,
        response: Responder<Vec<Notice>>,
    },
    Create {
        input: NoticeInput,
        response: Responder<Notice>,
    },
    Update {
        id: Uuid,
        input: NoticeInput,
        response: Responder<Notice>,
    },
    Delete {
        id: Uuid,
        response: Responder<()>,
    },
}

#[derive(Clone)]
pub struct NoticeRequestHandler {
    repository: NoticeRepository,
}

impl NoticeRequestHandler {
    pub fn new(sql_conn: PgPool) -> Self {
        NoticeRequestHandler {
            repository: NoticeRepository::new(sql_conn),
        }
    }

    async fn list(&self, include_inactive: bool) -> Result<Vec<Notice>, ServiceError> {
        self.repository
            .list(!include_inactive)
            .await
            .map_err(ServiceError::database)
    }

    async fn create(&self, input: NoticeInput) -> Result<Notice, ServiceError> {
        let input = input.normalized().map_err(ServiceError::Validation)?;
        let notice = self
            .repository
            .insert(&input)
            .await
            .map_err(ServiceError::database)?;

        log::info!("Notice {} published", notice.id);
        Ok(notice)
    }

    async fn update(&self, id: Uuid, input: NoticeInput) -> Result<Notice, ServiceError> {
        let input = input.normalized().map_err(ServiceError::Validation)?;
        self.repository
            .update(id, &input)
            .await
            .map_err(ServiceError::database)?
            .ok_or_else(|| ServiceError::NotFound("Notice not found".to_string()))
    }

    async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let deleted = self
            .repository
            .delete(id)
            .await
            .map_err(ServiceError::database)?;
        if !deleted {
            return Err(ServiceError::NotFound("Notice not found".to_string()));
        }

        log::info!("Notice {} deleted", id);
        Ok(())
    }
}

#[async_trait]
impl RequestHandler<NoticeRequest> for NoticeRequestHandler {
    async fn handle_request(&self, request: NoticeRequest) {
        match request {
            NoticeRequest::List {
                include_inactive,
                response,
            } => {
                let notices = self.list(include_inactive).await;
                let _ = response.send(notices);
            }
            NoticeRequest::Create { input, response } => {
                let notice = self.create(input).await;
                let _ = response.send(notice);
            }
            NoticeRequest::Update {
                id,
                input,
                response,
            } => {
                let notice = self.update(id, input).await;
                let _ = response.send(notice);
            }
            NoticeRequest::Delete { id, response } => {
                let result = self.delete(id).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct NoticeService;

impl NoticeService {
    pub fn new() -> Self {
        NoticeService {}
    }
}

#[async_trait]
impl Service<NoticeRequest, NoticeRequestHandler> for NoticeService {}
