//! Adapters lifting a task shape to the next one up

use crate::crawler::{parse_document, Body, Request, Response};
use crate::storage::{Storer, Tx};
use crate::task::{DomTask, Requester, StorableTask, Task, TextTask};
use crate::HarvestError;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;

/// Turns a [`DomTask`] into a [`TextTask`] by parsing the body
pub struct DomAdapter<T> {
    task: T,
}

impl<T: DomTask> DomAdapter<T> {
    pub fn new(task: T) -> Self {
        Self { task }
    }
}

impl<T: DomTask> Requester for DomAdapter<T> {
    fn request(&self) -> Request {
        self.task.request()
    }
}

#[async_trait]
impl<T: DomTask> TextTask for DomAdapter<T> {
    async fn handle(&self, body: &mut Body, storer: &dyn Storer) -> Result<(), HarvestError> {
        let bytes = body.bytes().await?;
        let root = parse_document(&bytes)?;
        DomTask::handle(&self.task, &root, storer)
    }
}

/// Turns a [`TextTask`] into a [`StorableTask`]
///
/// Only `200 OK` and `202 Accepted` responses reach the task. Any other status
/// fails without reading the body.
pub struct TextAdapter<T> {
    task: T,
}

impl<T: TextTask> TextAdapter<T> {
    pub fn new(task: T) -> Self {
        Self { task }
    }
}

impl<T: TextTask> Requester for TextAdapter<T> {
    fn request(&self) -> Request {
        self.task.request()
    }
}

#[async_trait]
impl<T: TextTask> StorableTask for TextAdapter<T> {
    async fn handle(
        &self,
        response: &mut Response,
        storer: &dyn Storer,
    ) -> Result<(), HarvestError> {
        match response.status {
            StatusCode::OK | StatusCode::ACCEPTED => {}
            status => {
                return Err(HarvestError::Status {
                    code: status.as_u16(),
                    reason: status.canonical_reason().unwrap_or_default().to_string(),
                })
            }
        }
        TextTask::handle(&self.task, &mut response.body, storer).await
    }
}

/// Turns a [`StorableTask`] into a [`Task`] committing into a transaction
///
/// A missing response rolls the transaction back. A handler error rolls back
/// and returns the handler error; success commits.
pub struct Atomized<T> {
    task: T,
    tx: Arc<dyn Tx>,
}

impl<T: StorableTask> Atomized<T> {
    pub fn new(task: T, tx: Arc<dyn Tx>) -> Self {
        Self { task, tx }
    }
}

impl<T: StorableTask> Requester for Atomized<T> {
    fn request(&self) -> Request {
        self.task.request()
    }
}

#[async_trait]
impl<T: StorableTask> Task for Atomized<T> {
    async fn handle(&self, response: Option<&mut Response>) -> Result<(), HarvestError> {
        let Some(response) = response else {
            return Ok(self.tx.rollback()?);
        };

        let storer: &dyn Storer = &self.tx;
        if let Err(e) = StorableTask::handle(&self.task, response, storer).await {
            if let Err(rollback_err) = self.tx.rollback() {
                tracing::debug!("Ignoring rollback error: {}", rollback_err);
            }
            return Err(e);
        }
        Ok(self.tx.commit()?)
    }
}
