//! Task shapes and the adapters between them
//!
//! Tasks come in four shapes, from the least to the most work they do
//! themselves:
//! - [`DomTask`]: handles a parsed document tree and stores into a sink
//! - [`TextTask`]: handles the raw response body and stores into a sink
//! - [`StorableTask`]: handles the full response and stores into a sink
//! - [`Task`]: handles the full response and owns its transaction
//!
//! Runners only execute [`Task`]s. The adapters in this module lift each
//! smaller shape one step up until it becomes a transactional task:
//! `DomTask -> TextTask -> StorableTask -> Task`.

mod adapter;
mod group;

pub use adapter::{Atomized, DomAdapter, TextAdapter};
pub use group::{GroupTx, TaskGroup};

use crate::crawler::{Body, Request, Response};
use crate::storage::{Storer, Tx};
use crate::HarvestError;
use async_trait::async_trait;
use scraper::Html;
use std::sync::Arc;

/// Produces the request for a task
///
/// `request` may be called more than once and must build the same request
/// every time.
pub trait Requester: Send + Sync {
    fn request(&self) -> Request;
}

/// A fully transactional task
///
/// A runner that fails to fetch still calls `handle` with `None` so the task
/// can roll back whatever it holds.
#[async_trait]
pub trait Task: Requester {
    async fn handle(&self, response: Option<&mut Response>) -> Result<(), HarvestError>;
}

/// A task that stores what it parses from the full response
#[async_trait]
pub trait StorableTask: Requester {
    async fn handle(&self, response: &mut Response, storer: &dyn Storer)
        -> Result<(), HarvestError>;
}

/// A task that only needs the response body
#[async_trait]
pub trait TextTask: Requester {
    async fn handle(&self, body: &mut Body, storer: &dyn Storer) -> Result<(), HarvestError>;
}

/// A task that works on the parsed HTML document
pub trait DomTask: Requester {
    fn handle(&self, root: &Html, storer: &dyn Storer) -> Result<(), HarvestError>;
}

impl<T: Requester + ?Sized> Requester for Box<T> {
    fn request(&self) -> Request {
        (**self).request()
    }
}

#[async_trait]
impl<T: Task + ?Sized> Task for Box<T> {
    async fn handle(&self, response: Option<&mut Response>) -> Result<(), HarvestError> {
        Task::handle(&**self, response).await
    }
}

#[async_trait]
impl<T: StorableTask + ?Sized> StorableTask for Box<T> {
    async fn handle(
        &self,
        response: &mut Response,
        storer: &dyn Storer,
    ) -> Result<(), HarvestError> {
        StorableTask::handle(&**self, response, storer).await
    }
}

#[async_trait]
impl<T: TextTask + ?Sized> TextTask for Box<T> {
    async fn handle(&self, body: &mut Body, storer: &dyn Storer) -> Result<(), HarvestError> {
        TextTask::handle(&**self, body, storer).await
    }
}

impl<T: DomTask + ?Sized> DomTask for Box<T> {
    fn handle(&self, root: &Html, storer: &dyn Storer) -> Result<(), HarvestError> {
        DomTask::handle(&**self, root, storer)
    }
}

/// A task of any shape
pub enum AnyTask {
    Dom(Box<dyn DomTask>),
    Text(Box<dyn TextTask>),
    Storable(Box<dyn StorableTask>),
    Task(Box<dyn Task>),
}

impl AnyTask {
    pub fn dom(task: impl DomTask + 'static) -> Self {
        Self::Dom(Box::new(task))
    }

    pub fn text(task: impl TextTask + 'static) -> Self {
        Self::Text(Box::new(task))
    }

    pub fn storable(task: impl StorableTask + 'static) -> Self {
        Self::Storable(Box::new(task))
    }

    pub fn task(task: impl Task + 'static) -> Self {
        Self::Task(Box::new(task))
    }

    /// Lifts the task to a transactional task committing into `tx`
    ///
    /// A task that is already transactional is returned as is and `tx` is
    /// not used.
    pub fn into_task(self, tx: Arc<dyn Tx>) -> Box<dyn Task> {
        match self {
            Self::Task(task) => task,
            other => Box::new(Atomized::new(other.into_storable(), tx)),
        }
    }

    /// Lifts the task to a storable task
    ///
    /// # Panics
    ///
    /// Panics on a transactional [`Task`], which has no storable form. Passing
    /// one where a storable task is required is a caller bug.
    pub fn into_storable(self) -> Box<dyn StorableTask> {
        match self {
            Self::Dom(task) => Box::new(TextAdapter::new(DomAdapter::new(task))),
            Self::Text(task) => Box::new(TextAdapter::new(task)),
            Self::Storable(task) => task,
            Self::Task(_) => panic!("a transactional task cannot be lifted into a storable task"),
        }
    }
}

impl std::fmt::Debug for AnyTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shape = match self {
            Self::Dom(_) => "Dom",
            Self::Text(_) => "Text",
            Self::Storable(_) => "Storable",
            Self::Task(_) => "Task",
        };
        write!(f, "AnyTask::{}", shape)
    }
}
