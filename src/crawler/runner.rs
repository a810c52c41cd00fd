//! Task runners
//!
//! A runner executes one [`Task`] end to end:
//! - Builds the request and fetches it through a retrying [`Doer`]
//! - Hands the response to the task, or `None` if the fetch failed
//! - Routes fetch and handler errors to an [`ErrorHandler`]
//!
//! [`SequentialRunner`] does this in place. [`ConcurrentRunner`] feeds a
//! fixed pool of worker tasks from a queue.

use crate::config::RunnerConfig;
use crate::crawler::http::{Doer, Request, Response};
use crate::crawler::retry::RetryDoer;
use crate::task::Task;
use crate::HarvestError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Decides what a task failure means for the run
///
/// Returning `Ok` marks the error as handled. Returning an error aborts the
/// run with it.
pub trait ErrorHandler: Send + Sync {
    fn handle_error(&self, request: &Request, error: HarvestError) -> Result<(), HarvestError>;
}

impl<F> ErrorHandler for F
where
    F: Fn(&Request, HarvestError) -> Result<(), HarvestError> + Send + Sync,
{
    fn handle_error(&self, request: &Request, error: HarvestError) -> Result<(), HarvestError> {
        self(request, error)
    }
}

/// Logs every failure and keeps going
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrors;

impl ErrorHandler for LogErrors {
    fn handle_error(&self, request: &Request, error: HarvestError) -> Result<(), HarvestError> {
        tracing::error!("{} {} failed: {}", request.method, request.url, error);
        Ok(())
    }
}

/// Executes tasks
#[async_trait]
pub trait Runner: Send + Sync {
    /// Runs or schedules `task`
    async fn run(&self, task: Box<dyn Task>) -> Result<(), HarvestError>;

    /// Waits for scheduled work to finish
    async fn close(&self);
}

async fn execute(
    doer: &dyn Doer,
    handler: &dyn ErrorHandler,
    task: &dyn Task,
) -> Result<(), HarvestError> {
    let request = task.request();

    let mut response = match doer.fetch(&request).await {
        Ok(response) => response,
        Err(e) => {
            if let Err(rollback_err) = task.handle(None).await {
                tracing::debug!("Ignoring error from failed fetch cleanup: {}", rollback_err);
            }
            return handler.handle_error(&request, e);
        }
    };

    deliver(handler, task, &request, &mut response).await
}

/// Hands a fetched response to `task`, closing the body on every path
async fn deliver(
    handler: &dyn ErrorHandler,
    task: &dyn Task,
    request: &Request,
    response: &mut Response,
) -> Result<(), HarvestError> {
    let result = task.handle(Some(&mut *response)).await;
    response.body.close();

    match result {
        Ok(()) => Ok(()),
        Err(e) => handler.handle_error(request, e),
    }
}

/// Runs each task to completion before returning
pub struct SequentialRunner {
    doer: RetryDoer<Arc<dyn Doer>>,
    handler: Arc<dyn ErrorHandler>,
}

impl SequentialRunner {
    pub fn new(doer: Arc<dyn Doer>, handler: Arc<dyn ErrorHandler>, config: &RunnerConfig) -> Self {
        Self {
            doer: RetryDoer::new(doer, config.retry_count),
            handler,
        }
    }
}

#[async_trait]
impl Runner for SequentialRunner {
    async fn run(&self, task: Box<dyn Task>) -> Result<(), HarvestError> {
        execute(&self.doer, self.handler.as_ref(), task.as_ref()).await
    }

    async fn close(&self) {}
}

/// Runs tasks on a fixed pool of workers
///
/// `run` only enqueues: errors reach the [`ErrorHandler`], and an error it
/// returns is logged by the worker instead of reaching the caller. `close`
/// stops accepting tasks and waits until every queued task has been
/// processed.
///
/// Must be created inside a Tokio runtime.
pub struct ConcurrentRunner {
    sender: Mutex<Option<mpsc::UnboundedSender<Box<dyn Task>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ConcurrentRunner {
    pub fn new(doer: Arc<dyn Doer>, handler: Arc<dyn ErrorHandler>, config: &RunnerConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel::<Box<dyn Task>>();
        let receiver = Arc::new(Mutex::new(receiver));
        let doer = Arc::new(RetryDoer::new(doer, config.retry_count));

        let workers = (0..config.workers.max(1))
            .map(|id| {
                let receiver = receiver.clone();
                let doer = doer.clone();
                let handler = handler.clone();
                tokio::spawn(async move {
                    tracing::debug!("Worker {} started", id);
                    loop {
                        let task = receiver.lock().await.recv().await;
                        let Some(task) = task else {
                            break;
                        };
                        let result = execute(&*doer, handler.as_ref(), task.as_ref()).await;
                        if let Err(e) = result {
                            tracing::error!("Task for {} aborted: {}", task.request().url, e);
                        }
                    }
                    tracing::debug!("Worker {} stopped", id);
                })
            })
            .collect();

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }
}

#[async_trait]
impl Runner for ConcurrentRunner {
    async fn run(&self, task: Box<dyn Task>) -> Result<(), HarvestError> {
        match self.sender.lock().await.as_ref() {
            Some(sender) => sender.send(task).map_err(|_| HarvestError::RunnerClosed),
            None => Err(HarvestError::RunnerClosed),
        }
    }

    async fn close(&self) {
        self.sender.lock().await.take();

        let workers = std::mem::take(&mut *self.workers.lock().await);
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::warn!("Worker ended abnormally: {}", e);
            }
        }
    }
}
