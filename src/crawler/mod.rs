//! Crawler module for fetching pages and running tasks
//!
//! This module contains the execution side of the crate, including:
//! - The HTTP transport boundary and its retry wrapper
//! - HTML document parsing
//! - Sequential and worker pool runners
//! - The built-in page title task
//! - The [`run`] entry point tying tasks, transactions and runners together

mod http;
mod parser;
mod retry;
mod runner;
mod title;

pub use http::{build_http_client, user_agent, Body, Doer, HttpDoer, Request, Response};
pub use parser::{page_links, page_title, parse_document};
pub use retry::RetryDoer;
pub use runner::{ConcurrentRunner, ErrorHandler, LogErrors, Runner, SequentialRunner};
pub use title::{PageTitle, TitleTask, PAGE_TITLE_SCHEMA};

use crate::storage::Tx;
use crate::task::{AnyTask, TaskGroup};
use crate::HarvestError;
use std::sync::Arc;

/// Runs tasks committing into one transaction
///
/// A single task is lifted and run on its own. Several tasks run as a
/// [`TaskGroup`], so `tx` commits only if all of them succeed. No tasks is
/// a no-op.
///
/// # Arguments
///
/// * `runner` - Runner executing the tasks
/// * `tx` - Base transaction
/// * `tasks` - Tasks of any shape
///
/// # Returns
///
/// * `Ok(())` - Every task ran or was handled by the runner's error handler
/// * `Err(HarvestError)` - The error handler aborted the run
///
/// # Panics
///
/// Panics if there is more than one task and one of them is an
/// [`AnyTask::Task`], which cannot join a group.
pub async fn run(
    runner: &dyn Runner,
    tx: Arc<dyn Tx>,
    mut tasks: Vec<AnyTask>,
) -> Result<(), HarvestError> {
    match tasks.len() {
        0 => Ok(()),
        1 => match tasks.pop() {
            Some(task) => runner.run(task.into_task(tx)).await,
            None => Ok(()),
        },
        n => {
            tracing::debug!("Running {} tasks as one group", n);
            let mut group = TaskGroup::new(tx);
            for task in tasks {
                group.add(task);
            }
            group.run(runner).await
        }
    }
}
