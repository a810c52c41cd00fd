//! Fixed-count fetch retry.

use crate::crawler::http::{Doer, Request, Response};
use crate::HarvestError;
use async_trait::async_trait;

/// Wraps a [`Doer`] and retries failed fetches.
///
/// Every failure is retried the same way: no backoff, no classification.
/// The first success is returned, or the last error once attempts run out.
#[derive(Debug, Clone)]
pub struct RetryDoer<D> {
    inner: D,
    attempts: u32,
}

impl<D: Doer> RetryDoer<D> {
    /// Create a retrying doer making at most `attempts` tries (at least one).
    pub fn new(inner: D, attempts: u32) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
        }
    }

    /// Returns the maximum number of attempts per request.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[async_trait]
impl<D: Doer> Doer for RetryDoer<D> {
    async fn fetch(&self, request: &Request) -> Result<Response, HarvestError> {
        let mut attempt = 1;
        loop {
            match self.inner.fetch(request).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt >= self.attempts => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        "Fetch of {} failed (attempt {}/{}): {}",
                        request.url,
                        attempt,
                        self.attempts,
                        e
                    );
                    attempt += 1;
                }
            }
        }
    }
}
