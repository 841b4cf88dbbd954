//! Opt-in retry wrapper.

use std::time::Duration;

use async_trait::async_trait;

use super::{QueryResponse, Statement, Transport, TransportError};

/// How many times to try a read, and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 behave as 1.
    pub max_attempts: u32,
    /// Base delay; attempt `n` waits `n * backoff` before retrying.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Retries read-only statements that failed in transit.
///
/// Writes and transactions are passed through untouched: a write that timed
/// out may still have committed, and replaying it is the caller's call.
#[derive(Debug)]
pub struct RetryTransport<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T> RetryTransport<T> {
    /// Wraps `inner` with `policy`.
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<T: Transport> Transport for RetryTransport<T> {
    async fn query(&self, statement: &Statement) -> Result<QueryResponse, TransportError> {
        if !statement.is_read_only() {
            return self.inner.query(statement).await;
        }

        let mut attempt = 1;
        loop {
            match self.inner.query(statement).await {
                Err(err) if err.is_transient() && attempt < self.policy.max_attempts => {
                    tracing::warn!(attempt, error = %err, "retrying read after transport failure");
                    tokio::time::sleep(self.policy.backoff * attempt).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn transaction(
        &self,
        statements: &[Statement],
    ) -> Result<Vec<QueryResponse>, TransportError> {
        self.inner.transaction(statements).await
    }
}
