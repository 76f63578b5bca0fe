//! Bounded-parallel dispatch of fetches over the whole identifier list.
//!
//! Each identifier waits for a permit from the admission gate, then runs in
//! its own task. The permit is released as soon as the fetch resolves (or
//! panics), before the outcome is handed on, so a slow flush never holds a
//! fetch slot.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::fetcher::RetryingFetcher;
use crate::types::{FailureReason, FetchOutcome, Identifier};

/// Receives every outcome the dispatcher produces, from concurrent tasks.
#[async_trait::async_trait]
pub trait OutcomeHandler: Send + Sync {
    /// Consume one outcome. Called exactly once per dispatched identifier.
    async fn handle(&self, outcome: FetchOutcome);
}

/// Counts gathered while dispatching
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Outcomes produced (always equals the number of identifiers)
    pub outcomes: usize,
    /// Success outcomes
    pub succeeded: usize,
    /// Failure outcomes, cancellations included
    pub failed: usize,
    /// Identifiers never admitted because the run was interrupted
    pub cancelled: usize,
}

impl DispatchReport {
    fn record(&mut self, success: bool) {
        self.outcomes += 1;
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Runs one [`RetryingFetcher`] per identifier with a hard concurrency ceiling.
#[derive(Clone, Debug)]
pub struct BoundedDispatcher {
    limit: usize,
    cancel: CancellationToken,
}

impl BoundedDispatcher {
    /// Create a dispatcher admitting at most `limit` concurrent fetches (minimum 1).
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Stop admitting new identifiers once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Concurrency ceiling in effect
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Fetch every identifier, handing each outcome to `handler`.
    ///
    /// Completes only after every identifier has produced exactly one outcome.
    /// Duplicates are fetched (and reported) once per occurrence.
    pub async fn run(
        &self,
        fetcher: Arc<RetryingFetcher>,
        identifiers: Vec<Identifier>,
        handler: Arc<dyn OutcomeHandler>,
    ) -> DispatchReport {
        let gate = Arc::new(Semaphore::new(self.limit));
        let mut tasks = JoinSet::new();
        let mut report = DispatchReport::default();
        let mut pending = identifiers.into_iter();

        tracing::debug!(
            identifiers = pending.len(),
            limit = self.limit,
            "Dispatching fetches"
        );

        while let Some(identifier) = pending.next() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = Arc::clone(&gate).acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                let skipped: Vec<Identifier> =
                    std::iter::once(identifier).chain(pending.by_ref()).collect();
                tracing::warn!(
                    skipped = skipped.len(),
                    "Run interrupted, remaining identifiers will not be fetched"
                );
                for identifier in skipped {
                    fetcher.stats().record_failure();
                    handler
                        .handle(FetchOutcome::Failure {
                            identifier,
                            reason: FailureReason::Cancelled,
                        })
                        .await;
                    report.record(false);
                    report.cancelled += 1;
                }
                break;
            };

            let fetcher = Arc::clone(&fetcher);
            let handler = Arc::clone(&handler);
            tasks.spawn(async move {
                let outcome = match AssertUnwindSafe(fetcher.fetch(&identifier))
                    .catch_unwind()
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        tracing::error!(identifier = %identifier, "Fetch task panicked");
                        fetcher.stats().record_failure();
                        FetchOutcome::Failure {
                            identifier,
                            reason: FailureReason::Panicked,
                        }
                    }
                };
                drop(permit);

                let success = outcome.is_success();
                let identifier = outcome.identifier().clone();
                if AssertUnwindSafe(handler.handle(outcome))
                    .catch_unwind()
                    .await
                    .is_err()
                {
                    tracing::error!(identifier = %identifier, "Outcome handler panicked");
                }
                success
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(success) => report.record(success),
                Err(e) => {
                    tracing::error!(error = %e, "Fetch task did not complete");
                    report.record(false);
                }
            }
        }

        tracing::debug!(
            outcomes = report.outcomes,
            succeeded = report.succeeded,
            failed = report.failed,
            "Dispatch complete"
        );
        report
    }
}
