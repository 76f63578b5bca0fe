//! End-to-end export: input table in, flattened transcripts out.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::accumulator::BatchAccumulator;
use crate::config::{BATCH_FLUSH_THRESHOLD, Config, MAX_CONCURRENT_FETCHES};
use crate::dispatcher::{BoundedDispatcher, OutcomeHandler};
use crate::error::Result;
use crate::fetcher::{FetchStats, HttpTransport, RetryingFetcher, Transport};
use crate::input::read_identifiers;
use crate::retry::RetryPolicy;
use crate::types::{BatchEntry, FetchOutcome, RunSummary};
use crate::writer::{CsvBatchSink, TableWriter};

/// Routes each outcome: successes into the accumulator, failures to the log.
struct ExportHandler {
    accumulator: Arc<BatchAccumulator>,
}

#[async_trait::async_trait]
impl OutcomeHandler for ExportHandler {
    async fn handle(&self, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::Success {
                identifier,
                payload,
            } => {
                if let Err(e) = self
                    .accumulator
                    .offer(BatchEntry {
                        identifier,
                        payload,
                    })
                    .await
                {
                    tracing::error!(error = %e, "Batch flush failed, its rows are lost");
                }
            }
            FetchOutcome::Failure { identifier, reason } => {
                tracing::warn!(identifier = %identifier, reason = %reason, "Fetch failed");
            }
        }
    }
}

/// One export run over a validated [`Config`].
///
/// ```no_run
/// use transcript_harvest::{Config, Exporter};
///
/// # async fn run() -> transcript_harvest::Result<()> {
/// let config = Config::load("config.json")?;
/// let summary = Exporter::new(config).run().await?;
/// println!("{} transcripts exported", summary.succeeded);
/// # Ok(())
/// # }
/// ```
pub struct Exporter {
    config: Config,
    transport: Option<Arc<dyn Transport>>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl Exporter {
    /// Exporter using the real HTTP transport and the default retry policy.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            transport: None,
            policy: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the HTTP transport
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replace the retry policy for the whole run
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stop admitting fetches once `token` is cancelled; buffered rows are still flushed.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Settings this exporter runs with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fetch every identifier and append its transcript rows to the output table.
    ///
    /// Returns `Err` only for startup problems (settings, input table, HTTP
    /// client) or a failed final flush. Per-identifier failures are counted in
    /// the summary.
    pub async fn run(&self) -> Result<RunSummary> {
        self.config.validate()?;
        let base_url = self.config.base_url()?;
        let identifiers = read_identifiers(&self.config.input_csv_path).await?;

        let transport: Arc<dyn Transport> = match &self.transport {
            Some(transport) => Arc::clone(transport),
            None => Arc::new(HttpTransport::new()?),
        };
        let stats = Arc::new(FetchStats::default());
        let fetcher = Arc::new(
            RetryingFetcher::new(
                transport,
                base_url,
                self.config.bearer_token.clone(),
                self.policy.clone(),
            )
            .with_stats(Arc::clone(&stats)),
        );

        let sink = Arc::new(CsvBatchSink::new(TableWriter::new(
            &self.config.output_csv_path,
        )));
        let accumulator = Arc::new(BatchAccumulator::new(sink, BATCH_FLUSH_THRESHOLD));
        let handler = Arc::new(ExportHandler {
            accumulator: Arc::clone(&accumulator),
        });

        tracing::info!(
            identifiers = identifiers.len(),
            concurrency = MAX_CONCURRENT_FETCHES,
            output = %self.config.output_csv_path.display(),
            "Starting export"
        );

        let total = identifiers.len();
        let report = BoundedDispatcher::new(MAX_CONCURRENT_FETCHES)
            .with_cancellation(self.cancel.clone())
            .run(fetcher, identifiers, handler)
            .await;

        accumulator.finish().await?;

        let summary = RunSummary {
            identifiers: total,
            succeeded: stats.succeeded(),
            failed: stats.failed(),
            retries: stats.retries(),
            batches_flushed: accumulator.batches_flushed(),
            rows_written: accumulator.rows_written(),
        };
        tracing::info!(
            identifiers = summary.identifiers,
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = report.cancelled,
            retries = summary.retries,
            batches = summary.batches_flushed,
            rows = summary.rows_written,
            "Export finished"
        );
        Ok(summary)
    }
}
