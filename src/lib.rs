//! # transcript-harvest
//!
//! Bulk export of per-conversation recording transcripts from a REST API
//! into a flat CSV table.
//!
//! ## How a run works
//!
//! - Identifiers are read from the first column of an input table
//! - At most five fetches are in flight at once; transient failures
//!   (429/502/503/504, transport errors) are retried with tiered backoff or
//!   the server's `Retry-After` hint, up to ten times
//! - Successful payloads are buffered and flushed every ten successes; each
//!   transcript message becomes one output row
//! - Whatever is still buffered is flushed when the last fetch completes
//!
//! ## Quick Start
//!
//! ```no_run
//! use transcript_harvest::{Config, Exporter, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.json")?;
//!     let summary = run_with_shutdown(Exporter::new(config)).await?;
//!     println!("{} exported, {} failed", summary.succeeded, summary.failed);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Success buffering and batched flushing
pub mod accumulator;
/// Configuration types
pub mod config;
/// Bounded-parallel fetch dispatch
pub mod dispatcher;
/// Error types
pub mod error;
/// Pipeline wiring
pub mod export;
/// HTTP fetching with retries
pub mod fetcher;
/// Payload flattening into table rows
pub mod flatten;
/// Input table reader
pub mod input;
/// Retry policy and backoff state
pub mod retry;
/// Interrupt handling
pub mod shutdown;
/// Core types
pub mod types;
/// Output table writer
pub mod writer;

// Re-export commonly used types
pub use accumulator::{BatchAccumulator, BatchSink};
pub use config::{BATCH_FLUSH_THRESHOLD, Config, MAX_CONCURRENT_FETCHES};
pub use dispatcher::{BoundedDispatcher, DispatchReport, OutcomeHandler};
pub use error::{Error, Result};
pub use export::Exporter;
pub use fetcher::{FetchStats, HttpTransport, RawResponse, RetryingFetcher, Transport};
pub use retry::{MAX_RETRIES, RetryPolicy};
pub use types::{
    BatchEntry, FailureReason, FetchOutcome, FlatRow, Identifier, RunSummary, TableRow,
};
pub use writer::{CsvBatchSink, TableWriter};

use tokio_util::sync::CancellationToken;

/// Helper function to run an export with graceful signal handling.
///
/// On the first SIGINT/SIGTERM (Ctrl+C elsewhere) no further identifiers are
/// admitted, in-flight fetches finish, and buffered rows are flushed before
/// the summary is returned.
///
/// # Example
///
/// ```no_run
/// use transcript_harvest::{Config, Exporter, run_with_shutdown};
///
/// # async fn example() -> transcript_harvest::Result<()> {
/// let exporter = Exporter::new(Config::load("config.json")?);
/// let summary = run_with_shutdown(exporter).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_with_shutdown(exporter: Exporter) -> Result<RunSummary> {
    let token = CancellationToken::new();
    let listener = shutdown::spawn_signal_listener(token.clone());

    let result = exporter.with_cancellation(token.clone()).run().await;

    // stops the listener if no signal arrived
    token.cancel();
    if let Err(e) = listener.await {
        tracing::warn!(error = %e, "Signal listener did not stop cleanly");
    }
    result
}
