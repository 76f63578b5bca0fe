//! Buffers successful fetches and hands them to a [`BatchSink`] in batches.
//!
//! The pending buffer is guarded by a short synchronous lock that only covers
//! push-and-maybe-swap. The flush itself runs outside that lock, serialized by
//! a separate async lock so two batches never interleave their lines.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{Error, Result};
use crate::types::BatchEntry;

/// Destination for flushed batches. Called from a blocking thread.
pub trait BatchSink: Send + Sync + 'static {
    /// Persist one batch, returning the number of lines written.
    fn write_batch(&self, batch: &[BatchEntry]) -> Result<usize>;
}

/// Thread-safe buffer of successes with a size-triggered flush.
pub struct BatchAccumulator {
    pending: Mutex<Vec<BatchEntry>>,
    threshold: usize,
    sink: Arc<dyn BatchSink>,
    flush_lock: tokio::sync::Mutex<()>,
    batches_flushed: AtomicU64,
    rows_written: AtomicU64,
}

impl BatchAccumulator {
    /// Create an accumulator flushing every `threshold` entries (minimum 1).
    pub fn new(sink: Arc<dyn BatchSink>, threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            pending: Mutex::new(Vec::with_capacity(threshold)),
            threshold,
            sink,
            flush_lock: tokio::sync::Mutex::new(()),
            batches_flushed: AtomicU64::new(0),
            rows_written: AtomicU64::new(0),
        }
    }

    /// Buffer one success; flush the buffer if it reached the threshold.
    ///
    /// An `Err` means the triggered flush failed. The entries of that batch are
    /// not retained and will not appear in any later flush.
    pub async fn offer(&self, entry: BatchEntry) -> Result<()> {
        let full = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.push(entry);
            if pending.len() >= self.threshold {
                Some(std::mem::replace(
                    &mut *pending,
                    Vec::with_capacity(self.threshold),
                ))
            } else {
                None
            }
        };

        match full {
            Some(batch) => self.flush(batch).await.map(|_| ()),
            None => Ok(()),
        }
    }

    /// Drain whatever is still buffered. A no-op when the buffer is empty.
    pub async fn finish(&self) -> Result<usize> {
        let remainder = std::mem::take(
            &mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if remainder.is_empty() {
            return Ok(0);
        }
        self.flush(remainder).await
    }

    /// Entries currently buffered
    pub fn pending_len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Batches successfully handed to the sink
    pub fn batches_flushed(&self) -> u64 {
        self.batches_flushed.load(Ordering::Relaxed)
    }

    /// Lines the sink reported writing
    pub fn rows_written(&self) -> u64 {
        self.rows_written.load(Ordering::Relaxed)
    }

    async fn flush(&self, batch: Vec<BatchEntry>) -> Result<usize> {
        let _guard = self.flush_lock.lock().await;
        let entries = batch.len();
        let sink = Arc::clone(&self.sink);

        let rows = tokio::task::spawn_blocking(move || sink.write_batch(&batch))
            .await
            .map_err(|e| Error::Flush {
                message: format!("flush task failed: {e}"),
            })?
            .map_err(|e| {
                tracing::error!(entries, error = %e, "Failed to write batch");
                e
            })?;

        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        self.rows_written.fetch_add(rows as u64, Ordering::Relaxed);
        tracing::info!(entries, rows, "Batch saved");
        Ok(rows)
    }
}
