//! Core types for transcript-harvest

use serde::{Deserialize, Serialize};

/// Opaque key naming one entity (conversation) to fetch
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Create a new Identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the underlying key
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identifier {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for Identifier {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a fetch ended without a usable payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureReason {
    /// The retry ceiling was exceeded on retryable responses or transport errors
    MaxRetries {
        /// Last status code or transport error message seen
        last: String,
    },
    /// A non-retryable, non-success HTTP status
    Status {
        /// HTTP status code
        code: u16,
        /// Response body as returned by the server
        body: String,
    },
    /// The request for this identifier could not be built
    Request {
        /// Why the request could not be built
        message: String,
    },
    /// The run was interrupted before this identifier was admitted
    Cancelled,
    /// The fetch task panicked; the panic was contained to this identifier
    Panicked,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::MaxRetries { last } => write!(f, "max retries reached - {last}"),
            FailureReason::Status { code, body } => write!(f, "HTTP {code} - {body}"),
            FailureReason::Request { message } => write!(f, "invalid request - {message}"),
            FailureReason::Cancelled => write!(f, "cancelled before dispatch"),
            FailureReason::Panicked => write!(f, "fetch task panicked"),
        }
    }
}

/// Terminal result of one logical fetch. Produced exactly once per identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The API answered with a success status
    Success {
        /// Entity the payload belongs to
        identifier: Identifier,
        /// Raw response body
        payload: String,
    },
    /// The fetch ended without a payload
    Failure {
        /// Entity that failed
        identifier: Identifier,
        /// Failure tag
        reason: FailureReason,
    },
}

impl FetchOutcome {
    /// The identifier this outcome belongs to
    pub fn identifier(&self) -> &Identifier {
        match self {
            FetchOutcome::Success { identifier, .. } | FetchOutcome::Failure { identifier, .. } => {
                identifier
            }
        }
    }

    /// Whether this is a success outcome
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }
}

/// One buffered successful fetch, waiting to be flushed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchEntry {
    /// Entity the payload belongs to
    pub identifier: Identifier,
    /// Raw response body
    pub payload: String,
}

/// One data line of the output table, fields already rendered
///
/// The first row of an entity carries `entity_id`, `start_time` and `end_time`;
/// continuation rows of the same entity leave them empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlatRow {
    /// Entity (conversation) id
    pub entity_id: String,
    /// Entity start time, round-trip ISO-8601
    pub start_time: String,
    /// Entity end time, round-trip ISO-8601
    pub end_time: String,
    /// Message timestamp, round-trip ISO-8601
    pub event_timestamp: String,
    /// Message purpose (e.g. "customer", "agent")
    pub event_purpose: String,
    /// Message text
    pub event_text: String,
}

impl FlatRow {
    /// Whether this row continues the previous entity's group
    pub fn is_continuation(&self) -> bool {
        self.entity_id.is_empty() && self.start_time.is_empty() && self.end_time.is_empty()
    }
}

/// A line destined for the output table
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TableRow {
    /// Regular flattened transcript row
    Data(FlatRow),
    /// Placeholder emitted when a payload could not be parsed
    Diagnostic {
        /// Entity whose payload failed to parse
        identifier: Identifier,
        /// Parser message
        message: String,
    },
}

/// Totals reported at the end of a run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Identifiers read from the input table (duplicates included)
    pub identifiers: usize,
    /// Fetches that ended in success
    pub succeeded: u64,
    /// Fetches that ended in failure
    pub failed: u64,
    /// Retry suspensions performed across all fetches
    pub retries: u64,
    /// Batches flushed to the output table
    pub batches_flushed: u64,
    /// Lines written to the output table (data and diagnostic rows)
    pub rows_written: u64,
}
