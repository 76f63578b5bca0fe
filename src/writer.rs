//! Append-only CSV output table.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::accumulator::BatchSink;
use crate::error::Result;
use crate::flatten::table_rows;
use crate::types::{BatchEntry, FlatRow, TableRow};

/// Column header, written once when the table is created
pub const HEADER: &str = "entityId,startTime,endTime,eventTimestamp,eventPurpose,eventText";

/// Marker placed in the second column of a diagnostic row
const DIAGNOSTIC_MARKER: &str = "ERROR";

/// Wrap a field in double quotes, doubling any quote inside it.
pub fn quote_field(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Render one row as a CSV line without the trailing newline.
pub fn render_row(row: &TableRow) -> String {
    match row {
        TableRow::Data(FlatRow {
            entity_id,
            start_time,
            end_time,
            event_timestamp,
            event_purpose,
            event_text,
        }) => [
            entity_id,
            start_time,
            end_time,
            event_timestamp,
            event_purpose,
            event_text,
        ]
        .iter()
        .map(|f| quote_field(f))
        .collect::<Vec<_>>()
        .join(","),
        TableRow::Diagnostic {
            identifier,
            message,
        } => [identifier.as_str(), DIAGNOSTIC_MARKER, message.as_str()]
            .iter()
            .map(|f| quote_field(f))
            .collect::<Vec<_>>()
            .join(","),
    }
}

/// Appends rows to the output table, creating it with a header when absent.
///
/// Callers serialize access; the writer itself holds no lock.
#[derive(Clone, Debug)]
pub struct TableWriter {
    path: PathBuf,
}

impl TableWriter {
    /// Writer for the table at `path`. Nothing is touched until the first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Table location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `rows`, returning how many data or diagnostic lines were written.
    ///
    /// The header is written first if the file is missing or empty. An empty
    /// slice still creates the table so the header is present after any flush.
    pub fn append(&self, rows: &[TableRow]) -> Result<usize> {
        let needs_header = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };

        let file: File = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut out = BufWriter::new(file);

        if needs_header {
            writeln!(out, "{HEADER}")?;
        }
        for row in rows {
            writeln!(out, "{}", render_row(row))?;
        }
        out.flush()?;

        tracing::debug!(path = %self.path.display(), rows = rows.len(), "Rows appended");
        Ok(rows.len())
    }
}

/// [`BatchSink`] that flattens each payload and appends the rows in one write.
#[derive(Clone, Debug)]
pub struct CsvBatchSink {
    writer: TableWriter,
}

impl CsvBatchSink {
    /// Sink appending to `writer`'s table
    pub fn new(writer: TableWriter) -> Self {
        Self { writer }
    }
}

impl BatchSink for CsvBatchSink {
    fn write_batch(&self, batch: &[BatchEntry]) -> Result<usize> {
        let mut rows = Vec::new();
        for entry in batch {
            let entry_rows = table_rows(entry);
            if let Some(TableRow::Diagnostic { message, .. }) = entry_rows.first() {
                tracing::warn!(
                    identifier = %entry.identifier,
                    error = %message,
                    "Payload could not be parsed, writing diagnostic row"
                );
            }
            rows.extend(entry_rows);
        }
        self.writer.append(&rows)
    }
}
