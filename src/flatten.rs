//! Turns one recordings payload into flat output rows.
//!
//! Pure: no I/O, no logging. Field names are matched case-insensitively by
//! lower-casing every object key before typed deserialization.

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::types::{BatchEntry, FlatRow, TableRow};

/// Recording entry as returned by the API; only the consumed fields
#[derive(Debug, Deserialize)]
struct EntityRecord {
    #[serde(rename = "conversationid", default)]
    conversation_id: Option<String>,
    #[serde(rename = "starttime", default, deserialize_with = "lenient_datetime")]
    start_time: Option<DateTime<Utc>>,
    #[serde(rename = "endtime", default, deserialize_with = "lenient_datetime")]
    end_time: Option<DateTime<Utc>>,
    #[serde(rename = "messagingtranscript", default)]
    messaging_transcript: Option<Vec<TranscriptMessage>>,
}

#[derive(Debug, Deserialize)]
struct TranscriptMessage {
    #[serde(default, deserialize_with = "lenient_datetime")]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    purpose: Option<String>,
    #[serde(rename = "messagetext", default)]
    message_text: Option<String>,
}

/// Accept RFC 3339 timestamps, and offset-less ones as UTC.
fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(|e| serde::de::Error::custom(format!("invalid date-time '{raw}': {e}")))
}

/// Round-trip form with seven fractional digits, e.g. `2024-03-01T10:15:30.1230000Z`.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    let ticks = (dt.nanosecond() % 1_000_000_000) / 100;
    format!("{}.{ticks:07}Z", dt.format("%Y-%m-%dT%H:%M:%S"))
}

fn render(dt: Option<&DateTime<Utc>>) -> String {
    dt.map(format_timestamp).unwrap_or_default()
}

fn lowercase_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k.to_lowercase(), lowercase_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(lowercase_keys).collect()),
        other => other,
    }
}

/// Flatten one payload.
///
/// Empty or whitespace-only payloads and a JSON `null` give zero rows. Entities
/// without messages are skipped. Each message yields one row; only the first
/// row of an entity carries the entity id and times.
pub fn flatten(payload: &str) -> serde_json::Result<Vec<FlatRow>> {
    if payload.trim().is_empty() {
        return Ok(Vec::new());
    }

    let value = lowercase_keys(serde_json::from_str::<Value>(payload)?);
    let records: Option<Vec<EntityRecord>> = serde_json::from_value(value)?;

    let mut rows = Vec::new();
    for record in records.unwrap_or_default() {
        let messages = record.messaging_transcript.unwrap_or_default();
        for (index, message) in messages.into_iter().enumerate() {
            let mut row = FlatRow {
                event_timestamp: render(message.timestamp.as_ref()),
                event_purpose: message.purpose.unwrap_or_default(),
                event_text: message.message_text.unwrap_or_default(),
                ..FlatRow::default()
            };
            if index == 0 {
                row.entity_id = record.conversation_id.clone().unwrap_or_default();
                row.start_time = render(record.start_time.as_ref());
                row.end_time = render(record.end_time.as_ref());
            }
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Rows for one buffered success, with a diagnostic row in place of a parse failure.
pub fn table_rows(entry: &BatchEntry) -> Vec<TableRow> {
    match flatten(&entry.payload) {
        Ok(rows) => rows.into_iter().map(TableRow::Data).collect(),
        Err(e) => vec![TableRow::Diagnostic {
            identifier: entry.identifier.clone(),
            message: e.to_string(),
        }],
    }
}
