//! Common test utilities for transcript-harvest integration tests

use std::path::Path;
use std::time::Duration;

use transcript_harvest::{Config, RetryPolicy};

/// Bearer token the mock server expects
pub const TEST_TOKEN: &str = "test-token";

/// Retry policy with millisecond tiers so retry scenarios finish quickly
pub fn fast_retry_policy() -> RetryPolicy {
    RetryPolicy {
        first_tier_delay: Duration::from_millis(10),
        second_tier_delay: Duration::from_millis(20),
        final_tier_delay: Duration::from_millis(30),
        ..RetryPolicy::default()
    }
}

/// Write `identifiers` as an input table under `dir` and point a config at `base_url`.
pub fn write_config(dir: &Path, base_url: &str, identifiers: &[&str]) -> Config {
    let input = dir.join("conversations.csv");
    let mut table = String::from("ConversationId,Queue\n");
    for id in identifiers {
        table.push_str(id);
        table.push_str(",support\n");
    }
    std::fs::write(&input, table).expect("write input table");

    Config {
        input_csv_path: input,
        output_csv_path: dir.join("transcripts.csv"),
        bearer_token: TEST_TOKEN.to_string(),
        base_api_url: base_url.to_string(),
    }
}

/// Recording payload for one conversation with the given message texts
pub fn recordings_payload(conversation_id: &str, messages: &[&str]) -> String {
    let transcript: Vec<serde_json::Value> = messages
        .iter()
        .enumerate()
        .map(|(i, text)| {
            serde_json::json!({
                "timestamp": format!("2024-03-01T10:15:{:02}Z", 30 + i),
                "purpose": if i % 2 == 0 { "customer" } else { "agent" },
                "messageText": text,
            })
        })
        .collect();

    serde_json::json!([{
        "id": format!("rec-{conversation_id}"),
        "conversationId": conversation_id,
        "startTime": "2024-03-01T10:15:00Z",
        "endTime": "2024-03-01T10:30:00Z",
        "messagingTranscript": transcript,
    }])
    .to_string()
}

/// Resource path the exporter requests for `conversation_id`
pub fn recordings_path(conversation_id: &str) -> String {
    format!("/api/v2/conversations/{conversation_id}/recordings")
}

/// Output table lines, header included
pub fn output_lines(config: &Config) -> Vec<String> {
    std::fs::read_to_string(&config.output_csv_path)
        .expect("read output table")
        .lines()
        .map(str::to_string)
        .collect()
}
