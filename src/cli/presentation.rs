//! CLI presentation: text and JSON rendering of command results.

use crate::codec::RequestCodec;
use crate::error::ClientError;
use crate::queue::QueueEntry;
use chrono::{DateTime, Utc};
use comfy_table::Table;
use serde::Serialize;

/// One queue entry as shown by `queue list`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueRow {
    pub position: usize,
    pub request_id: String,
    pub operation: Option<String>,
    pub optimistic: bool,
    pub enqueued_at: DateTime<Utc>,
    /// Set when the entry no longer decodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decode_error: Option<String>,
}

impl QueueRow {
    pub fn from_entry(position: usize, entry: &QueueEntry, codec: &dyn RequestCodec) -> Self {
        let mut row = QueueRow {
            position,
            request_id: entry.key.clone(),
            operation: None,
            optimistic: false,
            enqueued_at: entry.enqueued_at,
            decode_error: None,
        };
        match codec.deserialize(&entry.value) {
            Ok(request) => {
                row.operation = request.operation_name().map(str::to_string);
                row.optimistic = request.optimistic_response.is_some();
            }
            Err(e) => row.decode_error = Some(e.to_string()),
        }
        row
    }
}

pub fn format_queue_table(rows: &[QueueRow]) -> String {
    if rows.is_empty() {
        return "Queue is empty".to_string();
    }
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["#", "Request ID", "Operation", "Optimistic", "Enqueued At"]);
    for row in rows {
        let operation = match (&row.operation, &row.decode_error) {
            (_, Some(err)) => format!("<undecodable: {}>", err),
            (Some(name), None) => name.clone(),
            (None, None) => "<anonymous>".to_string(),
        };
        table.add_row(vec![
            row.position.to_string(),
            row.request_id.clone(),
            operation,
            if row.optimistic { "yes" } else { "no" }.to_string(),
            row.enqueued_at.to_rfc3339(),
        ]);
    }
    table.to_string()
}

pub fn format_queue_json(rows: &[QueueRow]) -> Result<String, ClientError> {
    serde_json::to_string_pretty(rows)
        .map_err(|e| ClientError::ConfigError(format!("Failed to render queue: {}", e)))
}
