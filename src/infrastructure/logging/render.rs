//! Sink-specific renderers for enriched records

use serde_json::Value;

use crate::domain::{EventRecord, MESSAGE_KEY};

/// Turns an enriched record into one line of sink output
pub trait Renderer: Send + Sync {
    fn render(&self, record: &EventRecord) -> String;
}

/// Single-line JSON, keys in pipeline order
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn render(&self, record: &EventRecord) -> String {
        serde_json::to_string(record.fields()).unwrap_or_else(|e| {
            format!(
                "{{\"message\":\"unrenderable event\",\"level\":\"error\",\"error\":{:?}}}",
                e.to_string()
            )
        })
    }
}

/// Human-readable renderer for interactive terminals.
///
/// `<timestamp> [<level>] <message> key=value ...` followed by stack and
/// exception text on their own lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleRenderer;

const LEVEL_WIDTH: usize = 9;
const MESSAGE_WIDTH: usize = 30;
const HEADER_KEYS: [&str; 5] = ["timestamp", "level", MESSAGE_KEY, "stack", "exception"];

impl Renderer for ConsoleRenderer {
    fn render(&self, record: &EventRecord) -> String {
        let mut line = String::new();

        if let Some(timestamp) = record.get_str("timestamp") {
            line.push_str(timestamp);
            line.push(' ');
        }

        if let Some(level) = record.get_str("level") {
            line.push_str(&format!("[{:<width$}] ", level, width = LEVEL_WIDTH));
        }

        let message = record
            .get(MESSAGE_KEY)
            .map(display_value)
            .unwrap_or_default();
        line.push_str(&format!("{:<width$}", message, width = MESSAGE_WIDTH));

        let mut extras: Vec<(&String, &Value)> = record
            .iter()
            .filter(|(key, _)| !HEADER_KEYS.contains(&key.as_str()))
            .collect();
        extras.sort_by(|a, b| a.0.cmp(b.0));

        for (key, value) in extras {
            line.push(' ');
            line.push_str(key);
            line.push('=');
            line.push_str(&display_value(value));
        }

        let mut line = line.trim_end().to_string();

        for key in ["stack", "exception"] {
            if let Some(text) = record.get(key) {
                line.push('\n');
                line.push_str(&display_value(text));
            }
        }

        line
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> EventRecord {
        let mut record = EventRecord::new();
        record.insert("message", "console output");
        record.insert("level", "info");
        record.insert("timestamp", "2026-01-01T00:00:00.000000Z");
        record.insert("service", "orders-api");
        record.insert("attempt", 2);
        record
    }

    #[test]
    fn test_json_renderer_emits_single_line_object() {
        let rendered = JsonRenderer.render(&record());

        assert!(!rendered.contains('\n'));
        let parsed: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["message"], "console output");
        assert_eq!(parsed["attempt"], 2);
    }

    #[test]
    fn test_json_renderer_keeps_key_order() {
        let rendered = JsonRenderer.render(&record());

        assert!(rendered.starts_with("{\"message\":\"console output\",\"level\":\"info\""));
    }

    #[test]
    fn test_console_renderer_is_not_json() {
        let rendered = ConsoleRenderer.render(&record());

        assert!(!rendered.trim_start().starts_with('{'));
        assert!(rendered.starts_with("2026-01-01T00:00:00.000000Z [info     ] console output"));
        assert!(rendered.ends_with("attempt=2 service=orders-api"));
    }

    #[test]
    fn test_console_renderer_appends_exception() {
        let mut record = record();
        record.insert("exception", "connection refused");

        let rendered = ConsoleRenderer.render(&record);

        assert!(rendered.ends_with("\nconnection refused"));
        assert!(!rendered.contains("exception="));
    }
}
