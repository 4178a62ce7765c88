use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::Formatter;
use crate::error::RemoteError;

/// One formatter call captured by a [`RecordingFormatter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormatterEvent {
    Header {
        command: String,
    },
    NormalLine {
        prefix: String,
        line: String,
    },
    ErrorLine {
        prefix: String,
        line: String,
    },
    Footer {
        duration_ms: u64,
        #[serde(default)]
        error: Option<String>,
    },
}

/// A recorded event with its wall-clock timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FormatterRecord {
    pub ts_ms: u64,
    pub event: FormatterEvent,
}

/// In-memory formatter that keeps every event in call order.
///
/// Clones share the same buffer, so one clone can be handed to the engine
/// while another is inspected afterwards.
#[derive(Debug, Clone, Default)]
pub struct RecordingFormatter {
    records: Arc<Mutex<Vec<FormatterRecord>>>,
}

impl RecordingFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<FormatterRecord>> {
        // A panic while holding the lock leaves the vector intact.
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, event: FormatterEvent) {
        self.lock().push(FormatterRecord {
            ts_ms: now_ms(),
            event,
        });
    }

    /// Snapshot of all recorded events.
    pub fn events(&self) -> Vec<FormatterEvent> {
        self.lock().iter().map(|r| r.event.clone()).collect()
    }

    /// Snapshot of all records including timestamps.
    pub fn records(&self) -> Vec<FormatterRecord> {
        self.lock().clone()
    }

    /// Lines passed to `normal_line`, in order.
    pub fn normal_lines(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|r| match &r.event {
                FormatterEvent::NormalLine { line, .. } => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    /// Lines passed to `error_line`, in order.
    pub fn error_lines(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|r| match &r.event {
                FormatterEvent::ErrorLine { line, .. } => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    /// Clears all recorded events.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Export records as JSONL.
    pub fn to_jsonl(&self) -> Result<String, RemoteError> {
        let records = self.records();
        let mut lines = Vec::with_capacity(records.len());
        for record in records {
            lines.push(serde_json::to_string(&record)?);
        }
        Ok(lines.join("\n"))
    }

    /// Restore a recorder from JSONL lines.
    pub fn from_jsonl(jsonl: &str) -> Result<Self, RemoteError> {
        let recorder = Self::new();
        let mut parsed = Vec::new();
        for line in jsonl.lines() {
            if line.trim().is_empty() {
                continue;
            }
            parsed.push(serde_json::from_str::<FormatterRecord>(line)?);
        }
        *recorder.lock() = parsed;
        Ok(recorder)
    }
}

impl Formatter for RecordingFormatter {
    fn header(&self, command: &str) {
        self.push(FormatterEvent::Header {
            command: command.to_string(),
        });
    }

    fn normal_line(&self, prefix: &str, line: &str) {
        self.push(FormatterEvent::NormalLine {
            prefix: prefix.to_string(),
            line: line.to_string(),
        });
    }

    fn error_line(&self, prefix: &str, line: &str) {
        self.push(FormatterEvent::ErrorLine {
            prefix: prefix.to_string(),
            line: line.to_string(),
        });
    }

    fn footer(&self, duration: Duration, error: Option<&RemoteError>) {
        self.push(FormatterEvent::Footer {
            duration_ms: duration.as_millis() as u64,
            error: error.map(|e| e.to_string()),
        });
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_one_buffer() {
        let recorder = RecordingFormatter::new();
        let handle = recorder.clone();
        handle.header("uptime");
        handle.normal_line("p :", "up 3 days");
        handle.error_line("p :", "warning");

        assert_eq!(recorder.normal_lines(), vec!["up 3 days".to_string()]);
        assert_eq!(recorder.error_lines(), vec!["warning".to_string()]);
        assert_eq!(recorder.events().len(), 3);
    }

    #[test]
    fn recorder_jsonl_roundtrip() {
        let recorder = RecordingFormatter::new();
        recorder.header("id");
        recorder.footer(
            Duration::from_millis(12),
            Some(&RemoteError::Transfer("short copy".to_string())),
        );

        let jsonl = recorder.to_jsonl().expect("encode jsonl");
        assert!(jsonl.contains(r#""kind":"footer""#));

        let restored = RecordingFormatter::from_jsonl(&jsonl).expect("decode jsonl");
        let events = restored.events();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            FormatterEvent::Footer {
                duration_ms: 12,
                error: Some("transfer failed: short copy".to_string()),
            }
        );
    }

    #[test]
    fn footer_error_defaults_to_none() {
        let restored = RecordingFormatter::from_jsonl(
            r#"{"ts_ms":1,"event":{"kind":"footer","duration_ms":5}}"#,
        )
        .expect("decode");
        assert_eq!(
            restored.events(),
            vec![FormatterEvent::Footer {
                duration_ms: 5,
                error: None
            }]
        );
    }

    #[test]
    fn recorded_session_survives_export_and_reload() {
        let recorder = RecordingFormatter::new();
        recorder.header("true");
        recorder.normal_line("p :", "ok");
        recorder.footer(Duration::from_millis(3), None);

        let restored =
            RecordingFormatter::from_jsonl(&recorder.to_jsonl().expect("export")).expect("reload");

        assert_eq!(restored.events(), recorder.events());
        let stamps: Vec<u64> = restored.records().iter().map(|r| r.ts_ms).collect();
        let original: Vec<u64> = recorder.records().iter().map(|r| r.ts_ms).collect();
        assert_eq!(stamps, original);
        assert!(stamps.iter().all(|ts| *ts > 0));
    }

    #[test]
    fn malformed_recording_is_a_json_error() {
        let err = RecordingFormatter::from_jsonl("{\"ts_ms\":1}").expect_err("no event");
        assert!(matches!(err, RemoteError::Json(_)));
        assert!(err.to_string().starts_with("invalid JSON document"));
    }
}
