use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Started,
    Completed,
    Error,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub step: String,
    pub status: StepStatus,
    pub timestamp: String,
    #[serde(default)]
    pub data: Value,
}

/// Ordered record of pipeline transitions.
///
/// The in-memory entries are the observability surface returned to callers.
/// When a sink is attached every entry is mirrored to it as a `pipeline_step`
/// event; sink write failures never interrupt the run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    entries: Vec<LogEntry>,
    sink: Option<EventWriter>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(sink: EventWriter) -> Self {
        Self {
            entries: Vec::new(),
            sink: Some(sink),
        }
    }

    pub fn record(&mut self, step: &str, status: StepStatus, data: Value) {
        let entry = LogEntry {
            step: step.to_string(),
            status,
            timestamp: now_utc_iso(),
            data,
        };
        if let Some(sink) = self.sink.as_ref() {
            let mut payload = EventPayload::new();
            payload.insert("step".to_string(), Value::String(entry.step.clone()));
            payload.insert(
                "status".to_string(),
                Value::String(status.as_str().to_string()),
            );
            payload.insert("data".to_string(), entry.data.clone());
            let _ = sink.emit("pipeline_step", payload);
        }
        self.entries.push(entry);
    }

    pub fn started(&mut self, step: &str, data: Value) {
        self.record(step, StepStatus::Started, data);
    }

    pub fn completed(&mut self, step: &str, data: Value) {
        self.record(step, StepStatus::Completed, data);
    }

    pub fn error(&mut self, step: &str, data: Value) {
        self.record(step, StepStatus::Error, data);
    }

    pub fn sink(&self) -> Option<&EventWriter> {
        self.sink.as_ref()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }
}

/// Append-only writer for `events.jsonl`.
///
/// - default fields are `type`, `run_id`, `ts`
/// - caller payload is merged last and can override defaults
/// - one compact JSON object per line
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    run_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                run_id: run_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn run_id(&self) -> &str {
        &self.inner.run_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "run_id".to_string(),
            Value::String(self.inner.run_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            event.insert(key, value);
        }

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&event)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
    }
}

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;
    use serde_json::json;

    use super::*;

    #[test]
    fn emit_writes_compact_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "run-123");

        let mut payload = EventPayload::new();
        payload.insert("text_provider".to_string(), json!("openai"));
        let emitted = writer.emit("run_started", payload)?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], json!("run_started"));
        assert_eq!(parsed["run_id"], json!("run-123"));
        assert_eq!(parsed["text_provider"], json!("openai"));

        let ts = parsed["ts"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn payload_can_override_default_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "run-123");

        let mut payload = EventPayload::new();
        payload.insert("run_id".to_string(), json!("override-run"));
        let emitted = writer.emit("run_started", payload)?;

        assert_eq!(emitted["run_id"], json!("override-run"));
        Ok(())
    }

    #[test]
    fn execution_log_keeps_order_and_mirrors_to_sink() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("events.jsonl");
        let mut log = ExecutionLog::with_sink(EventWriter::new(&path, "run-9"));

        log.started("interpretation", Value::Null);
        log.completed("interpretation", json!({"chars": 42}));
        log.error("titles", json!({"message": "boom"}));

        let steps: Vec<(&str, StepStatus)> = log
            .entries()
            .iter()
            .map(|entry| (entry.step.as_str(), entry.status))
            .collect();
        assert_eq!(
            steps,
            vec![
                ("interpretation", StepStatus::Started),
                ("interpretation", StepStatus::Completed),
                ("titles", StepStatus::Error),
            ]
        );

        let raw = fs::read_to_string(path)?;
        let rows: Vec<Value> = raw
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2]["type"], json!("pipeline_step"));
        assert_eq!(rows[2]["status"], json!("error"));
        assert_eq!(rows[1]["data"]["chars"], json!(42));
        Ok(())
    }

    #[test]
    fn log_entry_serializes_status_lowercase() {
        let mut log = ExecutionLog::new();
        log.completed("final", Value::Null);
        let value = serde_json::to_value(&log.entries()[0]).unwrap();
        assert_eq!(value["status"], json!("completed"));
        assert_eq!(value["step"], json!("final"));
        assert!(value["timestamp"].as_str().is_some());
    }
}
