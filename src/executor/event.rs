// src/executor/event.rs

//! Stream events and their wire form
//!
//! Each event travels as one Server-Sent Events record:
//!
//! ```text
//! event: output
//! data: {"type":"output","data":"==> Installing zlib","timestamp":1718000000.25}
//!
//! ```
//!
//! The `complete` event also carries the outcome fields (`success`,
//! `exit_code`, `elapsed_secs`, `install_digest`, `error_tail`,
//! `diagnostic`, `build_log`).

use crate::executor::line::LineBuffer;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Event kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Start,
    Output,
    Error,
    Complete,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Output => "output",
            Self::Error => "error",
            Self::Complete => "complete",
        }
    }
}

/// Terminal fields of a `complete` event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub elapsed_secs: f64,
    /// Content-addressed identifier of the installed spec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_digest: Option<String>,
    /// Last lines of output, on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_tail: Option<String>,
    /// Why the process did not run to completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    /// Tail of the build log the tool pointed to, on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_log: Option<String>,
}

/// One record of an invocation's event sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub data: String,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    #[serde(flatten)]
    pub outcome: Option<Outcome>,
}

impl StreamEvent {
    fn now(kind: EventKind, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: data.into(),
            timestamp: Utc::now().timestamp_micros() as f64 / 1_000_000.0,
            outcome: None,
        }
    }

    pub fn start(data: impl Into<String>) -> Self {
        Self::now(EventKind::Start, data)
    }

    pub fn output(line: impl Into<String>) -> Self {
        Self::now(EventKind::Output, line)
    }

    pub fn error(line: impl Into<String>) -> Self {
        Self::now(EventKind::Error, line)
    }

    pub fn complete(data: impl Into<String>, outcome: Outcome) -> Self {
        let mut event = Self::now(EventKind::Complete, data);
        event.outcome = Some(outcome);
        event
    }

    pub fn is_complete(&self) -> bool {
        self.kind == EventKind::Complete
    }

    /// Success flag of a `complete` event
    pub fn success(&self) -> Option<bool> {
        self.outcome.as_ref().map(|o| o.success)
    }

    /// Compact JSON for an SSE `data:` field
    pub fn to_json(&self) -> String {
        // Every field is a plain string, number or bool
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"type":"{}","data":"","timestamp":{}}}"#,
                self.kind.as_str(),
                self.timestamp
            )
        })
    }

    /// Full SSE record, terminated by a blank line
    pub fn to_sse(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.kind.as_str(), self.to_json())
    }
}

/// Client-side decoder for an SSE byte stream
///
/// Feed raw response chunks in any size; get back whole events. Comments,
/// `event:` lines and keep-alives are skipped. Records are never split,
/// however long; the executor bounds what it puts in them.
#[derive(Debug)]
pub struct EventDecoder {
    lines: LineBuffer,
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self {
            lines: LineBuffer::unbounded(),
        }
    }
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>, serde_json::Error> {
        let mut events = Vec::new();
        for line in self.lines.push(chunk) {
            if let Some(event) = decode_line(&line)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Decode whatever is left once the stream has ended
    pub fn finish(&mut self) -> Result<Option<StreamEvent>, serde_json::Error> {
        match self.lines.finish() {
            Some(line) => decode_line(&line),
            None => Ok(None),
        }
    }
}

fn decode_line(line: &str) -> Result<Option<StreamEvent>, serde_json::Error> {
    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let payload = payload.strip_prefix(' ').unwrap_or(payload);
    if payload.trim().is_empty() || !payload.trim_start().starts_with('{') {
        return Ok(None);
    }
    serde_json::from_str(payload).map(Some)
}
