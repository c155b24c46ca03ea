//! Incremental decoder for the `text/event-stream` wire format.
//!
//! Bytes are fed in whatever chunks the transport hands over; complete
//! events come out once their terminating blank line has been seen.

use std::time::Duration;

use tracing::warn;

pub const DEFAULT_EVENT_TYPE: &str = "message";

/// Longest field line kept; the rest of a longer line is discarded.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    // a '\r' ended the previous line; swallow a following '\n'
    after_cr: bool,
    seen_first_line: bool,
    // current line ran past MAX_LINE_BYTES; skip bytes until it ends
    discarding: bool,

    event_type: String,
    data: String,

    last_event_id: Option<String>,
    retry: Option<u64>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every event it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        for &byte in chunk {
            if self.after_cr {
                self.after_cr = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\n' => self.end_line(&mut events),
                b'\r' => {
                    self.after_cr = true;
                    self.end_line(&mut events);
                }
                _ if self.discarding => {}
                _ if self.line.len() >= MAX_LINE_BYTES => {
                    warn!(limit = MAX_LINE_BYTES, "dropping oversized event stream line");
                    self.line.clear();
                    self.discarding = true;
                }
                _ => self.line.push(byte),
            }
        }
        events
    }

    /// Drop any half-received event. The last event id and retry hint survive,
    /// they belong to the subscription rather than the connection.
    pub fn reset_connection(&mut self) {
        self.line.clear();
        self.after_cr = false;
        self.seen_first_line = false;
        self.discarding = false;
        self.event_type.clear();
        self.data.clear();
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Reconnect delay requested by the server, consumed once read.
    pub fn take_retry(&mut self) -> Option<Duration> {
        self.retry.take().map(Duration::from_millis)
    }

    fn end_line(&mut self, events: &mut Vec<SseEvent>) {
        if self.discarding {
            self.discarding = false;
            self.line.clear();
            return;
        }
        let raw = std::mem::take(&mut self.line);
        let decoded = String::from_utf8_lossy(&raw);
        let mut line: &str = &decoded;
        if !self.seen_first_line {
            self.seen_first_line = true;
            line = line.strip_prefix('\u{feff}').unwrap_or(line);
        }

        if line.is_empty() {
            self.dispatch(events);
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event_type = value.to_string(),
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            }
            "id" if !value.contains('\0') => self.last_event_id = Some(value.to_string()),
            "retry" if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) => {
                if let Ok(ms) = value.parse() {
                    self.retry = Some(ms);
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self, events: &mut Vec<SseEvent>) {
        let event_type = std::mem::take(&mut self.event_type);
        if self.data.is_empty() {
            return;
        }
        let mut data = std::mem::take(&mut self.data);
        data.pop();

        events.push(SseEvent {
            event: if event_type.is_empty() {
                DEFAULT_EVENT_TYPE.to_string()
            } else {
                event_type
            },
            data,
            id: self.last_event_id.clone(),
        });
    }
}
