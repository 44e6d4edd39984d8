//! Server-sent event framing shared by the streamable HTTP and legacy SSE transports.
//!
//! Both transports read a byte stream, buffer it, and split on blank-line event
//! boundaries; only the interpretation of the parsed fields differs (the streamable
//! client distinguishes an `endpoint` event from a `message` event, the legacy client
//! treats everything as an unsolicited message). Keeping the framing in one place means
//! a parsing fix lands for both.

use std::time::Duration;

/// One parsed SSE event. `data` is the joined, unescaped payload; per the SSE spec
/// multiple `data:` lines are joined with `\n` before interpretation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
    pub retry_ms: Option<u64>,
}

impl SseEvent {
    pub fn has_data(&self) -> bool {
        !self.data.trim().is_empty()
    }

    pub fn retry_interval(&self) -> Option<Duration> {
        self.retry_ms.map(Duration::from_millis)
    }
}

/// Parse a single blank-line-delimited event block (no trailing blank line).
pub fn parse_event(block: &str) -> SseEvent {
    let mut event = SseEvent::default();
    let mut data_lines = Vec::new();

    for line in block.lines() {
        if line.is_empty() {
            continue;
        }
        let Some(colon) = line.find(':') else {
            continue;
        };
        let field = &line[..colon];
        let value = line[colon + 1..].trim_start();

        match field {
            "event" => event.event = Some(value.to_string()),
            "data" => data_lines.push(value.to_string()),
            "id" => event.id = Some(value.to_string()),
            "retry" => event.retry_ms = value.parse().ok(),
            _ => {}
        }
    }

    event.data = data_lines.join("\n");
    event
}

/// Drain every complete event out of `buffer`, leaving a trailing partial event (if
/// any) for the next chunk to complete.
pub fn drain_events(buffer: &mut String) -> Vec<SseEvent> {
    let mut events = Vec::new();
    while let Some(pos) = buffer.find("\n\n") {
        let block = buffer[..pos].to_string();
        *buffer = buffer.split_off(pos + 2);
        events.push(parse_event(&block));
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_endpoint_event_with_id() {
        let event = parse_event("event: endpoint\ndata: {\"uri\":\"/mcp/123\"}\nid: 1");
        assert_eq!(event.event.as_deref(), Some("endpoint"));
        assert_eq!(event.data, r#"{"uri":"/mcp/123"}"#);
        assert_eq!(event.id.as_deref(), Some("1"));
    }

    #[test]
    fn joins_multiple_data_lines() {
        let event = parse_event("data: line one\ndata: line two");
        assert_eq!(event.data, "line one\nline two");
    }

    #[test]
    fn empty_data_event_reports_no_data() {
        let event = parse_event("id: 7");
        assert!(!event.has_data());
        assert_eq!(event.id.as_deref(), Some("7"));
    }

    #[test]
    fn drain_events_leaves_partial_tail() {
        let mut buffer = "data: a\n\ndata: b\n\ndata: c".to_string();
        let events = drain_events(&mut buffer);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "a");
        assert_eq!(events[1].data, "b");
        assert_eq!(buffer, "data: c");
    }

    #[test]
    fn retry_field_parses_as_milliseconds() {
        let event = parse_event("retry: 2500\ndata: x");
        assert_eq!(event.retry_interval(), Some(Duration::from_millis(2500)));
    }
}
