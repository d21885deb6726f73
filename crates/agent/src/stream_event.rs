//! Caller-facing streaming events.
//!
//! Every event is one line of JSON on the wire. A turn's stream ends with a
//! `{"done":true}` line and then the `[DONE]` sentinel, so a line-oriented
//! reader knows the turn is over without relying on connection close.

use serde::{Deserialize, Serialize};

/// Events emitted by the agent during one turn.
///
/// - `agent_process`        — narration: a flushed thought, then an action
/// - `final_answer`         — the completed answer
/// - `final_answer_partial` — answer text received so far
/// - `error`                — an unrecoverable failure; the turn is over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum StreamEvent {
    AgentProcess(String),
    FinalAnswer(String),
    FinalAnswerPartial(String),
    Error(String),
}

impl StreamEvent {
    /// Wire name of this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AgentProcess(_) => "agent_process",
            Self::FinalAnswer(_) => "final_answer",
            Self::FinalAnswerPartial(_) => "final_answer_partial",
            Self::Error(_) => "error",
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::AgentProcess(c)
            | Self::FinalAnswer(c)
            | Self::FinalAnswerPartial(c)
            | Self::Error(c) => c,
        }
    }

    /// Whether this event ends the turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FinalAnswer(_) | Self::Error(_))
    }
}

/// Newline-delimited JSON encoding of a turn's event stream.
pub struct EventEncoder;

impl EventEncoder {
    pub const DONE_LINE: &'static str = r#"{"done":true}"#;
    pub const SENTINEL: &'static str = "[DONE]";

    /// One event as a single line, newline included.
    pub fn encode(event: &StreamEvent) -> String {
        let mut line = serde_json::to_string(event).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","content":"unencodable event: {e}"}}"#)
        });
        line.push('\n');
        line
    }

    /// The two trailing lines that close a stream.
    pub fn finish() -> String {
        format!("{}\n{}\n", Self::DONE_LINE, Self::SENTINEL)
    }

    /// A whole stream, terminator included.
    pub fn encode_all<'a>(events: impl IntoIterator<Item = &'a StreamEvent>) -> String {
        let mut out: String = events.into_iter().map(Self::encode).collect();
        out.push_str(&Self::finish());
        out
    }

    /// Parse one wire line back into an event. Terminator lines yield `None`.
    pub fn decode(line: &str) -> Option<StreamEvent> {
        let line = line.trim();
        if line.is_empty() || line == Self::SENTINEL || line == Self::DONE_LINE {
            return None;
        }
        serde_json::from_str(line).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape() {
        let json = serde_json::to_string(&StreamEvent::AgentProcess("look up\n\n".into())).unwrap();
        assert_eq!(json, r#"{"type":"agent_process","content":"look up\n\n"}"#);

        let json = serde_json::to_string(&StreamEvent::FinalAnswerPartial("A an".into())).unwrap();
        assert_eq!(json, r#"{"type":"final_answer_partial","content":"A an"}"#);
    }

    #[test]
    fn encoded_stream_is_line_delimited() {
        let events = vec![
            StreamEvent::AgentProcess("→ viewReportList({})\n".into()),
            StreamEvent::FinalAnswer("A and B".into()),
        ];
        let out = EventEncoder::encode_all(&events);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[2], r#"{"done":true}"#);
        assert_eq!(lines[3], "[DONE]");

        let decoded: Vec<StreamEvent> = lines.iter().filter_map(|l| EventEncoder::decode(l)).collect();
        assert_eq!(decoded, events);
    }

    #[test]
    fn event_type_names() {
        assert_eq!(StreamEvent::Error("x".into()).event_type(), "error");
        assert_eq!(StreamEvent::FinalAnswer("x".into()).event_type(), "final_answer");
        assert!(StreamEvent::Error("x".into()).is_terminal());
        assert!(!StreamEvent::FinalAnswerPartial("x".into()).is_terminal());
    }
}
