//! Incremental parser for the model's two-shape JSON protocol.
//!
//! The model answers with either
//! `{"thought": "...", "action": {"name": "...", "input": {...}}}` or
//! `{"thought": "...", "finish": "..."}`, streamed a few characters at a
//! time. [`StreamParser`] walks each fragment exactly once, tracking the
//! top-level object by hand, so narration and answer text reach the caller
//! while the object is still incomplete.
//!
//! Emission rules:
//! - a `thought` is buffered and only shown once a registered action
//!   follows it; a turn that finishes without an action drops it
//! - an `action` is narrated at most once, and only when its tool exists
//! - `finish` text is decoded as it arrives; every fragment that grows it
//!   yields a `FinalAnswerPartial`, and the closing quote yields the
//!   `FinalAnswer`

use std::collections::HashSet;

use caseclaw_core::tool::ToolCall;
use serde_json::Value;

use crate::stream_event::StreamEvent;

/// Top-level fields whose emission is deduplicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Thought,
    Action,
}

/// What the model asked for in its `action` field.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionRequest {
    /// Well-formed call; the tool may or may not be registered.
    Call(ToolCall),
    /// An `action` value with no usable `name`.
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Str,
    Composite,
    Scalar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ValueScan {
    start: usize,
    kind: ValueKind,
    depth: u32,
    in_string: bool,
    escaped: bool,
}

/// Machine states. `ExpectKey` through `AfterValue` are the inside of the
/// top-level object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingObject,
    ExpectKey,
    InKey { start: usize, escaped: bool },
    ExpectColon,
    ExpectValue,
    InValue(ValueScan),
    AfterValue,
    InsideFinishValue,
    /// The object closed without a `finish`.
    Closed,
    Done,
}

#[derive(Debug, Default)]
struct FinishDecoder {
    escaped: bool,
    unicode: Option<String>,
    high_surrogate: Option<u16>,
}

#[derive(Debug, Default)]
struct ThoughtBuffer {
    content: Option<String>,
    already_streamed: bool,
}

/// Per-iteration parser state. Build a new one for every backend request.
#[derive(Debug)]
pub struct StreamParser {
    registered: HashSet<String>,
    state: State,
    accumulated: String,
    key: String,
    finish_text: String,
    finish: FinishDecoder,
    streamed: HashSet<Field>,
    thought: ThoughtBuffer,
    action: Option<ActionRequest>,
    final_answer: Option<String>,
}

impl StreamParser {
    pub fn new<I, S>(registered_tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            registered: registered_tools.into_iter().map(Into::into).collect(),
            state: State::AwaitingObject,
            accumulated: String::new(),
            key: String::new(),
            finish_text: String::new(),
            finish: FinishDecoder::default(),
            streamed: HashSet::new(),
            thought: ThoughtBuffer::default(),
            action: None,
            final_answer: None,
        }
    }

    /// Feed one fragment and collect the events it completes.
    pub fn step(&mut self, token: &str) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.state == State::Done {
            return events;
        }

        let offset = self.accumulated.len();
        self.accumulated.push_str(token);
        let answer_before = self.finish_text.len();

        for (i, ch) in token.char_indices() {
            self.advance(offset + i, ch, &mut events);
            if self.state == State::Done {
                return events;
            }
        }

        if self.state == State::InsideFinishValue && self.finish_text.len() > answer_before {
            events.push(StreamEvent::FinalAnswerPartial(self.finish_text.clone()));
        }
        events
    }

    /// Everything received this iteration, verbatim.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    pub fn is_complete(&self) -> bool {
        self.final_answer.is_some()
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }

    /// Answer text decoded so far, complete or not.
    pub fn partial_answer(&self) -> &str {
        &self.finish_text
    }

    /// Whether an `action` value closed this iteration, registered or not.
    pub fn action_attempted(&self) -> bool {
        self.streamed.contains(&Field::Action)
    }

    pub fn action(&self) -> Option<&ActionRequest> {
        self.action.as_ref()
    }

    pub fn was_streamed(&self, field: Field) -> bool {
        self.streamed.contains(&field)
    }

    fn advance(&mut self, pos: usize, ch: char, events: &mut Vec<StreamEvent>) {
        match self.state {
            State::AwaitingObject => {
                if ch == '{' {
                    self.state = State::ExpectKey;
                }
            }
            State::ExpectKey => match ch {
                '"' => self.state = State::InKey { start: pos, escaped: false },
                '}' => self.state = State::Closed,
                _ => {}
            },
            State::InKey { start, escaped } => {
                if escaped {
                    self.state = State::InKey { start, escaped: false };
                } else if ch == '\\' {
                    self.state = State::InKey { start, escaped: true };
                } else if ch == '"' {
                    let raw = &self.accumulated[start..pos + 1];
                    self.key = serde_json::from_str(raw).unwrap_or_default();
                    self.state = State::ExpectColon;
                }
            }
            State::ExpectColon => {
                if ch == ':' {
                    self.state = State::ExpectValue;
                }
            }
            State::ExpectValue => {
                if ch.is_whitespace() {
                    return;
                }
                if ch == '"' && self.key == "finish" {
                    self.state = State::InsideFinishValue;
                    return;
                }
                let kind = match ch {
                    '"' => ValueKind::Str,
                    '{' | '[' => ValueKind::Composite,
                    _ => ValueKind::Scalar,
                };
                self.state = State::InValue(ValueScan {
                    start: pos,
                    kind,
                    depth: u32::from(kind == ValueKind::Composite),
                    in_string: kind == ValueKind::Str,
                    escaped: false,
                });
            }
            State::InValue(scan) => self.scan_value(scan, pos, ch, events),
            State::AfterValue => match ch {
                ',' => self.state = State::ExpectKey,
                '}' => self.state = State::Closed,
                _ => {}
            },
            State::InsideFinishValue => self.decode_finish(ch, events),
            State::Closed | State::Done => {}
        }
    }

    fn scan_value(
        &mut self,
        mut scan: ValueScan,
        pos: usize,
        ch: char,
        events: &mut Vec<StreamEvent>,
    ) {
        if scan.kind == ValueKind::Scalar {
            if ch == ',' || ch == '}' || ch.is_whitespace() {
                self.close_value(scan.start, pos, events);
                // The terminator still belongs to the object
                self.advance(pos, ch, events);
            }
            return;
        }

        if scan.in_string {
            if scan.escaped {
                scan.escaped = false;
            } else if ch == '\\' {
                scan.escaped = true;
            } else if ch == '"' {
                scan.in_string = false;
                if scan.kind == ValueKind::Str {
                    self.close_value(scan.start, pos + 1, events);
                    return;
                }
            }
            self.state = State::InValue(scan);
            return;
        }

        match ch {
            '"' => scan.in_string = true,
            '{' | '[' => scan.depth += 1,
            '}' | ']' => {
                scan.depth = scan.depth.saturating_sub(1);
                if scan.depth == 0 {
                    self.close_value(scan.start, pos + 1, events);
                    return;
                }
            }
            _ => {}
        }
        self.state = State::InValue(scan);
    }

    /// A top-level value spanning `accumulated[start..end]` just closed.
    fn close_value(&mut self, start: usize, end: usize, events: &mut Vec<StreamEvent>) {
        self.state = State::AfterValue;
        let Ok(value) = serde_json::from_str::<Value>(&self.accumulated[start..end]) else {
            return;
        };

        let key = std::mem::take(&mut self.key);
        match key.as_str() {
            "thought" if !self.streamed.contains(&Field::Action) => {
                self.thought.content = Some(display_value(&value));
            }
            "action" if !self.streamed.contains(&Field::Action) => {
                self.streamed.insert(Field::Action);
                let request = decode_action(value);
                if let ActionRequest::Call(call) = &request {
                    if self.registered.contains(&call.name) {
                        self.flush_thought(events);
                        events.push(StreamEvent::AgentProcess(format!(
                            "→ {}({})\n",
                            call.name,
                            display_input(&call.input)
                        )));
                    }
                }
                self.action = Some(request);
            }
            // Non-string answers are accepted as their JSON text
            "finish" => {
                self.finish_text = display_value(&value);
                self.complete(events);
            }
            _ => {}
        }
    }

    fn flush_thought(&mut self, events: &mut Vec<StreamEvent>) {
        if self.thought.already_streamed {
            return;
        }
        if let Some(thought) = &self.thought.content {
            events.push(StreamEvent::AgentProcess(format!("{thought}\n\n")));
            self.thought.already_streamed = true;
            self.streamed.insert(Field::Thought);
        }
    }

    fn complete(&mut self, events: &mut Vec<StreamEvent>) {
        self.final_answer = Some(self.finish_text.clone());
        events.push(StreamEvent::FinalAnswer(self.finish_text.clone()));
        self.state = State::Done;
    }

    fn decode_finish(&mut self, ch: char, events: &mut Vec<StreamEvent>) {
        if let Some(digits) = self.finish.unicode.as_mut() {
            digits.push(ch);
            if digits.len() == 4 {
                let code = u16::from_str_radix(digits, 16).ok();
                self.finish.unicode = None;
                self.push_code_unit(code);
            }
            return;
        }

        if self.finish.escaped {
            self.finish.escaped = false;
            let decoded = match ch {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                'b' => '\u{8}',
                'f' => '\u{c}',
                'u' => {
                    self.finish.unicode = Some(String::with_capacity(4));
                    return;
                }
                other => other,
            };
            self.push_answer_char(decoded);
            return;
        }

        match ch {
            '\\' => self.finish.escaped = true,
            '"' => {
                self.flush_dangling_surrogate();
                self.complete(events);
            }
            other => self.push_answer_char(other),
        }
    }

    fn push_answer_char(&mut self, ch: char) {
        self.flush_dangling_surrogate();
        self.finish_text.push(ch);
    }

    fn push_code_unit(&mut self, code: Option<u16>) {
        let Some(code) = code else {
            self.push_answer_char(char::REPLACEMENT_CHARACTER);
            return;
        };
        match (self.finish.high_surrogate.take(), code) {
            (Some(high), 0xDC00..=0xDFFF) => {
                let combined =
                    0x10000 + ((u32::from(high) - 0xD800) << 10) + (u32::from(code) - 0xDC00);
                self.finish_text
                    .push(char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            (high, 0xD800..=0xDBFF) => {
                if high.is_some() {
                    self.finish_text.push(char::REPLACEMENT_CHARACTER);
                }
                self.finish.high_surrogate = Some(code);
            }
            (high, code) => {
                if high.is_some() {
                    self.finish_text.push(char::REPLACEMENT_CHARACTER);
                }
                self.finish_text.push(
                    char::from_u32(u32::from(code)).unwrap_or(char::REPLACEMENT_CHARACTER),
                );
            }
        }
    }

    fn flush_dangling_surrogate(&mut self) {
        if self.finish.high_surrogate.take().is_some() {
            self.finish_text.push(char::REPLACEMENT_CHARACTER);
        }
    }
}

fn decode_action(value: Value) -> ActionRequest {
    let raw = value.to_string();
    let Value::Object(mut map) = value else {
        return ActionRequest::Malformed(raw);
    };
    match map.remove("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => {
            let input = map.remove("input").unwrap_or(Value::Null);
            ActionRequest::Call(ToolCall::new(name.trim(), input))
        }
        _ => ActionRequest::Malformed(raw),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn display_input(input: &Value) -> String {
    match input {
        Value::Object(map) if map.is_empty() => "{}".to_string(),
        other => other.to_string(),
    }
}
