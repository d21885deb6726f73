//! Terminal rendering of a turn's event stream.

use std::io::{self, Write};

use caseclaw_agent::{EventEncoder, StreamEvent};

/// Prints narration as it arrives and the answer as it grows.
#[derive(Default)]
pub struct PrettyPrinter {
    /// Answer text already written.
    shown: String,
}

impl PrettyPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text to write for this event.
    pub fn render(&mut self, event: &StreamEvent) -> String {
        match event {
            StreamEvent::AgentProcess(text) => text.clone(),
            StreamEvent::FinalAnswerPartial(text) => self.advance(text),
            StreamEvent::FinalAnswer(text) => {
                let mut out = self.advance(text);
                out.push('\n');
                self.shown.clear();
                out
            }
            StreamEvent::Error(message) => format!("\n[error] {message}\n"),
        }
    }

    fn advance(&mut self, text: &str) -> String {
        match text.strip_prefix(self.shown.as_str()) {
            Some(rest) => {
                let rest = rest.to_string();
                self.shown = text.to_string();
                rest
            }
            // Answer diverged from what was shown; restart on a fresh line
            None => {
                self.shown = text.to_string();
                format!("\n{text}")
            }
        }
    }
}

/// Write events to stdout until the stream ends.
pub async fn print_stream(
    rx: &mut tokio::sync::mpsc::Receiver<StreamEvent>,
    raw: bool,
) -> io::Result<Option<String>> {
    let mut stdout = io::stdout();
    let mut printer = PrettyPrinter::new();
    let mut answer = None;

    while let Some(event) = rx.recv().await {
        let text = if raw {
            EventEncoder::encode(&event)
        } else {
            printer.render(&event)
        };
        stdout.write_all(text.as_bytes())?;
        stdout.flush()?;
        if let StreamEvent::FinalAnswer(final_answer) = event {
            answer = Some(final_answer);
        }
    }

    if raw {
        stdout.write_all(EventEncoder::finish().as_bytes())?;
        stdout.flush()?;
    }
    Ok(answer)
}
