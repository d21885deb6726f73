//! Scripted streaming provider for driving the agent loop in tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use caseclaw_core::error::ProviderError;
use caseclaw_core::message::Message;
use caseclaw_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk,
};
use tokio::sync::mpsc;

/// What one `stream()` call produces.
#[derive(Debug, Clone)]
pub enum Script {
    /// Send each fragment, then the terminal marker.
    Fragments(Vec<String>),
    /// Send the fragments, then fail mid-stream.
    FailAfter(Vec<String>, ProviderError),
    /// Refuse to open the stream.
    Refuse(ProviderError),
    /// Open the stream and never send anything.
    Stall,
}

impl Script {
    /// The whole text as one fragment.
    pub fn text(text: &str) -> Self {
        Self::Fragments(vec![text.to_string()])
    }

    /// The text split into fragments of `size` characters.
    pub fn chunked(text: &str, size: usize) -> Self {
        let chars: Vec<char> = text.chars().collect();
        Self::Fragments(
            chars
                .chunks(size.max(1))
                .map(|c| c.iter().collect())
                .collect(),
        )
    }

    /// A stream that ends without any content.
    pub fn empty() -> Self {
        Self::Fragments(vec![])
    }
}

/// A provider that replays scripted responses, one per `stream()` call.
///
/// Once the queue is drained the last script repeats. Every request is
/// recorded so tests can inspect the conversation the loop sent.
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    last: Mutex<Option<Script>>,
    requests: Mutex<Vec<ProviderRequest>>,
    stalled: Mutex<Vec<mpsc::Sender<Result<StreamChunk, ProviderError>>>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            stalled: Mutex::new(Vec::new()),
        }
    }

    /// Every call gets the same script.
    pub fn repeating(script: Script) -> Self {
        let provider = Self::new(vec![]);
        *provider.last.lock().unwrap() = Some(script);
        provider
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Messages of the n-th request (0-based).
    pub fn messages(&self, call: usize) -> Vec<Message> {
        self.requests.lock().unwrap()[call].messages.clone()
    }

    /// Stalled streams whose receiver is still alive.
    pub fn open_streams(&self) -> usize {
        self.stalled
            .lock()
            .unwrap()
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    fn next_script(&self) -> Script {
        let next = self.scripts.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(script) => {
                *last = Some(script.clone());
                script
            }
            None => last.clone().unwrap_or_else(Script::empty),
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        let text = match self.next_script() {
            Script::Fragments(parts) | Script::FailAfter(parts, _) => parts.concat(),
            Script::Refuse(err) => return Err(err),
            Script::Stall => String::new(),
        };
        Ok(ProviderResponse {
            message: Message::assistant(text),
            usage: None,
            model,
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let (tx, rx) = mpsc::channel(64);

        let (parts, failure) = match self.next_script() {
            Script::Refuse(err) => return Err(err),
            Script::Stall => {
                self.stalled.lock().unwrap().push(tx);
                return Ok(rx);
            }
            Script::Fragments(parts) => (parts, None),
            Script::FailAfter(parts, err) => (parts, Some(err)),
        };

        tokio::spawn(async move {
            for part in parts {
                if tx.send(Ok(StreamChunk::text(part))).await.is_err() {
                    return;
                }
            }
            let last = match failure {
                Some(err) => Err(err),
                None => Ok(StreamChunk::finished()),
            };
            let _ = tx.send(last).await;
        });
        Ok(rx)
    }
}
