//! The agent reasoning loop implementation.

use std::sync::Arc;
use std::time::Duration;

use caseclaw_config::AppConfig;
use caseclaw_core::error::ProviderError;
use caseclaw_core::event::{DomainEvent, EventBus};
use caseclaw_core::message::Message;
use caseclaw_core::provider::{Provider, ProviderRequest};
use caseclaw_tools::ToolDispatcher;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::parser::{ActionRequest, StreamParser};
use crate::prompt;
use crate::session::SessionStore;
use crate::stream_event::StreamEvent;

const EVENT_BUFFER: usize = 64;

/// Stand-in deadline for timeouts too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// One operator question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub prompt: String,
    /// Opaque caller-chosen id; `None` means no history in or out
    pub session_id: Option<String>,
    /// Report the question is about; injected as `job_name` into tool calls
    pub dataset_id: Option<String>,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            session_id: None,
            dataset_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_dataset(mut self, dataset_id: impl Into<String>) -> Self {
        self.dataset_id = Some(dataset_id.into());
        self
    }
}

/// Everything a finished turn produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Final answer, absent when the turn failed or was cancelled
    pub answer: Option<String>,
    /// Every event, in emission order
    pub events: Vec<StreamEvent>,
    pub iterations: u32,
    pub tool_calls: u32,
    pub truncated: bool,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct TurnSummary {
    answer: Option<String>,
    iterations: u32,
    tool_calls: u32,
    truncated: bool,
    error: Option<String>,
}

enum IterationError {
    /// The caller went away.
    Cancelled,
    Provider(ProviderError),
}

/// The core agent loop: stream, parse, act, repeat.
#[derive(Clone)]
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// Routes and validates tool calls
    dispatcher: ToolDispatcher,

    /// Per-session question/answer history
    sessions: Arc<SessionStore>,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Default max tokens per response
    max_tokens: Option<u32>,

    /// Backend requests per turn
    max_iterations: u32,

    /// Iterations before the protocol reminder starts
    reinforce_after: u32,

    /// Deadline for one streamed response
    stream_timeout: Duration,

    /// Operator rules appended to the system prompt
    rules: Vec<String>,
}

impl AgentLoop {
    /// Create a new agent loop with default limits.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        dispatcher: ToolDispatcher,
        sessions: Arc<SessionStore>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            sessions,
            event_bus,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            max_iterations: 50,
            reinforce_after: 3,
            stream_timeout: Duration::from_secs(300),
            rules: vec![],
        }
    }

    /// Create an agent loop using the model and `[agent]` settings of a config.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        dispatcher: ToolDispatcher,
        sessions: Arc<SessionStore>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let mut agent = Self::new(provider, &config.model, dispatcher, sessions, event_bus)
            .with_temperature(config.temperature)
            .with_max_iterations(config.agent.max_iterations)
            .with_reinforce_after(config.agent.reinforce_after)
            .with_stream_timeout(Duration::from_secs(config.agent.stream_timeout_secs))
            .with_rules(config.agent.rules.clone());
        agent.max_tokens = config.max_tokens;
        agent
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the maximum number of backend requests per turn.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_reinforce_after(mut self, iterations: u32) -> Self {
        self.reinforce_after = iterations;
        self
    }

    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    pub fn with_rules(mut self, rules: Vec<String>) -> Self {
        self.rules = rules;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// Run a turn on its own task. Dropping the receiver cancels the turn.
    pub fn run_stream(&self, request: ChatRequest) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let agent = self.clone();
        tokio::spawn(async move {
            agent.drive(request, &tx).await;
        });
        rx
    }

    /// Run a turn to completion and collect its events.
    pub async fn run(&self, request: ChatRequest) -> TurnOutcome {
        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
        let drive = async move {
            let summary = self.drive(request, &tx).await;
            drop(tx);
            summary
        };
        let collect = async {
            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }
            events
        };
        let (summary, events) = tokio::join!(drive, collect);

        TurnOutcome {
            answer: summary.answer,
            events,
            iterations: summary.iterations,
            tool_calls: summary.tool_calls,
            truncated: summary.truncated,
            error: summary.error,
        }
    }

    /// System prompt, session history, then the prompt itself.
    async fn initial_messages(&self, request: &ChatRequest) -> Vec<Message> {
        let mut messages = vec![Message::system(prompt::system_prompt(
            &self.dispatcher.registered(),
            &self.rules,
        ))];
        if let Some(session_id) = &request.session_id {
            messages.extend(self.sessions.to_context(session_id).await);
        }
        messages.push(Message::user(&request.prompt));
        messages
    }

    async fn drive(&self, request: ChatRequest, tx: &mpsc::Sender<StreamEvent>) -> TurnSummary {
        info!(
            session_id = request.session_id.as_deref().unwrap_or("-"),
            dataset_id = request.dataset_id.as_deref().unwrap_or("-"),
            "Processing prompt"
        );

        let summary = match self.turn(&request, tx).await {
            Ok(summary) => summary,
            Err((IterationError::Cancelled, summary)) => {
                info!(iterations = summary.iterations, "Caller disconnected, turn cancelled");
                return summary;
            }
            Err((IterationError::Provider(err), mut summary)) => {
                warn!(iteration = summary.iterations, error = %err, "Backend stream failed");
                let message = format!("AI backend error: {err}");
                self.event_bus.publish(DomainEvent::ErrorOccurred {
                    context: "agent_loop".into(),
                    error_message: message.clone(),
                    timestamp: chrono::Utc::now(),
                });
                let _ = tx.send(StreamEvent::Error(message.clone())).await;
                summary.error = Some(message);
                summary
            }
        };

        if let (Some(session_id), Some(answer)) = (&request.session_id, &summary.answer) {
            if !answer.is_empty() {
                self.sessions.record(session_id, &request.prompt, answer).await;
            }
        }

        if summary.error.is_none() {
            info!(
                iterations = summary.iterations,
                tool_calls = summary.tool_calls,
                truncated = summary.truncated,
                "Turn complete"
            );
        }
        self.event_bus.publish(DomainEvent::TurnCompleted {
            session_id: request.session_id.clone(),
            iterations: summary.iterations,
            tool_calls: summary.tool_calls,
            truncated: summary.truncated,
            timestamp: chrono::Utc::now(),
        });
        summary
    }

    async fn turn(
        &self,
        request: &ChatRequest,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<TurnSummary, (IterationError, TurnSummary)> {
        let mut messages = self.initial_messages(request).await;
        let mut summary = TurnSummary::default();
        let mut last_partial = String::new();
        let valid_names = self.dispatcher.valid_names();

        while summary.iterations < self.max_iterations {
            summary.iterations += 1;
            let iteration = summary.iterations;

            if iteration > self.reinforce_after {
                messages.push(Message::system(prompt::REINFORCEMENT));
            }
            debug!(iteration, messages = messages.len(), "Agent loop iteration");

            let mut parser = StreamParser::new(valid_names.iter().copied());
            let received = match self.stream_iteration(&messages, &mut parser, tx).await {
                Ok(received) => received,
                Err(err) => return Err((err, summary)),
            };

            if let Some(answer) = parser.final_answer() {
                summary.answer = Some(answer.to_string());
                return Ok(summary);
            }
            if !parser.partial_answer().is_empty() {
                last_partial = parser.partial_answer().to_string();
            }

            if !parser.action_attempted() {
                // A stream cut off inside "finish" answers with what arrived.
                let answer = if !parser.partial_answer().is_empty() {
                    parser.partial_answer().to_string()
                } else if received {
                    parser.accumulated().to_string()
                } else {
                    warn!(iteration, "Backend returned an empty response");
                    prompt::EMPTY_RESPONSE_APOLOGY.to_string()
                };
                send(tx, StreamEvent::FinalAnswer(answer.clone()))
                    .await
                    .map_err(|e| (e, std::mem::take(&mut summary)))?;
                summary.answer = Some(answer);
                return Ok(summary);
            }

            messages.push(Message::assistant(parser.accumulated()));
            let feedback = match parser.action() {
                Some(ActionRequest::Call(call)) if self.dispatcher.is_registered(&call.name) => {
                    summary.tool_calls += 1;
                    let call = call.clone().with_dataset(request.dataset_id.clone());
                    let result = tokio::select! {
                        _ = tx.closed() => {
                            return Err((IterationError::Cancelled, summary));
                        }
                        result = self.dispatcher.execute(&call) => result,
                    };
                    match result.failure() {
                        Some(failure) if failure.error_type.needs_remediation() => {
                            Message::user(prompt::remediation_message(&call.name, failure))
                        }
                        _ => Message::user(prompt::tool_result_message(&result)),
                    }
                }
                Some(ActionRequest::Call(call)) => {
                    warn!(iteration, tool = %call.name, "Model requested an unknown tool");
                    Message::system(prompt::unknown_tool_message(&call.name, &valid_names))
                }
                Some(ActionRequest::Malformed(raw)) => {
                    warn!(iteration, action = %raw, "Model sent a malformed action");
                    Message::system(prompt::malformed_action_message(&valid_names))
                }
                None => Message::system(prompt::malformed_action_message(&valid_names)),
            };
            messages.push(feedback);
        }

        warn!(
            iterations = summary.iterations,
            "Max iterations reached, truncating answer"
        );
        let answer = prompt::truncated_answer(&last_partial);
        send(tx, StreamEvent::FinalAnswer(answer.clone()))
            .await
            .map_err(|e| (e, std::mem::take(&mut summary)))?;
        summary.answer = Some(answer);
        summary.truncated = true;
        Ok(summary)
    }

    /// Stream one backend response through the parser, forwarding events.
    /// Returns whether any content arrived.
    async fn stream_iteration(
        &self,
        messages: &[Message],
        parser: &mut StreamParser,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<bool, IterationError> {
        let deadline = deadline_after(Instant::now(), self.stream_timeout);
        let timed_out = || {
            IterationError::Provider(ProviderError::Timeout(format!(
                "no complete response within {}s",
                self.stream_timeout.as_secs()
            )))
        };

        let request = ProviderRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: true,
            stop: vec![],
        };

        let mut chunks = tokio::select! {
            _ = tx.closed() => return Err(IterationError::Cancelled),
            opened = timeout_at(deadline, self.provider.stream(request)) => match opened {
                Err(_) => return Err(timed_out()),
                Ok(Err(err)) => return Err(IterationError::Provider(err)),
                Ok(Ok(chunks)) => chunks,
            },
        };

        let mut received = false;
        loop {
            let next = tokio::select! {
                _ = tx.closed() => return Err(IterationError::Cancelled),
                next = timeout_at(deadline, chunks.recv()) => next,
            };
            let chunk = match next {
                Err(_) => return Err(timed_out()),
                Ok(None) => break,
                Ok(Some(Err(err))) => return Err(IterationError::Provider(err)),
                Ok(Some(Ok(chunk))) => chunk,
            };

            if let Some(text) = chunk.content.as_deref().filter(|t| !t.is_empty()) {
                received = true;
                for event in parser.step(text) {
                    send(tx, event).await?;
                }
                if parser.is_complete() {
                    break;
                }
            }
            if chunk.done {
                break;
            }
        }
        Ok(received)
    }
}

async fn send(tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> Result<(), IterationError> {
    tx.send(event).await.map_err(|_| IterationError::Cancelled)
}

fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Script, ScriptedProvider};
    use async_trait::async_trait;
    use caseclaw_core::dataset::{
        ArtifactRow, ArtifactSummary, ForensicStore, PatternQuery, ReportSummary, RowQuery,
    };
    use caseclaw_core::error::StoreError;
    use caseclaw_core::message::Role;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reports held in memory; counts every store call.
    struct MemoryStore {
        reports: Vec<&'static str>,
        calls: AtomicUsize,
    }

    impl MemoryStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                reports: vec!["pixel-7", "galaxy-s21"],
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ForensicStore for MemoryStore {
        async fn list_reports(&self) -> Result<Vec<ReportSummary>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .reports
                .iter()
                .enumerate()
                .map(|(i, name)| ReportSummary {
                    id: i as i64 + 1,
                    job_name: name.to_string(),
                    upload_date: None,
                    status: "completed".into(),
                    error_message: None,
                })
                .collect())
        }

        async fn report_exists(&self, job_name: &str) -> Result<bool, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reports.contains(&job_name))
        }

        async fn list_artifacts(&self, _job_name: &str) -> Result<Vec<ArtifactSummary>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![ArtifactSummary {
                id: 1,
                file_name: "sms.tsv".into(),
                row_count: 2,
            }])
        }

        async fn artifact_rows(&self, _query: &RowQuery) -> Result<Vec<ArtifactRow>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }

        async fn search_rows(&self, _query: &PatternQuery) -> Result<Vec<ArtifactRow>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }
    }

    struct Harness {
        agent: AgentLoop,
        provider: Arc<ScriptedProvider>,
        store: Arc<MemoryStore>,
        sessions: Arc<SessionStore>,
    }

    fn harness(provider: ScriptedProvider) -> Harness {
        let provider = Arc::new(provider);
        let store = MemoryStore::new();
        let sessions = Arc::new(SessionStore::default());
        let agent = AgentLoop::new(
            provider.clone(),
            "test-model",
            ToolDispatcher::new(store.clone()),
            sessions.clone(),
            Arc::new(EventBus::default()),
        );
        Harness {
            agent,
            provider,
            store,
            sessions,
        }
    }

    const LIST_REPORTS: &str =
        r#"{"thought":"look up","action":{"name":"viewReportList","input":{}}}"#;

    #[tokio::test]
    async fn finish_on_first_iteration() {
        let h = harness(ScriptedProvider::new(vec![Script::text(
            r#"{"thought":"checking","finish":"You have 2 reports: A, B"}"#,
        )]));

        let outcome = h
            .agent
            .run(ChatRequest::new("List my reports").with_session("s1"))
            .await;

        assert_eq!(
            outcome.events,
            vec![StreamEvent::FinalAnswer("You have 2 reports: A, B".into())]
        );
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.answer.as_deref(), Some("You have 2 reports: A, B"));

        let context = h.sessions.to_context("s1").await;
        assert_eq!(context[0].content, "Previous question: List my reports");
        assert_eq!(context[1].content, "Previous analysis: You have 2 reports: A, B");
    }

    #[tokio::test]
    async fn tool_call_then_finish() {
        let h = harness(ScriptedProvider::new(vec![
            Script::chunked(LIST_REPORTS, 7),
            Script::text(r#"{"thought":"done","finish":"A and B"}"#),
        ]));

        let outcome = h.agent.run(ChatRequest::new("Which reports?")).await;

        assert_eq!(
            outcome.events,
            vec![
                StreamEvent::AgentProcess("look up\n\n".into()),
                StreamEvent::AgentProcess("→ viewReportList({})\n".into()),
                StreamEvent::FinalAnswer("A and B".into()),
            ]
        );
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.tool_calls, 1);

        let second = h.provider.messages(1);
        let n = second.len();
        assert_eq!(second[n - 2].role, Role::Assistant);
        assert_eq!(second[n - 2].content, LIST_REPORTS);
        assert_eq!(second[n - 1].role, Role::User);
        assert!(second[n - 1].content.starts_with(r#"Tool result: {"success":true"#));
        assert!(second[n - 1].content.contains("galaxy-s21"));
    }

    #[tokio::test]
    async fn unknown_tool_gets_corrective_message() {
        let h = harness(ScriptedProvider::new(vec![
            Script::text(r#"{"thought":"run it","action":{"name":"shell","input":{"cmd":"ls"}}}"#),
            Script::text(r#"{"thought":"ok","finish":"Sorry"}"#),
        ]));

        let outcome = h.agent.run(ChatRequest::new("List files")).await;

        assert_eq!(outcome.events, vec![StreamEvent::FinalAnswer("Sorry".into())]);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.tool_calls, 0);
        assert_eq!(h.store.calls(), 0);

        let second = h.provider.messages(1);
        let last = second.last().unwrap();
        assert_eq!(last.role, Role::System);
        assert!(last.content.contains("'shell'"));
        assert!(last.content.contains("viewReportList"));
    }

    #[tokio::test]
    async fn ceiling_truncates_after_exact_request_count() {
        let h = harness(ScriptedProvider::repeating(Script::text(LIST_REPORTS)));
        let agent = h.agent.clone().with_max_iterations(4);

        let outcome = agent.run(ChatRequest::new("loop forever").with_session("s")).await;

        assert_eq!(h.provider.call_count(), 4);
        assert!(outcome.truncated);
        assert_eq!(
            outcome.events.last(),
            Some(&StreamEvent::FinalAnswer(prompt::TRUNCATION_NOTICE.into()))
        );
        assert_eq!(h.sessions.to_context("s").await.len(), 2);
    }

    #[tokio::test]
    async fn unterminated_finish_answers_with_partial_text() {
        let h = harness(ScriptedProvider::new(vec![Script::text(
            r#"{"thought":"x","finish":"Found two rep"#,
        )]));

        let outcome = h.agent.run(ChatRequest::new("q")).await;
        assert_eq!(
            outcome.events,
            vec![
                StreamEvent::FinalAnswerPartial("Found two rep".into()),
                StreamEvent::FinalAnswer("Found two rep".into()),
            ]
        );
    }

    #[tokio::test]
    async fn reinforcement_after_threshold() {
        let h = harness(ScriptedProvider::repeating(Script::text(LIST_REPORTS)));
        let agent = h.agent.clone().with_max_iterations(3).with_reinforce_after(1);
        agent.run(ChatRequest::new("q")).await;

        let count = |call: usize| {
            h.provider
                .messages(call)
                .iter()
                .filter(|m| m.role == Role::System && m.content == prompt::REINFORCEMENT)
                .count()
        };
        assert_eq!(count(0), 0);
        assert_eq!(count(1), 1);
        assert_eq!(count(2), 2);
    }

    #[tokio::test]
    async fn empty_stream_yields_apology() {
        let h = harness(ScriptedProvider::new(vec![Script::empty()]));
        let outcome = h.agent.run(ChatRequest::new("hello")).await;
        assert_eq!(
            outcome.events,
            vec![StreamEvent::FinalAnswer(prompt::EMPTY_RESPONSE_APOLOGY.into())]
        );
    }

    #[tokio::test]
    async fn plain_text_is_the_answer() {
        let h = harness(ScriptedProvider::new(vec![Script::chunked(
            "There are two reports.",
            5,
        )]));
        let outcome = h.agent.run(ChatRequest::new("hello")).await;
        assert_eq!(
            outcome.events,
            vec![StreamEvent::FinalAnswer("There are two reports.".into())]
        );
        assert_eq!(outcome.iterations, 1);
    }

    #[tokio::test]
    async fn backend_failure_is_one_error_event() {
        let h = harness(ScriptedProvider::new(vec![Script::Refuse(ProviderError::ApiError {
            status_code: 502,
            message: "bad gateway".into(),
        })]));

        let outcome = h
            .agent
            .run(ChatRequest::new("hello").with_session("s"))
            .await;

        assert_eq!(outcome.events.len(), 1);
        match &outcome.events[0] {
            StreamEvent::Error(msg) => assert!(msg.contains("bad gateway")),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(outcome.answer.is_none());
        assert!(h.sessions.to_context("s").await.is_empty());
    }

    #[tokio::test]
    async fn mid_stream_failure_after_partial_answer() {
        let h = harness(ScriptedProvider::new(vec![Script::FailAfter(
            vec![r#"{"finish":"Partial"#.into()],
            ProviderError::StreamInterrupted("connection reset".into()),
        )]));

        let outcome = h.agent.run(ChatRequest::new("hello")).await;
        assert_eq!(
            outcome.events[0],
            StreamEvent::FinalAnswerPartial("Partial".into())
        );
        assert!(matches!(outcome.events[1], StreamEvent::Error(_)));
        assert_eq!(outcome.events.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_stream_times_out() {
        let h = harness(ScriptedProvider::new(vec![Script::Stall]));
        let agent = h.agent.clone().with_stream_timeout(Duration::from_secs(5));

        let outcome = agent.run(ChatRequest::new("hello")).await;
        assert_eq!(outcome.events.len(), 1);
        match &outcome.events[0] {
            StreamEvent::Error(msg) => assert!(msg.contains("timed out")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn oversized_stream_timeout_does_not_overflow() {
        let h = harness(ScriptedProvider::new(vec![Script::text(
            r#"{"thought":"ok","finish":"ok"}"#,
        )]));
        let agent = h.agent.clone().with_stream_timeout(Duration::MAX);

        let outcome = agent.run(ChatRequest::new("hello")).await;
        assert_eq!(outcome.events, vec![StreamEvent::FinalAnswer("ok".into())]);

        let start = Instant::now();
        assert_eq!(deadline_after(start, Duration::MAX), start + FAR_FUTURE);
        assert_eq!(
            deadline_after(start, Duration::from_secs(5)),
            start + Duration::from_secs(5)
        );
    }

    #[tokio::test]
    async fn dataset_is_injected_into_tool_input() {
        let h = harness(ScriptedProvider::new(vec![
            Script::text(r#"{"thought":"tables","action":{"name":"viewArtifactList","input":{}}}"#),
            Script::text(r#"{"thought":"ok","finish":"One table"}"#),
        ]));

        let outcome = h
            .agent
            .run(ChatRequest::new("What tables?").with_dataset("pixel-7"))
            .await;
        assert_eq!(outcome.tool_calls, 1);

        let feedback = h.provider.messages(1).last().unwrap().content.clone();
        assert!(feedback.starts_with(r#"Tool result: {"success":true"#));
        assert!(feedback.contains(r#""job_name":"pixel-7""#));
    }

    #[tokio::test]
    async fn missing_report_gets_remediation() {
        let h = harness(ScriptedProvider::new(vec![
            Script::text(
                r#"{"thought":"tables","action":{"name":"viewArtifactList","input":{"job_name":"iphone"}}}"#,
            ),
            Script::text(r#"{"thought":"ok","finish":"Which report?"}"#),
        ]));

        h.agent.run(ChatRequest::new("What tables?")).await;

        let feedback = h.provider.messages(1).last().unwrap().content.clone();
        assert!(feedback.contains("Available reports: pixel-7, galaxy-s21"));
    }

    #[tokio::test]
    async fn session_history_precedes_prompt() {
        let h = harness(ScriptedProvider::repeating(Script::text(
            r#"{"thought":"t","finish":"answer"}"#,
        )));
        for i in 0..4 {
            h.agent
                .run(ChatRequest::new(format!("question {i}")).with_session("case"))
                .await;
        }

        let messages = h.provider.messages(3);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "Previous question: question 0");
        assert_eq!(messages.last().unwrap().content, "question 3");
        // 3 prior turns replayed at the fourth request
        assert_eq!(messages.len(), 1 + 6 + 1);

        let fifth_context = h.sessions.to_context("case").await;
        assert_eq!(fifth_context[0].content, "Previous question: question 1");
    }

    #[tokio::test]
    async fn dropping_receiver_cancels_turn() {
        let h = harness(ScriptedProvider::repeating(Script::Stall));
        let mut rx = h.agent.run_stream(ChatRequest::new("hello"));

        tokio::time::timeout(Duration::from_secs(1), async {
            while h.provider.call_count() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        rx.close();
        drop(rx);

        tokio::time::timeout(Duration::from_secs(1), async {
            while h.provider.open_streams() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(h.provider.call_count(), 1);
    }

    #[tokio::test]
    async fn publishes_turn_completed() {
        let provider = Arc::new(ScriptedProvider::new(vec![Script::text(
            r#"{"finish":"ok"}"#,
        )]));
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let agent = AgentLoop::new(
            provider,
            "m",
            ToolDispatcher::new(MemoryStore::new()),
            Arc::new(SessionStore::default()),
            bus,
        );

        agent.run(ChatRequest::new("q").with_session("s9")).await;

        match rx.recv().await.unwrap().as_ref() {
            DomainEvent::TurnCompleted {
                session_id,
                iterations,
                truncated,
                ..
            } => {
                assert_eq!(session_id.as_deref(), Some("s9"));
                assert_eq!(*iterations, 1);
                assert!(!*truncated);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
