//! Tool dispatcher: validation, execution and result normalization.
//!
//! Whatever happens inside a handler, callers get a [`ToolResult`] back.
//! Unknown names, bad input and store failures all become structured
//! failures the agent loop can hand to the model.

use std::sync::Arc;
use std::time::Instant;

use caseclaw_core::dataset::{ForensicStore, VectorIndex};
use caseclaw_core::event::{DomainEvent, EventBus};
use caseclaw_core::tool::{ToolCall, ToolFailure, ToolResult};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::input::{ToolInput, ToolLimits};
use crate::kind::ToolKind;
use crate::{artifact_data, artifact_list, grep_search, report_list, semantic_search};

/// Routes tool calls to the dataset handlers.
#[derive(Clone)]
pub struct ToolDispatcher {
    store: Arc<dyn ForensicStore>,
    index: Option<Arc<dyn VectorIndex>>,
    limits: ToolLimits,
    events: Option<Arc<EventBus>>,
}

impl ToolDispatcher {
    pub fn new(store: Arc<dyn ForensicStore>) -> Self {
        Self {
            store,
            index: None,
            limits: ToolLimits::default(),
            events: None,
        }
    }

    /// Enable `semanticSearch`. Without an index the tool is not registered.
    pub fn with_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_limits(mut self, limits: ToolLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Publish a `ToolExecuted` event for every dispatch.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn limits(&self) -> &ToolLimits {
        &self.limits
    }

    /// Registered tools, in the order they are presented to the model.
    pub fn registered(&self) -> Vec<ToolKind> {
        ToolKind::ALL
            .into_iter()
            .filter(|kind| *kind != ToolKind::SemanticSearch || self.index.is_some())
            .collect()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn valid_names(&self) -> Vec<&'static str> {
        self.registered().iter().map(|kind| kind.name()).collect()
    }

    fn lookup(&self, name: &str) -> Option<ToolKind> {
        ToolKind::from_name(name).filter(|kind| self.registered().contains(kind))
    }

    /// Execute a model-issued call, injecting the caller's dataset when the
    /// tool takes one and the model left it out.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let accepts_dataset = self
            .lookup(&call.name)
            .map(|kind| kind.accepts_dataset())
            .unwrap_or(false);
        self.dispatch(&call.name, call.resolved_input(accepts_dataset))
            .await
    }

    /// Validate `raw` against the named tool and run it.
    pub async fn dispatch(&self, name: &str, raw: Value) -> ToolResult {
        let start = Instant::now();

        let result: ToolResult = match self.lookup(name) {
            Some(kind) => self.run(kind, &raw).await.into(),
            None => ToolResult::Failure(ToolFailure::tool_not_found(name, &self.valid_names())),
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let error_type = result.error_type().map(|t| t.as_str().to_string());
        match &result {
            ToolResult::Success(_) => {
                info!(tool = name, success = true, duration_ms, "Tool executed");
            }
            ToolResult::Failure(failure) => {
                warn!(
                    tool = name,
                    success = false,
                    error_type = %failure.error_type,
                    duration_ms,
                    error = %failure.message,
                    "Tool failed"
                );
            }
        }

        if let Some(events) = &self.events {
            events.publish(DomainEvent::ToolExecuted {
                tool_name: name.to_string(),
                success: result.is_success(),
                error_type,
                duration_ms,
                timestamp: chrono::Utc::now(),
            });
        }

        result
    }

    async fn run(&self, kind: ToolKind, raw: &Value) -> Result<Map<String, Value>, ToolFailure> {
        let input = ToolInput::parse(kind, raw, &self.limits)?;
        debug!(tool = %kind, ?input, "Dispatching tool");

        let store = self.store.as_ref();
        match input {
            ToolInput::ReportList => report_list::run(store).await,
            ToolInput::ArtifactList(input) => artifact_list::run(store, input).await,
            ToolInput::ArtifactData(input) => artifact_data::run(store, input).await,
            ToolInput::GrepSearch(input) => grep_search::run(store, input).await,
            ToolInput::SemanticSearch(input) => match &self.index {
                Some(index) => semantic_search::run(store, index.as_ref(), input).await,
                None => Err(ToolFailure::tool_not_found(
                    kind.name(),
                    &self.valid_names(),
                )),
            },
        }
    }
}
