//! Wiring: config → provider, store, tools, sessions, agent.

use std::sync::Arc;

use anyhow::Context;
use caseclaw_agent::{AgentLoop, SessionStore};
use caseclaw_config::AppConfig;
use caseclaw_core::event::{DomainEvent, EventBus};
use caseclaw_core::provider::Provider;
use caseclaw_store::{EmbeddingIndex, SqliteStore};
use caseclaw_tools::{ToolDispatcher, ToolLimits};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct Runtime {
    pub config: AppConfig,
    pub provider: Arc<dyn Provider>,
    pub store: Arc<SqliteStore>,
    pub index: Option<Arc<EmbeddingIndex>>,
    pub event_bus: Arc<EventBus>,
}

impl Runtime {
    pub fn load_config() -> anyhow::Result<AppConfig> {
        AppConfig::load().context("Failed to load config")
    }

    /// Open the store only; no backend needed.
    pub async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<SqliteStore>> {
        let store = SqliteStore::new(&config.store.database_path)
            .await
            .with_context(|| format!("Failed to open {}", config.store.database_path))?;
        Ok(Arc::new(store))
    }

    pub async fn build() -> anyhow::Result<Self> {
        let config = Self::load_config()?;
        let provider = caseclaw_providers::build_from_config(&config)
            .context("Failed to build the text-generation backend")?;
        let store = Self::open_store(&config).await?;

        let index = match &config.tools.embedding_model {
            Some(model) => {
                let index = EmbeddingIndex::new(store.pool().clone(), provider.clone(), model)
                    .await
                    .context("Failed to open the embedding index")?;
                Some(Arc::new(index))
            }
            None => None,
        };

        debug!(
            provider = %config.provider,
            model = %config.model,
            semantic_search = index.is_some(),
            "Runtime ready"
        );

        let event_bus = Arc::new(EventBus::default());
        spawn_event_logger(&event_bus);

        Ok(Self {
            config,
            provider,
            store,
            index,
            event_bus,
        })
    }

    pub fn agent(&self) -> AgentLoop {
        let limits = ToolLimits {
            max_page_size: self.config.tools.max_page_size,
            max_semantic_results: self.config.tools.max_semantic_results,
        };
        let mut dispatcher = ToolDispatcher::new(self.store.clone())
            .with_limits(limits)
            .with_events(self.event_bus.clone());
        if let Some(index) = &self.index {
            dispatcher = dispatcher.with_index(index.clone());
        }

        let sessions = SessionStore::from_config(&self.config.session)
            .with_events(self.event_bus.clone());

        AgentLoop::from_config(
            &self.config,
            self.provider.clone(),
            dispatcher,
            Arc::new(sessions),
            self.event_bus.clone(),
        )
    }
}

/// Log every domain event at debug level until the bus is dropped.
///
/// Resolves to the number of events logged.
pub fn spawn_event_logger(bus: &EventBus) -> JoinHandle<u64> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        let mut logged = 0;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    log_event(&event);
                    logged += 1;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
        logged
    })
}

fn log_event(event: &DomainEvent) {
    match event {
        DomainEvent::ToolExecuted {
            tool_name,
            success,
            error_type,
            duration_ms,
            ..
        } => debug!(
            tool = %tool_name,
            success,
            error_type = error_type.as_deref().unwrap_or("-"),
            duration_ms,
            "Tool executed"
        ),
        DomainEvent::TurnCompleted {
            session_id,
            iterations,
            tool_calls,
            truncated,
            ..
        } => debug!(
            session = session_id.as_deref().unwrap_or("-"),
            iterations,
            tool_calls,
            truncated,
            "Turn completed"
        ),
        DomainEvent::ErrorOccurred {
            context,
            error_message,
            ..
        } => debug!(context = %context, error = %error_message, "Turn failed"),
        DomainEvent::SessionEvicted { session_id, .. } => {
            debug!(session = %session_id, "Session evicted")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn evicted(id: &str) -> DomainEvent {
        DomainEvent::SessionEvicted {
            session_id: id.into(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn event_logger_drains_until_bus_dropped() {
        let bus = EventBus::new(16);
        let logger = spawn_event_logger(&bus);

        bus.publish(evicted("a"));
        bus.publish(DomainEvent::ToolExecuted {
            tool_name: "grepSearch".into(),
            success: false,
            error_type: Some("validation".into()),
            duration_ms: 2,
            timestamp: Utc::now(),
        });
        drop(bus);

        assert_eq!(logger.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn event_logger_survives_lag() {
        let bus = EventBus::new(1);
        let logger = spawn_event_logger(&bus);

        for id in ["a", "b", "c"] {
            bus.publish(evicted(id));
        }
        drop(bus);

        assert_eq!(logger.await.unwrap(), 1);
    }
}
