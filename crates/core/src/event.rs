//! Domain event system — decoupled observation of agent activity.
//!
//! Events are published when a tool runs, a turn completes, or something
//! fails. The CLI logs them at debug level (visible with `--verbose`);
//! nothing in the loop depends on anyone listening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A tool call was dispatched
    ToolExecuted {
        tool_name: String,
        success: bool,
        error_type: Option<String>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A turn reached its terminal state
    TurnCompleted {
        session_id: Option<String>,
        iterations: u32,
        tool_calls: u32,
        truncated: bool,
        timestamp: DateTime<Utc>,
    },

    /// An unrecoverable error ended a turn
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// Idle sessions were dropped by the session store
    SessionEvicted {
        session_id: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
