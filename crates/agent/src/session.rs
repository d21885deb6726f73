//! Session memory — bounded question/answer history per session id.
//!
//! A session keeps its last few completed turns so follow-up questions can
//! refer back to earlier findings. Sessions live in a [`SessionStore`] owned
//! by whoever runs the agent; an [`EvictionPolicy`] decides when an idle
//! session is dropped.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use caseclaw_core::event::{DomainEvent, EventBus};
use caseclaw_core::message::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};

// ── Data Structures ───────────────────────────────────────────────────────

/// One completed turn. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentLoopRecord {
    pub user_message: String,
    pub final_answer: String,
    pub timestamp: DateTime<Utc>,
}

impl AgentLoopRecord {
    pub fn new(user_message: impl Into<String>, final_answer: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            final_answer: final_answer.into(),
            timestamp: Utc::now(),
        }
    }
}

/// History of one session.
#[derive(Debug)]
pub struct SessionContext {
    session_id: String,
    records: VecDeque<AgentLoopRecord>,
    max_records: usize,
    last_activity: Instant,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>, max_records: usize) -> Self {
        Self {
            session_id: session_id.into(),
            records: VecDeque::new(),
            max_records,
            last_activity: Instant::now(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Append a record, dropping the oldest beyond `max_records`.
    pub fn push(&mut self, record: AgentLoopRecord) {
        self.records.push_back(record);
        while self.records.len() > self.max_records {
            self.records.pop_front();
        }
        self.touch();
    }

    /// Retained records, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &AgentLoopRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Render the history as alternating user/assistant messages.
    pub fn to_messages(&self) -> Vec<Message> {
        self.records
            .iter()
            .flat_map(|record| {
                [
                    Message::user(format!("Previous question: {}", record.user_message)),
                    Message::assistant(format!("Previous analysis: {}", record.final_answer)),
                ]
            })
            .collect()
    }
}

/// Shared handle to one session. Each session has its own lock, so turns on
/// different sessions never contend.
pub type SessionHandle = Arc<Mutex<SessionContext>>;

// ── Eviction ──────────────────────────────────────────────────────────────

/// Decides when a session is dropped from the store.
pub trait EvictionPolicy: Send + Sync {
    fn is_expired(&self, last_activity: Instant, now: Instant) -> bool;

    /// Policies that never expire anything let the store skip sweeping.
    fn never_expires(&self) -> bool {
        false
    }
}

/// Drop sessions idle for longer than the given duration.
#[derive(Debug, Clone, Copy)]
pub struct IdleTimeout(pub Duration);

impl EvictionPolicy for IdleTimeout {
    fn is_expired(&self, last_activity: Instant, now: Instant) -> bool {
        now.saturating_duration_since(last_activity) > self.0
    }
}

/// Keep every session for the life of the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepForever;

impl EvictionPolicy for KeepForever {
    fn is_expired(&self, _last_activity: Instant, _now: Instant) -> bool {
        false
    }

    fn never_expires(&self) -> bool {
        true
    }
}

// ── Store ─────────────────────────────────────────────────────────────────

/// All live sessions, keyed by the caller's opaque session id.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    policy: Box<dyn EvictionPolicy>,
    max_records: usize,
    events: Option<Arc<EventBus>>,
}

impl SessionStore {
    pub const DEFAULT_MAX_RECORDS: usize = 3;

    pub fn new(policy: impl EvictionPolicy + 'static) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            policy: Box::new(policy),
            max_records: Self::DEFAULT_MAX_RECORDS,
            events: None,
        }
    }

    /// Build from `[session]` settings; an idle timeout of 0 keeps sessions
    /// forever.
    pub fn from_config(config: &caseclaw_config::SessionConfig) -> Self {
        let store = if config.idle_timeout_secs == 0 {
            Self::new(KeepForever)
        } else {
            Self::new(IdleTimeout(Duration::from_secs(config.idle_timeout_secs)))
        };
        store.with_max_records(config.max_records)
    }

    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        self
    }

    /// Publish `SessionEvicted` when a sweep drops a session.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Existing session or a new empty one; refreshes its last activity.
    pub async fn get_or_create(&self, session_id: &str) -> SessionHandle {
        self.sweep().await;

        let existing = self.sessions.read().await.get(session_id).cloned();
        let handle = match existing {
            Some(handle) => handle,
            None => {
                let mut sessions = self.sessions.write().await;
                sessions
                    .entry(session_id.to_string())
                    .or_insert_with(|| {
                        debug!(session_id, "Creating session");
                        Arc::new(Mutex::new(SessionContext::new(session_id, self.max_records)))
                    })
                    .clone()
            }
        };

        handle.lock().await.touch();
        handle
    }

    /// Record a completed turn.
    pub async fn record(&self, session_id: &str, prompt: &str, answer: &str) {
        let handle = self.get_or_create(session_id).await;
        let mut session = handle.lock().await;
        session.push(AgentLoopRecord::new(prompt, answer));
        debug!(session_id, records = session.len(), "Recorded turn");
    }

    /// Prior turns as messages to place before the next prompt.
    pub async fn to_context(&self, session_id: &str) -> Vec<Message> {
        let handle = self.get_or_create(session_id).await;
        let session = handle.lock().await;
        session.to_messages()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    /// Drop expired sessions. Returns how many were removed.
    ///
    /// A session whose lock is held is in use and is never expired.
    pub async fn sweep(&self) -> usize {
        if self.policy.never_expires() {
            return 0;
        }

        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, handle)| match handle.try_lock() {
                Ok(session) => self.policy.is_expired(session.last_activity(), now),
                Err(_) => false,
            })
            .map(|(id, _)| id.clone())
            .collect();

        for session_id in &expired {
            sessions.remove(session_id);
            info!(session_id = %session_id, "Session evicted");
            if let Some(events) = &self.events {
                events.publish(DomainEvent::SessionEvicted {
                    session_id: session_id.clone(),
                    timestamp: Utc::now(),
                });
            }
        }
        expired.len()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(KeepForever)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caseclaw_core::message::Role;

    #[tokio::test]
    async fn keeps_last_three_oldest_first() {
        let store = SessionStore::default();
        for i in 1..=5 {
            store
                .record("case-1", &format!("question {i}"), &format!("answer {i}"))
                .await;
        }

        let context = store.to_context("case-1").await;
        assert_eq!(context.len(), 6);
        assert_eq!(context[0].role, Role::User);
        assert_eq!(context[0].content, "Previous question: question 3");
        assert_eq!(context[1].role, Role::Assistant);
        assert_eq!(context[1].content, "Previous analysis: answer 3");
        assert_eq!(context[5].content, "Previous analysis: answer 5");
    }

    #[tokio::test]
    async fn new_session_has_empty_context() {
        let store = SessionStore::default();
        assert!(store.to_context("fresh").await.is_empty());
        assert!(store.contains("fresh").await);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = SessionStore::default();
        store.record("a", "q", "answer for a").await;
        assert!(store.to_context("b").await.is_empty());
        assert_eq!(store.to_context("a").await.len(), 2);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn concurrent_records_are_not_lost() {
        let store = Arc::new(SessionStore::default().with_max_records(100));
        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.record("shared", &format!("q{i}"), &format!("a{i}")).await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let handle = store.get_or_create("shared").await;
        assert_eq!(handle.lock().await.len(), 20);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_are_swept() {
        let bus = Arc::new(EventBus::new(8));
        let mut rx = bus.subscribe();
        let store = SessionStore::new(IdleTimeout(Duration::from_secs(60))).with_events(bus);

        store.record("stale", "q", "a").await;
        tokio::time::advance(Duration::from_secs(30)).await;
        store.record("active", "q", "a").await;
        tokio::time::advance(Duration::from_secs(45)).await;

        assert_eq!(store.sweep().await, 1);
        assert!(!store.contains("stale").await);
        assert!(store.contains("active").await);

        match rx.recv().await.unwrap().as_ref() {
            DomainEvent::SessionEvicted { session_id, .. } => assert_eq!(session_id, "stale"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn access_refreshes_activity() {
        let store = SessionStore::new(IdleTimeout(Duration::from_secs(60)));
        store.record("case", "q", "a").await;
        tokio::time::advance(Duration::from_secs(50)).await;
        store.to_context("case").await;
        tokio::time::advance(Duration::from_secs(50)).await;

        assert_eq!(store.sweep().await, 0);
        assert_eq!(store.to_context("case").await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn keep_forever_never_sweeps() {
        let store = SessionStore::new(KeepForever);
        store.record("case", "q", "a").await;
        tokio::time::advance(Duration::from_secs(86_400 * 30)).await;
        assert_eq!(store.sweep().await, 0);
        assert!(store.contains("case").await);
    }

    #[tokio::test]
    async fn unbounded_history_does_not_preallocate() {
        let store = SessionStore::new(KeepForever).with_max_records(usize::MAX);
        store.record("case", "q1", "a1").await;
        store.record("case", "q2", "a2").await;
        assert_eq!(store.to_context("case").await.len(), 4);

        let mut context = SessionContext::new("direct", usize::MAX);
        context.push(AgentLoopRecord::new("q", "a"));
        assert_eq!(context.len(), 1);
    }

    #[test]
    fn from_config_respects_settings() {
        let config = caseclaw_config::SessionConfig {
            max_records: 1,
            idle_timeout_secs: 0,
        };
        let store = SessionStore::from_config(&config);
        assert!(store.policy.never_expires());
        assert_eq!(store.max_records, 1);
    }
}
