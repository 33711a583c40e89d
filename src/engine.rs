//! Session convergence engine
//!
//! Widget actions and agent tool calls both arrive here, become `FlowEvent`s
//! and are applied through the session store's atomic `apply`. The engine
//! then carries out the transition's effects: notifying subscribers and,
//! when all selections are in, running the finalizer.

mod finalizer;
mod tool_bridge;
mod widget_actions;

#[cfg(test)]
mod scenarios;

pub use finalizer::FinalizeOutcome;
pub use tool_bridge::ToolBridge;
pub use widget_actions::ActionError;

use crate::flow::{advance, Effect, FlowEvent, SessionRecord};
use crate::returns::policy::ReturnPolicy;
use crate::returns::{DatabaseReturnService, ReturnService, ReturnServiceError};
use crate::session::{SessionStore, StoreError};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};

/// Engine wired to the configured session backend and the database-backed
/// return service
pub type ProductionEngine = ReturnsEngine<Arc<dyn SessionStore>, DatabaseReturnService>;

/// Errors that end the current request
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    ReturnService(#[from] ReturnServiceError),
    #[error("Operation cancelled")]
    Cancelled,
}

/// Where an event came from, for logs and subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Widget,
    Agent,
    Transport,
    Finalizer,
}

impl InputSource {
    pub fn as_str(self) -> &'static str {
        match self {
            InputSource::Widget => "widget",
            InputSource::Agent => "agent",
            InputSource::Transport => "transport",
            InputSource::Finalizer => "finalizer",
        }
    }
}

/// Pushed to stream subscribers after every committed change
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Updated {
        record: SessionRecord,
        source: InputSource,
    },
}

/// A committed transition
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub record: SessionRecord,
    pub effects: Vec<Effect>,
}

impl Dispatched {
    pub fn has_effect(&self, wanted: &Effect) -> bool {
        self.effects.contains(wanted)
    }
}

pub struct ReturnsEngine<S, R> {
    store: S,
    returns: R,
    /// Rules behind the agent's eligibility and refund previews
    policy: ReturnPolicy,
    subscribers: RwLock<HashMap<String, broadcast::Sender<SessionEvent>>>,
    /// Threads with a finalize call in flight
    finalizing: Mutex<HashSet<String>>,
}

impl<S: SessionStore, R: ReturnService> ReturnsEngine<S, R> {
    pub fn new(store: S, returns: R) -> Self {
        Self {
            store,
            returns,
            policy: ReturnPolicy::default(),
            subscribers: RwLock::new(HashMap::new()),
            finalizing: Mutex::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ReturnPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Current record, created on first contact
    pub async fn session(&self, thread_id: &str) -> Result<SessionRecord, EngineError> {
        Ok(self.store.get_or_create(thread_id).await?)
    }

    /// Subscribe to committed changes for one thread
    pub async fn subscribe(&self, thread_id: &str) -> broadcast::Receiver<SessionEvent> {
        let mut subscribers = self.subscribers.write().await;
        subscribers
            .entry(thread_id.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .subscribe()
    }

    /// Apply one event through the store and carry out its effects.
    ///
    /// Flow rejections and version conflicts come back as `StoreError`s for
    /// the caller to turn into a re-render or a message.
    pub async fn dispatch(
        &self,
        thread_id: &str,
        event: FlowEvent,
        expected_version: Option<u64>,
        source: InputSource,
    ) -> Result<Dispatched, StoreError> {
        let event_name = event.name();
        let mut effects = Vec::new();
        let captured = &mut effects;
        let committed = self
            .store
            .apply(
                thread_id,
                expected_version,
                Box::new(move |current: &SessionRecord| {
                    let (next, produced) = advance(current, event)?;
                    *captured = produced;
                    Ok(next)
                }),
            )
            .await;

        match committed {
            Ok(record) => {
                tracing::info!(
                    thread_id = %thread_id,
                    event = event_name,
                    source = source.as_str(),
                    step = %record.flow_step,
                    version = record.version,
                    "Session advanced"
                );
                self.run_effects(&record, &effects, source).await;
                Ok(Dispatched { record, effects })
            }
            Err(StoreError::Backend(message)) => {
                tracing::error!(thread_id = %thread_id, event = event_name, error = %message, "Session store failed");
                Err(StoreError::Backend(message))
            }
            Err(e) => {
                tracing::debug!(
                    thread_id = %thread_id,
                    event = event_name,
                    source = source.as_str(),
                    error = %e,
                    "Event not applied"
                );
                Err(e)
            }
        }
    }

    async fn run_effects(&self, record: &SessionRecord, effects: &[Effect], source: InputSource) {
        for effect in effects {
            match effect {
                Effect::NotifySessionChanged => self.notify(record, source).await,
                Effect::OfferRetention { offer } => {
                    tracing::info!(thread_id = %record.thread_id, offer = %offer.code, "Retention offer presented");
                }
                Effect::FlowCompleted { .. } => {
                    tracing::info!(thread_id = %record.thread_id, "Return workflow complete");
                }
                // Carried out by the caller: the widget path finalizes
                // right away, the agent is told to call finalize
                Effect::RequestFinalize => {}
            }
        }
    }

    async fn notify(&self, record: &SessionRecord, source: InputSource) {
        let mut subscribers = self.subscribers.write().await;
        let Some(tx) = subscribers.get(&record.thread_id) else {
            return;
        };
        let event = SessionEvent::Updated {
            record: record.clone(),
            source,
        };
        // Every stream for this thread has ended
        if tx.send(event).is_err() {
            subscribers.remove(&record.thread_id);
            tracing::debug!(thread_id = %record.thread_id, "Dropped idle session channel");
        }
    }

    #[cfg(test)]
    pub(crate) async fn streamed_threads(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Events reported by the chat transport (customer lookups, rendered
    /// items). Rejections are returned as a reason, not an error.
    pub async fn record_transport_event(
        &self,
        thread_id: &str,
        event: FlowEvent,
    ) -> Result<TransportAck, EngineError> {
        match self.dispatch(thread_id, event, None, InputSource::Transport).await {
            Ok(dispatched) => Ok(TransportAck {
                accepted: true,
                reason: None,
                session: dispatched.record,
            }),
            Err(StoreError::Backend(message)) => Err(StoreError::Backend(message).into()),
            Err(e) => Ok(TransportAck {
                accepted: false,
                reason: Some(e.to_string()),
                session: self.store.get_or_create(thread_id).await?,
            }),
        }
    }
}

/// Reply to a transport-reported event
#[derive(Debug, Clone, serde::Serialize)]
pub struct TransportAck {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub session: SessionRecord,
}
