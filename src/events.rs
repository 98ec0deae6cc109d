//! Scanner event bus.
//!
//! A `tokio::sync::broadcast` channel carrying [`ScanEvent`] values. The
//! WebSocket endpoint subscribes once per connection; with no subscribers
//! events are dropped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::types::{Agent, ScanRecord, Stats};

/// Everything pushed to live subscribers. Serialized as
/// `{"event": "<kind>", "data": {...}}`.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ScanEvent {
    /// Greeting sent when a subscriber connects.
    Status { message: String },
    /// The recent buffer, oldest first, sent after the greeting.
    History(Vec<ScanRecord>),
    /// A newly discovered item.
    NewListing(ScanRecord),
    /// A cycle started or finished. `stats` is attached when going idle.
    ScanStatus {
        status: ScanPhase,
        timestamp: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        stats: Option<Stats>,
    },
    #[serde(rename_all = "camelCase")]
    AgentUpdated {
        action: AgentAction,
        agent_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        agent: Option<Agent>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPhase {
    Scanning,
    Idle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentAction {
    Added,
    Updated,
    Deleted,
    Toggled,
}

/// Broadcast channel for scanner events.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<ScanEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Dropped if nobody is listening.
    pub fn emit(&self, event: ScanEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
