use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Event key type
pub type EventKey = String;

/// Event payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    String(String),
    Map(HashMap<String, serde_json::Value>),
}

/// Mirror progress event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorEvent {
    /// Event key (e.g., "copy.started", "archive.committed")
    pub key: EventKey,

    /// Event payload
    pub payload: EventPayload,

    /// Timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl MirrorEvent {
    /// Create a new event
    pub fn new(key: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            key: key.into(),
            payload,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Create an event with named fields
    pub fn with_fields<K, V>(key: impl Into<String>, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        let map = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::new(key, EventPayload::Map(map))
    }

    /// Field of a structured payload.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        match &self.payload {
            EventPayload::Map(m) => m.get(name),
            EventPayload::String(_) => None,
        }
    }

    /// Create an event with a string payload
    pub fn with_string(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(key, EventPayload::String(message.into()))
    }

    /// Human-readable one-liner for report sinks.
    pub fn describe(&self) -> String {
        match &self.payload {
            EventPayload::String(s) => format!("{}: {}", self.key, s),
            EventPayload::Map(m) => {
                let mut keys: Vec<_> = m.keys().collect();
                keys.sort();
                let fields: Vec<String> = keys
                    .into_iter()
                    .map(|k| match &m[k] {
                        serde_json::Value::String(v) => format!("{}={}", k, v),
                        other => format!("{}={}", k, other),
                    })
                    .collect();
                format!("{}: {}", self.key, fields.join(" "))
            }
        }
    }
}

/// Event emitter
#[derive(Clone)]
pub struct EventEmitter {
    sender: Arc<broadcast::Sender<MirrorEvent>>,
}

impl EventEmitter {
    /// Create a new event emitter
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Emit an event
    pub fn emit(&self, event: MirrorEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<MirrorEvent> {
        self.sender.subscribe()
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}
