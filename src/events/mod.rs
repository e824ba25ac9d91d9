pub mod schema;
pub mod store;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Delivery status of a stored alert.
///
/// `Received` and `Failed` are eligible for delivery; `Created` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventStatus {
    Received,
    Created,
    Failed,
}

impl EventStatus {
    pub const PENDING: [EventStatus; 2] = [EventStatus::Received, EventStatus::Failed];

    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Received => "RECEIVED",
            EventStatus::Created => "CREATED",
            EventStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "RECEIVED" => Ok(EventStatus::Received),
            "CREATED" => Ok(EventStatus::Created),
            "FAILED" => Ok(EventStatus::Failed),
            other => bail!("unknown event status '{other}'"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Insertion sequence; orders delivery.
    pub seq: i64,
    pub event_id: String,
    pub event_payload: Value,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An alert accepted for storage, not yet persisted.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_id: String,
    pub event_payload: Value,
}

impl NewEvent {
    /// Takes the identifier from the document's `eventId`. String and numeric
    /// ids are accepted; anything else yields `None`.
    pub fn from_source(event_payload: Value) -> Option<Self> {
        let event_id = match event_payload.get("eventId")? {
            Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(Self {
            event_id,
            event_payload,
        })
    }
}
