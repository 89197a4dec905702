//! In-process real-time transport for the relational backend.
//!
//! Every committed insert is announced as a [`RowInsert`] carrying the new
//! row in its canonical camelCase shape (the `{new: Row}` payload). Delivery
//! is at-most-once per receiver; a receiver that falls behind the channel
//! capacity skips the oldest events.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::record::Record;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowInsert {
    pub table: String,
    pub new: Value,
}

impl RowInsert {
    pub fn new<R: Record>(record: &R) -> serde_json::Result<Self> {
        Ok(Self {
            table: R::COLLECTION.to_string(),
            new: serde_json::to_value(record)?,
        })
    }

    /// Decode the row if it belongs to `R`'s table.
    pub fn decode<R: Record>(&self) -> Option<R> {
        if self.table != R::COLLECTION {
            return None;
        }
        match serde_json::from_value(self.new.clone()) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(table = %self.table, error = %e, "undecodable realtime row");
                None
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RealtimeHub {
    tx: broadcast::Sender<RowInsert>,
}

impl RealtimeHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Announce an insert. Returns how many receivers were listening.
    pub fn publish(&self, event: RowInsert) -> usize {
        // No receivers is not an error for a push channel
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RowInsert> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new(rebox_shared::constants::DEFAULT_REALTIME_CAPACITY)
    }
}
