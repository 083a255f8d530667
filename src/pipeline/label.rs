use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use uuid::Uuid;

/// The classification label as observed at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSnapshot {
    pub label: String,
    /// Number of labels published before this snapshot was taken; 0 means
    /// the sentinel is still in place.
    pub revision: u64,
    pub source_frame: Option<Uuid>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl LabelSnapshot {
    fn sentinel(label: String) -> Self {
        Self {
            label,
            revision: 0,
            source_frame: None,
            updated_at: None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.revision == 0
    }

    /// How long ago the label was written, relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.updated_at.map(|updated_at| now - updated_at)
    }
}

/// Single-slot holder of the most recently observed label.
///
/// Cloning yields another handle to the same slot.
#[derive(Debug, Clone)]
pub struct LabelState {
    tx: Arc<watch::Sender<LabelSnapshot>>,
}

impl LabelState {
    pub fn new(sentinel: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(LabelSnapshot::sentinel(sentinel.into()));
        Self { tx: Arc::new(tx) }
    }

    /// Overwrites the label and returns the new revision.
    pub fn publish(&self, label: impl Into<String>, source_frame: Uuid) -> u64 {
        let label = label.into();
        let mut revision = 0;
        self.tx.send_modify(|snapshot| {
            snapshot.label = label;
            snapshot.revision += 1;
            snapshot.source_frame = Some(source_frame);
            snapshot.updated_at = Some(Utc::now());
            revision = snapshot.revision;
        });
        revision
    }

    pub fn snapshot(&self) -> LabelSnapshot {
        self.tx.borrow().clone()
    }

    pub fn label(&self) -> String {
        self.tx.borrow().label.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LabelSnapshot> {
        self.tx.subscribe()
    }
}
