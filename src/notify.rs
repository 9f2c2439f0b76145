use std::path::PathBuf;

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Span, normalize};

const CHANNEL_CAPACITY: usize = 256;

/// A committed change, or the outcome of a background save/load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    EventAdded {
        name: String,
        span: Span,
        /// Normalized names of the reserved resources.
        resources: Vec<String>,
    },
    EventRemoved {
        name: String,
        span: Span,
        resources: Vec<String>,
    },
    SnapshotSaved {
        path: PathBuf,
        events: usize,
    },
    SnapshotLoaded {
        path: PathBuf,
        events: usize,
        failures: usize,
    },
    SnapshotFailed {
        path: PathBuf,
        reason: String,
    },
}

impl Change {
    fn resources(&self) -> &[String] {
        match self {
            Change::EventAdded { resources, .. } | Change::EventRemoved { resources, .. } => {
                resources
            }
            _ => &[],
        }
    }
}

/// Broadcast hub: one channel per resource plus one for everything.
pub struct NotifyHub {
    channels: DashMap<String, broadcast::Sender<Change>>,
    all: broadcast::Sender<Change>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            all: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Subscribe to changes touching one resource. Creates the channel if needed.
    pub fn subscribe(&self, resource: &str) -> broadcast::Receiver<Change> {
        let sender = self
            .channels
            .entry(normalize(resource))
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Subscribe to every change, including snapshot completions.
    pub fn subscribe_all(&self) -> broadcast::Receiver<Change> {
        self.all.subscribe()
    }

    /// Fan a change out to the global channel and to every resource it
    /// touches. No-op for channels nobody listens on.
    pub fn publish(&self, change: Change) {
        for resource in change.resources() {
            if let Some(sender) = self.channels.get(resource) {
                let _ = sender.send(change.clone());
            }
        }
        let _ = self.all.send(change);
    }

    /// Drop a resource's channel (e.g. when the resource is deleted).
    pub fn remove(&self, resource: &str) {
        self.channels.remove(&normalize(resource));
    }
}
