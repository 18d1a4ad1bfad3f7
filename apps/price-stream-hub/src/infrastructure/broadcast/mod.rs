//! Broadcast Hub
//!
//! Maintains the set of currently connected viewers and fans every price
//! or removal event out to all of them.
//!
//! # Architecture
//!
//! Each registered viewer owns an isolated, bounded, FIFO queue. Publishing
//! never blocks: a viewer whose queue is full loses that event (logged) and
//! only delays its own view; it can never stall another viewer or the
//! publisher. Viewers whose receiving side has gone away are pruned on the
//! next publish.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::domain::ticker::PriceEvent;

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for a connected viewer stream.
pub type ViewerId = u64;

/// Configuration for the broadcast hub.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastConfig {
    /// Capacity of each viewer's event queue.
    pub viewer_queue_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            viewer_queue_capacity: 256,
        }
    }
}

// =============================================================================
// Broadcast Hub
// =============================================================================

/// Central fan-out point for all broadcast events.
///
/// Thread-safe against concurrent registration, removal, and publish.
#[derive(Debug)]
pub struct BroadcastHub {
    viewers: RwLock<HashMap<ViewerId, mpsc::Sender<PriceEvent>>>,
    config: BroadcastConfig,
}

impl BroadcastHub {
    /// Create a hub with the given configuration.
    #[must_use]
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            viewers: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Create a hub with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(BroadcastConfig::default())
    }

    /// Register a new viewer and hand back its event queue.
    #[must_use]
    pub fn register(&self) -> (ViewerId, mpsc::Receiver<PriceEvent>) {
        let id = uuid::Uuid::new_v4().as_u64_pair().0;
        let (tx, rx) = mpsc::channel(self.config.viewer_queue_capacity);
        self.viewers.write().insert(id, tx);
        tracing::debug!(viewer_id = id, "viewer registered");
        (id, rx)
    }

    /// Remove a viewer from the fan-out set.
    ///
    /// Once removed no further events are enqueued for it; events already
    /// queued are simply discarded with the receiver.
    pub fn unregister(&self, id: ViewerId) {
        if self.viewers.write().remove(&id).is_some() {
            tracing::debug!(viewer_id = id, "viewer unregistered");
        }
    }

    /// Deliver `event` to every registered, active viewer.
    ///
    /// Per-viewer delivery order matches publish call order (FIFO). The
    /// call never blocks; a full queue drops the event for that viewer
    /// only.
    pub fn publish(&self, event: &PriceEvent) {
        let mut stale: Vec<ViewerId> = Vec::new();

        {
            let viewers = self.viewers.read();
            for (id, tx) in viewers.iter() {
                match tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(
                            viewer_id = id,
                            symbol = event.symbol(),
                            "viewer queue full, dropping event for this viewer"
                        );
                    }
                    Err(TrySendError::Closed(_)) => stale.push(*id),
                }
            }
        }

        if !stale.is_empty() {
            let mut viewers = self.viewers.write();
            for id in stale {
                viewers.remove(&id);
                tracing::debug!(viewer_id = id, "disconnected viewer pruned");
            }
        }
    }

    /// Number of currently registered viewers.
    #[must_use]
    pub fn viewer_count(&self) -> usize {
        self.viewers.read().len()
    }
}

// =============================================================================
// Tests
// =============================================================================
