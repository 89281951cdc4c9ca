use scoreboard_capture::CaptureObserver;
use scoreboard_common::frame::DecodedValues;
use scoreboard_vision::PreviewFrames;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

pub type SubscriberId = u64;

/// Fan-out of serialized payloads to every connected client.
///
/// Each subscriber owns a bounded queue drained by its connection task.
/// `broadcast` never blocks: a full queue drops the message for that
/// subscriber only, a closed queue unregisters it.
pub struct BroadcastHub {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<Arc<str>>>>,
    next_id: AtomicU64,
    queue_depth: usize,
}

impl BroadcastHub {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_depth: queue_depth.max(1),
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, HashMap<SubscriberId, mpsc::Sender<Arc<str>>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self) -> (SubscriberId, mpsc::Receiver<Arc<str>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue_depth);
        self.subscribers().insert(id, tx);
        debug!(subscriber = id, "subscriber registered");
        (id, rx)
    }

    /// Returns false if `id` was not registered.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers().remove(&id).is_some();
        if removed {
            debug!(subscriber = id, "subscriber unregistered");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.subscribers().len()
    }

    /// Queue `payload` for every subscriber; returns how many accepted it.
    pub fn broadcast(&self, payload: &str) -> usize {
        let payload: Arc<str> = Arc::from(payload);
        let snapshot: Vec<(SubscriberId, mpsc::Sender<Arc<str>>)> = self
            .subscribers()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        for (id, tx) in snapshot {
            match tx.try_send(Arc::clone(&payload)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(subscriber = id, "subscriber queue full, dropping message");
                }
                Err(TrySendError::Closed(_)) => {
                    if self.unregister(id) {
                        warn!(subscriber = id, "subscriber connection closed, unregistered");
                    }
                }
            }
        }
        delivered
    }
}

/// Publishes every tick's decoded values as JSON.
pub struct HubObserver {
    hub: Arc<BroadcastHub>,
}

impl HubObserver {
    pub fn new(hub: Arc<BroadcastHub>) -> Self {
        Self { hub }
    }
}

impl CaptureObserver for HubObserver {
    fn notify(&self, values: &DecodedValues, _previews: &PreviewFrames) {
        match serde_json::to_string(values) {
            Ok(json) => {
                let delivered = self.hub.broadcast(&json);
                debug!(delivered, "broadcast decoded values");
            }
            Err(e) => warn!(error = %e, "failed to serialize decoded values"),
        }
    }

    fn name(&self) -> &str {
        "broadcast-hub"
    }
}
