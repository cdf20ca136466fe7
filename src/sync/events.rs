//! In-process notifications for the presentation layer.

use std::sync::Mutex;

use event_emitter_rs::EventEmitter;
use serde::Serialize;
use tracing::warn;

pub const SYNC_STATE_EVENT: &str = "sync_state";
pub const STATS_EVENT: &str = "stats";

/// Publishes `sync_state` and `stats` snapshots as JSON strings.
///
/// Listeners run on the emitter's own threads, so they must not call back
/// into the coordinator synchronously expecting to observe the same event.
pub struct SyncEvents {
    emitter: Mutex<EventEmitter>,
}

impl Default for SyncEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncEvents {
    pub fn new() -> Self {
        Self {
            emitter: Mutex::new(EventEmitter::new()),
        }
    }

    pub fn on_sync_state<F>(&self, listener: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.on(SYNC_STATE_EVENT, listener);
    }

    pub fn on_stats<F>(&self, listener: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.on(STATS_EVENT, listener);
    }

    pub(crate) fn publish<T: Serialize>(&self, event: &str, value: &T) {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(event, error = %err, "could not encode event payload");
                return;
            }
        };
        match self.emitter.lock() {
            Ok(mut emitter) => {
                emitter.emit(event, payload);
            }
            Err(_) => warn!(event, "event emitter lock poisoned, dropping event"),
        }
    }

    fn on<F>(&self, event: &str, listener: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        match self.emitter.lock() {
            Ok(mut emitter) => {
                emitter.on(event, listener);
            }
            Err(_) => warn!(event, "event emitter lock poisoned, listener not registered"),
        }
    }
}
