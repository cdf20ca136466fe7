use std::sync::{Mutex, MutexGuard};
#[cfg(feature = "emitter")]
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, info, warn};

use super::{SyncState, SyncStatus, SyncType};
use crate::error::{ReplicaError, StoreError};
use crate::store::EntityStore;

#[cfg(feature = "emitter")]
use super::events::{SyncEvents, SYNC_STATE_EVENT};

pub(crate) const INTERRUPTED: &str = "sync interrupted";

/// Owns the store's [`SyncState`] and every transition of it.
///
/// The state is loaded on first use. Each transition is applied to a copy,
/// persisted, and only then made visible, so a failed save leaves the
/// previous state in place.
pub struct SyncCoordinator<S> {
    store: S,
    state: Mutex<Option<SyncState>>,
    #[cfg(feature = "emitter")]
    events: Option<Arc<SyncEvents>>,
}

impl<S: EntityStore> SyncCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            state: Mutex::new(None),
            #[cfg(feature = "emitter")]
            events: None,
        }
    }

    #[cfg(feature = "emitter")]
    pub fn with_events(store: S, events: Arc<SyncEvents>) -> Self {
        Self {
            events: Some(events),
            ..Self::new(store)
        }
    }

    /// Current state, loading (and recovering) it on first call.
    pub fn state(&self) -> Result<SyncState, ReplicaError> {
        let mut slot = self.lock()?;
        let state = self.loaded(&mut slot)?.clone();
        Ok(state)
    }

    /// Begin a sync. Rejected without any change while another is running.
    pub fn start_sync(&self, sync_type: SyncType) -> Result<SyncState, ReplicaError> {
        self.transition(|state| {
            if state.is_syncing() {
                let running = state
                    .sync_type
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                warn!(requested = %sync_type, running = %running, "rejected re-entrant sync");
                return Err(ReplicaError::ReentrantSync { sync_type: running });
            }
            if state.status != SyncStatus::Idle {
                debug!(from = ?state.status, "returning sync state to idle");
                state.status = SyncStatus::Idle;
            }
            state.status = SyncStatus::Syncing;
            state.sync_type = Some(sync_type);
            state.progress_current = 0;
            state.progress_total = 0;
            state.attempt_count += 1;
            info!(sync_type = %sync_type, attempt = state.attempt_count, "sync started");
            Ok(())
        })
    }

    /// Record progress. Ignored unless syncing; never moves backwards.
    pub fn update_progress(&self, current: u64, total: u64) -> Result<SyncState, ReplicaError> {
        self.transition(|state| {
            if !state.is_syncing() {
                debug!(current, total, "progress outside a sync ignored");
                return Ok(());
            }
            advance_progress(state, current, total);
            Ok(())
        })
    }

    /// Persist a committed checkpoint inside a full-sync page: progress plus
    /// the page cursor and how many of its records are durable. One save.
    pub fn record_checkpoint(
        &self,
        current: u64,
        total: u64,
        cursor: Option<String>,
        offset: u64,
    ) -> Result<SyncState, ReplicaError> {
        self.transition(|state| {
            if !state.is_syncing() {
                debug!(current, offset, "checkpoint outside a sync ignored");
                return Ok(());
            }
            advance_progress(state, current, total);
            debug!(
                cursor = cursor.as_deref().unwrap_or(""),
                offset,
                "page checkpoint recorded"
            );
            state.last_page_cursor = cursor;
            state.last_page_offset = offset;
            Ok(())
        })
    }

    /// Finish the running sync. The full-sync page cursor is cleared since
    /// the pass it pointed into is over.
    pub fn complete_sync(&self) -> Result<SyncState, ReplicaError> {
        self.transition(|state| {
            if !state.is_syncing() {
                warn!(status = ?state.status, "complete_sync without a running sync");
                return Ok(());
            }
            state.status = SyncStatus::Completed;
            state.last_sync_time = Some(SystemTime::now());
            state.last_error = None;
            state.last_page_cursor = None;
            state.last_page_offset = 0;
            info!(
                sync_type = ?state.sync_type,
                progress = state.progress_current,
                "sync completed"
            );
            Ok(())
        })
    }

    /// Mark the sync failed. Cursors are kept so the next attempt resumes.
    pub fn fail_sync(&self, error: impl ToString) -> Result<SyncState, ReplicaError> {
        let message = error.to_string();
        self.transition(move |state| {
            warn!(
                sync_type = ?state.sync_type,
                error = %message,
                cursor = state.last_page_cursor.as_deref().unwrap_or(""),
                "sync failed"
            );
            state.status = SyncStatus::Failed;
            state.last_error = Some(message);
            Ok(())
        })
    }

    /// Persist the start of the next full-sync page. Call only after every
    /// record before `cursor` has been committed.
    pub fn record_page_cursor(&self, cursor: Option<String>) -> Result<SyncState, ReplicaError> {
        self.transition(|state| {
            debug!(cursor = cursor.as_deref().unwrap_or(""), "page cursor recorded");
            state.last_page_cursor = cursor;
            state.last_page_offset = 0;
            Ok(())
        })
    }

    pub fn record_incremental_cursor(&self, cursor: String) -> Result<SyncState, ReplicaError> {
        self.transition(|state| {
            debug!(cursor = %cursor, "incremental cursor recorded");
            state.last_incremental_cursor = Some(cursor);
            Ok(())
        })
    }

    fn transition<F>(&self, apply: F) -> Result<SyncState, ReplicaError>
    where
        F: FnOnce(&mut SyncState) -> Result<(), ReplicaError>,
    {
        let (updated, changed) = {
            let mut slot = self.lock()?;
            let current = self.loaded(&mut slot)?;
            let mut next = current.clone();
            apply(&mut next)?;
            let changed = next != *current;
            if changed {
                self.store.save_sync_state(&next)?;
                *slot = Some(next.clone());
            }
            (next, changed)
        };
        if changed {
            self.publish(&updated);
        }
        Ok(updated)
    }

    fn loaded<'g>(&self, slot: &'g mut Option<SyncState>) -> Result<&'g SyncState, StoreError> {
        if slot.is_none() {
            let mut state = self.store.load_sync_state()?.unwrap_or_default();
            if state.is_syncing() {
                warn!(
                    sync_type = ?state.sync_type,
                    progress = state.progress_current,
                    "previous sync did not finish, marking it failed"
                );
                state.status = SyncStatus::Failed;
                state.last_error = Some(INTERRUPTED.to_string());
                self.store.save_sync_state(&state)?;
            }
            *slot = Some(state);
        }
        match slot {
            Some(state) => Ok(state),
            None => Err(StoreError::Fault("sync state missing after load".into())),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<SyncState>>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::LockPoisoned("sync state"))
    }

    #[cfg(feature = "emitter")]
    fn publish(&self, state: &SyncState) {
        if let Some(events) = &self.events {
            events.publish(SYNC_STATE_EVENT, state);
        }
    }

    #[cfg(not(feature = "emitter"))]
    fn publish(&self, _state: &SyncState) {}
}

fn advance_progress(state: &mut SyncState, current: u64, total: u64) {
    if current < state.progress_current {
        debug!(current, last = state.progress_current, "progress regression ignored");
        return;
    }
    state.progress_current = current;
    state.progress_total = total.max(current);
}
