//! Background sync worker.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::error;

use super::{CatalogSource, CatalogSync, SyncReport, SyncType};
use crate::batch::CancellationToken;
use crate::error::ReplicaError;
use crate::store::EntityStore;

/// Runs one sync cycle on its own thread.
///
/// ## Example
///
/// ```ignore
/// use std::sync::Arc;
/// use catalog_replica::{
///     CatalogSync, InMemoryEntityStore, ReplicaConfig, SyncType, SyncWorkerThread,
/// };
///
/// let sync = Arc::new(CatalogSync::new(InMemoryEntityStore::new(), ReplicaConfig::default()));
/// let worker = SyncWorkerThread::spawn(Arc::clone(&sync), source, SyncType::Full);
///
/// // ... the presentation layer keeps reading sync.coordinator().state() ...
///
/// // Cancel at the next checkpoint and collect the outcome
/// let outcome = worker.stop();
/// ```
pub struct SyncWorkerThread {
    cancel: CancellationToken,
    handle: Option<JoinHandle<Result<SyncReport, ReplicaError>>>,
}

impl SyncWorkerThread {
    pub fn spawn<S, C>(sync: Arc<CatalogSync<S>>, mut source: C, sync_type: SyncType) -> Self
    where
        S: EntityStore + Clone + 'static,
        C: CatalogSource + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = thread::spawn(move || sync.run(sync_type, &mut source, &token));
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Signal cancellation without waiting. Takes effect at the next
    /// checkpoint boundary.
    pub fn signal_stop(&self) {
        self.cancel.cancel();
    }

    /// Cancel at the next checkpoint and wait for the outcome.
    pub fn stop(self) -> Result<SyncReport, ReplicaError> {
        self.cancel.cancel();
        self.join()
    }

    /// Wait for the cycle to finish on its own.
    pub fn join(mut self) -> Result<SyncReport, ReplicaError> {
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                error!("sync worker thread panicked");
                Err(ReplicaError::WorkerPanicked)
            }),
            None => Err(ReplicaError::WorkerPanicked),
        }
    }
}

impl Drop for SyncWorkerThread {
    fn drop(&mut self) {
        // Don't join on drop; the cycle stops at its next checkpoint.
        if self.handle.is_some() {
            self.cancel.cancel();
        }
    }
}
