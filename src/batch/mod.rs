//! Chunked ingestion with checkpoints.
//!
//! Records are applied in arrival order while the writer gate is held. Every
//! `checkpoint_interval` records the processor commits, reports the
//! checkpoint, releases the gate and yields; cancellation is observed only
//! there, so a cancelled or crashed run always stops on a committed boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, info};

use crate::error::{ReplicaError, StoreError};
use crate::link::{LinkReport, RelationshipLinker, RelinkPolicy};
use crate::record::CatalogRecord;
use crate::resolve::Resolver;
use crate::store::{EntityStore, WriterGuard};
use crate::upsert::{SkipReason, UpsertEngine, UpsertOutcome};

pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 50;

/// Shared flag asking a running batch to stop at its next checkpoint.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub checkpoint_interval: usize,
    pub relink_policy: RelinkPolicy,
    /// Run the name repair pass after relinking.
    pub repair_denormalized: bool,
    pub yield_between_checkpoints: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            relink_policy: RelinkPolicy::FULL_REBUILD,
            repair_denormalized: true,
            yield_between_checkpoints: true,
        }
    }
}

/// Per-record outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub applied: usize,
    /// Stale versions.
    pub skipped: usize,
    /// Records rejected for an invalid payload.
    pub failed: usize,
}

impl BatchResult {
    pub fn total(&self) -> usize {
        self.applied + self.skipped + self.failed
    }

    pub fn merge(&mut self, other: BatchResult) {
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    fn record(&mut self, outcome: &UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted | UpsertOutcome::Updated => self.applied += 1,
            UpsertOutcome::Skipped(SkipReason::StaleVersion { .. }) => self.skipped += 1,
            UpsertOutcome::Skipped(SkipReason::InvalidPayload(_)) => self.failed += 1,
        }
    }
}

/// A durable commit point reached during ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// Records consumed from the input so far, all of them committed.
    pub records_committed: usize,
    /// Id of the last record covered by this checkpoint.
    pub last_record_id: Option<String>,
}

pub struct BatchProcessor<'a, S> {
    store: &'a S,
    options: BatchOptions,
    cancel: CancellationToken,
}

impl<'a, S: EntityStore> BatchProcessor<'a, S> {
    pub fn new(store: &'a S, options: BatchOptions) -> Self {
        Self {
            store,
            options,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Ingest a whole stream, then relink and repair once.
    pub fn process_batch<I>(&self, records: I) -> Result<BatchResult, ReplicaError>
    where
        I: IntoIterator<Item = CatalogRecord>,
    {
        let result = self.ingest(records, |_| Ok(()))?;
        self.finish()?;
        Ok(result)
    }

    /// Apply records in order, committing every `checkpoint_interval`.
    ///
    /// `on_checkpoint` runs after each commit, including the final one, and
    /// before the gate is released. An error from it aborts ingestion.
    pub fn ingest<I, F>(
        &self,
        records: I,
        mut on_checkpoint: F,
    ) -> Result<BatchResult, ReplicaError>
    where
        I: IntoIterator<Item = CatalogRecord>,
        F: FnMut(&Checkpoint) -> Result<(), ReplicaError>,
    {
        let interval = self.options.checkpoint_interval.max(1);
        let engine = UpsertEngine::new(self.store);
        let mut result = BatchResult::default();
        let mut consumed = 0usize;
        let mut since_checkpoint = 0usize;
        let mut last_record_id: Option<String> = None;

        let mut guard = self.store.writer_gate().acquire()?;
        for record in records {
            let outcome = match engine.apply_locked(&guard, &record) {
                Ok(outcome) => outcome,
                Err(err) => return Err(self.abort(err, consumed)),
            };
            result.record(&outcome);
            consumed += 1;
            since_checkpoint += 1;
            last_record_id = Some(record.id);

            if since_checkpoint < interval {
                continue;
            }
            since_checkpoint = 0;
            let checkpoint = Checkpoint {
                records_committed: consumed,
                last_record_id: last_record_id.clone(),
            };
            self.checkpoint(&guard, &checkpoint)?;
            on_checkpoint(&checkpoint)?;

            drop(guard);
            if self.options.yield_between_checkpoints {
                thread::yield_now();
            }
            if self.cancel.is_cancelled() {
                info!(committed = consumed, "batch cancelled at checkpoint");
                return Err(ReplicaError::Cancelled {
                    committed: consumed,
                });
            }
            guard = self.store.writer_gate().acquire()?;
        }

        if since_checkpoint > 0 {
            let checkpoint = Checkpoint {
                records_committed: consumed,
                last_record_id,
            };
            self.checkpoint(&guard, &checkpoint)?;
            on_checkpoint(&checkpoint)?;
        }

        debug!(
            applied = result.applied,
            skipped = result.skipped,
            failed = result.failed,
            "ingested records"
        );
        Ok(result)
    }

    /// The once-per-cycle pass after ingestion: relink images, optionally
    /// repair cached names, commit.
    pub fn finish(&self) -> Result<LinkReport, ReplicaError> {
        let guard = self.store.writer_gate().acquire()?;
        self.finish_locked(&guard)
            .map_err(|err| self.abort(err, 0))
    }

    fn finish_locked(&self, guard: &WriterGuard<'_>) -> Result<LinkReport, StoreError> {
        let report = RelationshipLinker::new(self.store)
            .relink_all_locked(guard, self.options.relink_policy)?;
        if self.options.repair_denormalized {
            Resolver::new(self.store).repair_all(guard)?;
        }
        self.store.commit()?;
        Ok(report)
    }

    fn checkpoint(
        &self,
        _guard: &WriterGuard<'_>,
        checkpoint: &Checkpoint,
    ) -> Result<(), ReplicaError> {
        if let Err(err) = self.store.commit() {
            return Err(self.abort(err, checkpoint.records_committed));
        }
        info!(
            committed = checkpoint.records_committed,
            last_record_id = checkpoint.last_record_id.as_deref().unwrap_or(""),
            "checkpoint committed"
        );
        Ok(())
    }

    /// Drop whatever the failed chunk left uncommitted so the store stays on
    /// its last checkpoint.
    fn abort(&self, err: StoreError, consumed: usize) -> ReplicaError {
        error!(error = %err, consumed, "storage fault, aborting batch");
        if let Err(discard_err) = self.store.discard_uncommitted() {
            error!(error = %discard_err, "failed to discard uncommitted writes");
        }
        ReplicaError::Storage(err)
    }
}
