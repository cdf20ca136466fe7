#[cfg(feature = "emitter")]
use std::sync::Arc;

use tracing::{info, warn};

use super::{CatalogSource, PageRequest, SyncCoordinator, SyncState, SyncType};
use crate::batch::{BatchProcessor, BatchResult, CancellationToken};
use crate::config::ReplicaConfig;
use crate::error::ReplicaError;
use crate::link::LinkReport;
use crate::record::CatalogRecord;
use crate::stats::StatsAggregator;
use crate::store::EntityStore;

#[cfg(feature = "emitter")]
use super::events::SyncEvents;

/// Summary of one finished sync cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub sync_type: SyncType,
    pub pages: usize,
    pub result: BatchResult,
    pub link: LinkReport,
    /// Page cursor the cycle started from, when it resumed a failed pass.
    pub resumed_from: Option<String>,
    /// Records of that page skipped because an earlier attempt committed them.
    pub resumed_offset: usize,
}

/// Drives full and incremental cycles against a [`CatalogSource`].
///
/// The coordinator, the stats aggregator and the batches all share one
/// store; clones of the store share its writer gate.
pub struct CatalogSync<S: EntityStore + Clone> {
    store: S,
    config: ReplicaConfig,
    coordinator: SyncCoordinator<S>,
    stats: StatsAggregator<S>,
}

impl<S: EntityStore + Clone> CatalogSync<S> {
    pub fn new(store: S, config: ReplicaConfig) -> Self {
        Self {
            coordinator: SyncCoordinator::new(store.clone()),
            stats: StatsAggregator::new(store.clone()),
            store,
            config,
        }
    }

    #[cfg(feature = "emitter")]
    pub fn with_events(store: S, config: ReplicaConfig, events: Arc<SyncEvents>) -> Self {
        Self {
            coordinator: SyncCoordinator::with_events(store.clone(), Arc::clone(&events)),
            stats: StatsAggregator::with_events(store.clone(), events),
            store,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn coordinator(&self) -> &SyncCoordinator<S> {
        &self.coordinator
    }

    pub fn stats(&self) -> &StatsAggregator<S> {
        &self.stats
    }

    pub fn run_full_sync(
        &self,
        source: &mut dyn CatalogSource,
    ) -> Result<SyncReport, ReplicaError> {
        self.run(SyncType::Full, source, &CancellationToken::new())
    }

    pub fn run_incremental_sync(
        &self,
        source: &mut dyn CatalogSource,
    ) -> Result<SyncReport, ReplicaError> {
        self.run(SyncType::Incremental, source, &CancellationToken::new())
    }

    /// Apply pushed records immediately. Push delivery does not open a sync
    /// cycle, so the coordinator state is left alone.
    pub fn apply_push(&self, records: Vec<CatalogRecord>) -> Result<BatchResult, ReplicaError> {
        let count = records.len();
        let processor =
            BatchProcessor::new(&self.store, self.config.batch_options(SyncType::Incremental));
        let result = processor.process_batch(records)?;
        self.stats.force_refresh()?;
        info!(
            records = count,
            applied = result.applied,
            skipped = result.skipped,
            failed = result.failed,
            "applied pushed records"
        );
        Ok(result)
    }

    /// Run one cycle. `cancel` stops it at the next checkpoint; the state is
    /// then `Failed` with the position of the last committed checkpoint.
    pub fn run(
        &self,
        sync_type: SyncType,
        source: &mut dyn CatalogSource,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, ReplicaError> {
        let started = self.coordinator.start_sync(sync_type)?;
        self.stats.reset_to_zero()?;

        match self.run_cycle(sync_type, &started, source, cancel) {
            Ok(report) => {
                self.coordinator.complete_sync()?;
                self.stats.force_refresh()?;
                info!(
                    sync_type = %sync_type,
                    pages = report.pages,
                    applied = report.result.applied,
                    skipped = report.result.skipped,
                    failed = report.result.failed,
                    "sync cycle finished"
                );
                Ok(report)
            }
            Err(err) => {
                if let Err(fail_err) = self.coordinator.fail_sync(&err) {
                    warn!(error = %fail_err, "could not persist sync failure");
                }
                // Counts must not stay at zero after an aborted cycle.
                if let Err(stats_err) = self.stats.force_refresh() {
                    warn!(error = %stats_err, "could not refresh stats after failed sync");
                }
                Err(err)
            }
        }
    }

    fn run_cycle(
        &self,
        sync_type: SyncType,
        started: &SyncState,
        source: &mut dyn CatalogSource,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, ReplicaError> {
        let full = sync_type == SyncType::Full;
        let resumed_from = if full {
            started.last_page_cursor.clone()
        } else {
            None
        };
        // Records of the first page that an earlier attempt already committed.
        let mut skip = if full {
            started.last_page_offset as usize
        } else {
            0
        };
        if full && (resumed_from.is_some() || skip > 0) {
            info!(
                cursor = resumed_from.as_deref().unwrap_or(""),
                offset = skip,
                "resuming full sync"
            );
        }
        let resumed_offset = skip;

        let mut request = PageRequest {
            cursor: resumed_from.clone(),
            since: if full {
                None
            } else {
                started.last_incremental_cursor.clone()
            },
        };
        let processor = BatchProcessor::new(&self.store, self.config.batch_options(sync_type))
            .with_cancellation(cancel.clone());

        let mut result = BatchResult::default();
        let mut pages = 0usize;
        let mut watermark: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(ReplicaError::Cancelled {
                    committed: result.total(),
                });
            }

            let page = source.fetch_page(&request)?;
            pages += 1;
            let page_skip = std::mem::take(&mut skip);
            let before = result.total();
            let position = (before + resumed_offset) as u64;
            let total_hint = page.total_hint;
            let page_cursor = request.cursor.clone();
            let records = page.records.into_iter().skip(page_skip);

            let ingested = processor.ingest(records, |checkpoint| {
                let current = position + checkpoint.records_committed as u64;
                let total = total_hint.unwrap_or(current);
                if full {
                    let offset = (page_skip + checkpoint.records_committed) as u64;
                    self.coordinator
                        .record_checkpoint(current, total, page_cursor.clone(), offset)?;
                } else {
                    self.coordinator.update_progress(current, total)?;
                }
                Ok(())
            });
            let page_result = match ingested {
                Ok(page_result) => page_result,
                Err(ReplicaError::Cancelled { committed }) => {
                    return Err(ReplicaError::Cancelled {
                        committed: before + committed,
                    });
                }
                Err(err) => return Err(err),
            };
            result.merge(page_result);

            // The page is committed; only now may the cursor move past it.
            if full {
                self.coordinator.record_page_cursor(page.next_cursor.clone())?;
            }
            if page.watermark.is_some() {
                watermark = page.watermark;
            }

            match page.next_cursor {
                Some(next) => request.cursor = Some(next),
                None => break,
            }
        }

        let link = processor.finish()?;
        if let Some(watermark) = watermark {
            self.coordinator.record_incremental_cursor(watermark)?;
        }

        Ok(SyncReport {
            sync_type,
            pages,
            result,
            link,
            resumed_from,
            resumed_offset,
        })
    }
}
