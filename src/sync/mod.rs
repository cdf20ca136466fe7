//! Resumable synchronization against the remote catalog.
//!
//! [`SyncCoordinator`] owns the persisted [`SyncState`] machine
//! (`Idle -> Syncing -> Completed | Failed`). [`CatalogSync`] drives a
//! [`CatalogSource`] through the batch processor and moves the coordinator
//! along; [`SyncWorkerThread`] runs it in the background.

mod coordinator;
#[cfg(feature = "emitter")]
pub mod events;
mod runner;
mod source;
mod state;
mod thread;

pub use coordinator::SyncCoordinator;
pub use runner::{CatalogSync, SyncReport};
pub use source::{CatalogSource, PageRequest, SourcePage};
pub use state::{SyncState, SyncStatus, SyncType};
pub use thread::SyncWorkerThread;
