use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Completed,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncType {
    /// Walk the whole catalog page by page.
    Full,
    /// Fetch changes since the last incremental watermark.
    Incremental,
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncType::Full => f.write_str("full"),
            SyncType::Incremental => f.write_str("incremental"),
        }
    }
}

/// Persisted progress of the replica's synchronization. One per store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub status: SyncStatus,
    pub progress_current: u64,
    pub progress_total: u64,
    pub sync_type: Option<SyncType>,
    pub last_error: Option<String>,
    /// Position inside the current full-sync pass. Only advanced after the
    /// records before it are committed.
    pub last_page_cursor: Option<String>,
    /// Records of the page at `last_page_cursor` already committed. A
    /// resumed pass skips this many before applying.
    pub last_page_offset: u64,
    /// Watermark for "changes since" queries.
    pub last_incremental_cursor: Option<String>,
    pub attempt_count: u32,
    pub last_sync_time: Option<SystemTime>,
}

impl SyncState {
    pub fn is_syncing(&self) -> bool {
        self.status == SyncStatus::Syncing
    }
}
