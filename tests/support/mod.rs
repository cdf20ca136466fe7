#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;

use catalog_replica::{
    BatchOptions, CancellationToken, CatalogEntity, CatalogRecord, CatalogSource, EntityStore,
    InMemoryEntityStore, ObjectType, PageRequest, SourceError, SourcePage, StoreError, SyncState,
    WriterGate,
};
use serde_json::json;

pub fn item(id: &str, version: i64, name: &str, image_ids: &[&str]) -> CatalogRecord {
    CatalogRecord::new(
        ObjectType::Item,
        id,
        version,
        json!({ "name": name, "image_ids": image_ids }),
    )
}

pub fn item_in_category(id: &str, version: i64, name: &str, category_id: &str) -> CatalogRecord {
    CatalogRecord::new(
        ObjectType::Item,
        id,
        version,
        json!({ "name": name, "category_id": category_id }),
    )
}

pub fn image(id: &str, version: i64) -> CatalogRecord {
    CatalogRecord::new(
        ObjectType::Image,
        id,
        version,
        json!({ "url": format!("https://cdn.example/{id}.jpg") }),
    )
}

pub fn category(id: &str, version: i64, name: &str) -> CatalogRecord {
    CatalogRecord::new(ObjectType::Category, id, version, json!({ "name": name }))
}

pub fn tax(id: &str, version: i64, name: &str) -> CatalogRecord {
    CatalogRecord::new(ObjectType::Tax, id, version, json!({ "name": name }))
}

/// `count` distinct categories named `C001`, `C002`, ...
pub fn categories(count: usize) -> Vec<CatalogRecord> {
    (1..=count)
        .map(|n| category(&format!("C{n:03}"), 1, &format!("Category {n}")))
        .collect()
}

pub fn quiet_options(checkpoint_interval: usize) -> BatchOptions {
    BatchOptions {
        checkpoint_interval,
        yield_between_checkpoints: false,
        ..BatchOptions::default()
    }
}

/// Store wrapper that counts commits. Once the allowance runs out it either
/// fails every further commit, like a disk filling up, or cancels a token
/// right after the last allowed one, like a user pressing stop.
#[derive(Clone)]
pub struct FaultyStore<S = InMemoryEntityStore> {
    inner: S,
    commits_left: Arc<AtomicUsize>,
    cancel: Option<CancellationToken>,
}

impl FaultyStore {
    pub fn failing_after(successful_commits: usize) -> Self {
        Self {
            inner: InMemoryEntityStore::new(),
            commits_left: Arc::new(AtomicUsize::new(successful_commits)),
            cancel: None,
        }
    }
}

impl<S: EntityStore> FaultyStore<S> {
    pub fn cancelling_after(inner: S, commits: usize, cancel: CancellationToken) -> Self {
        Self {
            inner,
            commits_left: Arc::new(AtomicUsize::new(commits)),
            cancel: Some(cancel),
        }
    }

    pub fn heal(&self) {
        self.commits_left.store(usize::MAX, Ordering::SeqCst);
    }
}

impl<S: EntityStore> EntityStore for FaultyStore<S> {
    fn get_entity<E: CatalogEntity>(&self, id: &str) -> Result<Option<E>, StoreError> {
        self.inner.get_entity(id)
    }

    fn put_entity<E: CatalogEntity>(&self, entity: &E) -> Result<(), StoreError> {
        self.inner.put_entity(entity)
    }

    fn find_entities<E: CatalogEntity>(
        &self,
        predicate: &dyn Fn(&E) -> bool,
    ) -> Result<Vec<E>, StoreError> {
        self.inner.find_entities(predicate)
    }

    fn entity_version(&self, kind: ObjectType, id: &str) -> Result<Option<i64>, StoreError> {
        self.inner.entity_version(kind, id)
    }

    fn is_active(&self, kind: ObjectType, id: &str) -> Result<bool, StoreError> {
        self.inner.is_active(kind, id)
    }

    fn count_active(&self, kind: ObjectType) -> Result<usize, StoreError> {
        self.inner.count_active(kind)
    }

    fn load_sync_state(&self) -> Result<Option<SyncState>, StoreError> {
        self.inner.load_sync_state()
    }

    fn save_sync_state(&self, state: &SyncState) -> Result<(), StoreError> {
        self.inner.save_sync_state(state)
    }

    fn commit(&self) -> Result<usize, StoreError> {
        if self.inner.uncommitted_len()? == 0 {
            return Ok(0);
        }
        let previous = self
            .commits_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        match (previous, &self.cancel) {
            (Err(_), None) => Err(StoreError::Fault("disk full".into())),
            (Ok(1), Some(cancel)) => {
                let committed = self.inner.commit()?;
                cancel.cancel();
                Ok(committed)
            }
            _ => self.inner.commit(),
        }
    }

    fn discard_uncommitted(&self) -> Result<usize, StoreError> {
        self.inner.discard_uncommitted()
    }

    fn uncommitted_len(&self) -> Result<usize, StoreError> {
        self.inner.uncommitted_len()
    }

    fn writer_gate(&self) -> &WriterGate {
        self.inner.writer_gate()
    }
}

struct Pause {
    page: usize,
    reached: Sender<()>,
    resume: Receiver<()>,
}

/// A remote catalog served from memory. Page `n` is addressed by the cursor
/// `page-n`; the first page by no cursor.
pub struct ScriptedSource {
    pages: Vec<Vec<CatalogRecord>>,
    watermark: Option<String>,
    fail_on_page: Option<usize>,
    pause_before: Option<Pause>,
    pub requests: Vec<PageRequest>,
}

impl ScriptedSource {
    pub fn new(pages: Vec<Vec<CatalogRecord>>) -> Self {
        Self {
            pages,
            watermark: None,
            fail_on_page: None,
            pause_before: None,
            requests: Vec::new(),
        }
    }

    pub fn with_watermark(mut self, watermark: &str) -> Self {
        self.watermark = Some(watermark.to_string());
        self
    }

    /// Fail the first request for `page`, then serve it normally.
    pub fn failing_once_on(mut self, page: usize) -> Self {
        self.fail_on_page = Some(page);
        self
    }

    /// Before serving `page`, notify `reached` and block until `resume`
    /// receives a message.
    pub fn pausing_before(
        mut self,
        page: usize,
        reached: Sender<()>,
        resume: Receiver<()>,
    ) -> Self {
        self.pause_before = Some(Pause {
            page,
            reached,
            resume,
        });
        self
    }

    fn page_index(cursor: Option<&str>) -> Result<usize, SourceError> {
        match cursor {
            None => Ok(0),
            Some(cursor) => cursor
                .strip_prefix("page-")
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| SourceError::InvalidCursor(cursor.to_string())),
        }
    }
}

impl CatalogSource for ScriptedSource {
    fn fetch_page(&mut self, request: &PageRequest) -> Result<SourcePage, SourceError> {
        self.requests.push(request.clone());
        let index = Self::page_index(request.cursor.as_deref())?;

        if self.pause_before.as_ref().is_some_and(|p| p.page == index) {
            if let Some(pause) = self.pause_before.take() {
                let _ = pause.reached.send(());
                let _ = pause.resume.recv();
            }
        }
        if self.fail_on_page == Some(index) {
            self.fail_on_page = None;
            return Err(SourceError::Unavailable("connection reset".into()));
        }

        let records = self
            .pages
            .get(index)
            .cloned()
            .ok_or_else(|| SourceError::InvalidCursor(format!("page-{index}")))?;
        let next_cursor = (index + 1 < self.pages.len()).then(|| format!("page-{}", index + 1));
        Ok(SourcePage {
            records,
            next_cursor,
            watermark: self.watermark.clone(),
            total_hint: Some(self.pages.iter().map(Vec::len).sum::<usize>() as u64),
        })
    }
}
