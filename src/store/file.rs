//! FileEntityStore - durable replica store on the local filesystem.
//!
//! Layout inside the data directory:
//!
//! ```text
//! CURRENT                              name of the live generation
//! gen-000042/items.jsonl, ...          one JSON row per entity, per collection
//! sync_state.bin                       bitcode-encoded SyncState singleton
//! ```
//!
//! A commit writes a complete new generation next to the live one and then
//! swaps `CURRENT` with a single rename. Until that rename nothing a reader
//! of the directory can see has changed, so a failed or interrupted commit
//! leaves exactly the previous checkpoint.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use super::in_memory::StoredEntity;
use super::{EntityStore, InMemoryEntityStore, WriterGate};
use crate::entity::CatalogEntity;
use crate::error::StoreError;
use crate::record::ObjectType;
use crate::sync::SyncState;

const CURRENT_FILE: &str = "CURRENT";
const GENERATION_PREFIX: &str = "gen-";
const SYNC_STATE_FILE: &str = "sync_state.bin";

/// Replica store persisted to a directory. Clones share the same state.
#[derive(Clone)]
pub struct FileEntityStore {
    dir: Arc<PathBuf>,
    generation: Arc<Mutex<u64>>,
    memory: InMemoryEntityStore,
}

impl std::fmt::Debug for FileEntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileEntityStore")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl FileEntityStore {
    /// Open (or create) a store, loading the last committed checkpoint.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let generation = read_current(&dir)?;
        remove_stale_generations(&dir, generation);

        let memory = InMemoryEntityStore::new();
        let mut loaded = 0usize;
        if let Some(generation) = generation {
            let live = generation_dir(&dir, generation);
            for kind in all_kinds() {
                let path = live.join(collection_file(kind));
                if !path.exists() {
                    continue;
                }
                let mut rows = Vec::new();
                for line in BufReader::new(File::open(&path)?).lines() {
                    let line = line?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    rows.push(StoredEntity::from_row(kind, line.into_bytes())?);
                }
                loaded += rows.len();
                memory.load_committed(kind, rows)?;
            }
        }

        let state_path = dir.join(SYNC_STATE_FILE);
        if state_path.exists() {
            let bytes = fs::read(&state_path)?;
            let state: SyncState =
                bitcode::deserialize(&bytes).map_err(|e| StoreError::Codec(e.to_string()))?;
            memory.save_sync_state(&state)?;
        }

        info!(
            dir = %dir.display(),
            generation = generation.unwrap_or(0),
            entities = loaded,
            "opened replica store"
        );
        Ok(Self {
            dir: Arc::new(dir),
            generation: Arc::new(Mutex::new(generation.unwrap_or(0))),
            memory,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write generation `next`: touched collections from `rows`, the rest
    /// copied from `previous`. Then point `CURRENT` at it.
    fn publish_generation(
        &self,
        previous: u64,
        next: u64,
        rows: &[(ObjectType, Vec<&[u8]>)],
    ) -> Result<(), StoreError> {
        let staging = generation_dir(&self.dir, next);
        fs::create_dir_all(&staging)?;

        for kind in all_kinds() {
            let target = staging.join(collection_file(kind));
            match rows.iter().find(|(touched, _)| *touched == kind) {
                Some((_, rows)) => {
                    let mut contents = Vec::new();
                    for row in rows {
                        contents.extend_from_slice(row);
                        contents.push(b'\n');
                    }
                    write_atomic(&target, &contents)?;
                    debug!(collection = kind.collection(), rows = rows.len(), "wrote collection");
                }
                None if previous > 0 => {
                    let source = generation_dir(&self.dir, previous).join(collection_file(kind));
                    if source.exists() {
                        fs::copy(&source, &target)?;
                    }
                }
                None => {}
            }
        }
        sync_dir(&staging)?;

        write_atomic(&self.dir.join(CURRENT_FILE), generation_name(next).as_bytes())?;
        sync_dir(&self.dir)?;
        Ok(())
    }
}

fn all_kinds() -> impl Iterator<Item = ObjectType> {
    ObjectType::KNOWN.into_iter().chain([ObjectType::Unknown])
}

fn collection_file(kind: ObjectType) -> String {
    format!("{}.jsonl", kind.collection())
}

fn generation_name(generation: u64) -> String {
    format!("{GENERATION_PREFIX}{generation:06}")
}

fn generation_dir(dir: &Path, generation: u64) -> PathBuf {
    dir.join(generation_name(generation))
}

fn read_current(dir: &Path) -> Result<Option<u64>, StoreError> {
    let contents = match fs::read_to_string(dir.join(CURRENT_FILE)) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    contents
        .trim()
        .strip_prefix(GENERATION_PREFIX)
        .and_then(|n| n.parse().ok())
        .map(Some)
        .ok_or_else(|| StoreError::Codec(format!("unreadable {CURRENT_FILE}: {contents:?}")))
}

/// Generations other than the live one are leftovers of an interrupted or
/// failed commit.
fn remove_stale_generations(dir: &Path, live: Option<u64>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let live = live.map(generation_name);
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(GENERATION_PREFIX) || live.as_deref() == Some(name.as_str()) {
            continue;
        }
        if let Err(err) = fs::remove_dir_all(entry.path()) {
            warn!(generation = %name, error = %err, "could not remove stale generation");
        }
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), StoreError> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), StoreError> {
    Ok(())
}

impl EntityStore for FileEntityStore {
    fn get_entity<E: CatalogEntity>(&self, id: &str) -> Result<Option<E>, StoreError> {
        self.memory.get_entity(id)
    }

    fn put_entity<E: CatalogEntity>(&self, entity: &E) -> Result<(), StoreError> {
        self.memory.put_entity(entity)
    }

    fn find_entities<E: CatalogEntity>(
        &self,
        predicate: &dyn Fn(&E) -> bool,
    ) -> Result<Vec<E>, StoreError> {
        self.memory.find_entities(predicate)
    }

    fn entity_version(&self, kind: ObjectType, id: &str) -> Result<Option<i64>, StoreError> {
        self.memory.entity_version(kind, id)
    }

    fn is_active(&self, kind: ObjectType, id: &str) -> Result<bool, StoreError> {
        self.memory.is_active(kind, id)
    }

    fn count_active(&self, kind: ObjectType) -> Result<usize, StoreError> {
        self.memory.count_active(kind)
    }

    fn load_sync_state(&self) -> Result<Option<SyncState>, StoreError> {
        self.memory.load_sync_state()
    }

    fn save_sync_state(&self, state: &SyncState) -> Result<(), StoreError> {
        let bytes = bitcode::serialize(state).map_err(|e| StoreError::Codec(e.to_string()))?;
        write_atomic(&self.dir.join(SYNC_STATE_FILE), &bytes)?;
        self.memory.save_sync_state(state)
    }

    fn commit(&self) -> Result<usize, StoreError> {
        let mut generation = self
            .generation
            .lock()
            .map_err(|_| StoreError::LockPoisoned("generation"))?;
        let previous = *generation;
        let next = previous + 1;

        let committed = self.memory.commit_with(|rows| {
            self.publish_generation(previous, next, rows).inspect_err(|_| {
                let _ = fs::remove_dir_all(generation_dir(&self.dir, next));
            })
        })?;
        if committed == 0 {
            return Ok(0);
        }

        *generation = next;
        if previous > 0 {
            if let Err(err) = fs::remove_dir_all(generation_dir(&self.dir, previous)) {
                warn!(generation = previous, error = %err, "could not remove old generation");
            }
        }
        debug!(generation = next, rows = committed, "checkpoint published");
        Ok(committed)
    }

    fn discard_uncommitted(&self) -> Result<usize, StoreError> {
        self.memory.discard_uncommitted()
    }

    fn uncommitted_len(&self) -> Result<usize, StoreError> {
        self.memory.uncommitted_len()
    }

    fn writer_gate(&self) -> &WriterGate {
        self.memory.writer_gate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchOptions, BatchProcessor};
    use crate::entity::{CategoryEntity, EntityMeta, ImageEntity};
    use crate::error::ReplicaError;
    use crate::record::{CatalogRecord, CategoryData, ImageData};
    use crate::sync::{SyncStatus, SyncType};
    use serde_json::json;

    fn category(id: &str) -> CategoryEntity {
        CategoryEntity::create(
            EntityMeta::new(id, 1, false),
            CategoryData {
                name: id.into(),
                parent_category: None,
            },
            json!({ "name": id }),
        )
    }

    fn image(id: &str, version: i64) -> ImageEntity {
        ImageEntity::create(
            EntityMeta::new(id, version, false),
            ImageData {
                url: format!("https://cdn.example/{id}.jpg"),
                ..ImageData::default()
            },
            json!({ "url": format!("https://cdn.example/{id}.jpg") }),
        )
    }

    #[test]
    fn reopen_sees_only_committed_rows() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileEntityStore::open(dir.path()).unwrap();
            store.put_entity(&image("IMG1", 1)).unwrap();
            store.commit().unwrap();
            store.put_entity(&image("IMG2", 1)).unwrap();
        }

        let reopened = FileEntityStore::open(dir.path()).unwrap();
        assert!(reopened.get_entity::<ImageEntity>("IMG1").unwrap().is_some());
        assert!(reopened.get_entity::<ImageEntity>("IMG2").unwrap().is_none());
    }

    #[test]
    fn sync_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let state = SyncState {
            status: SyncStatus::Failed,
            sync_type: Some(SyncType::Full),
            last_page_cursor: Some("page-7".into()),
            last_error: Some("disk full".into()),
            attempt_count: 2,
            ..SyncState::default()
        };
        FileEntityStore::open(dir.path())
            .unwrap()
            .save_sync_state(&state)
            .unwrap();

        let reopened = FileEntityStore::open(dir.path()).unwrap();
        assert_eq!(reopened.load_sync_state().unwrap(), Some(state));
    }

    #[test]
    fn commit_publishes_a_new_generation() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEntityStore::open(dir.path()).unwrap();
        store.put_entity(&image("IMG1", 1)).unwrap();
        store.commit().unwrap();
        store.put_entity(&image("IMG1", 2)).unwrap();
        store.put_entity(&image("IMG2", 1)).unwrap();
        store.commit().unwrap();

        let current = fs::read_to_string(dir.path().join(CURRENT_FILE)).unwrap();
        assert_eq!(current, "gen-000002");
        assert!(!generation_dir(dir.path(), 1).exists());
        let contents =
            fs::read_to_string(generation_dir(dir.path(), 2).join("images.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 2);

        let reopened = FileEntityStore::open(dir.path()).unwrap();
        assert_eq!(
            reopened.entity_version(ObjectType::Image, "IMG1").unwrap(),
            Some(2)
        );
    }

    #[test]
    fn untouched_collections_carry_over() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEntityStore::open(dir.path()).unwrap();
        store.put_entity(&image("IMG1", 1)).unwrap();
        store.commit().unwrap();
        store.put_entity(&category("C1")).unwrap();
        store.commit().unwrap();

        let reopened = FileEntityStore::open(dir.path()).unwrap();
        assert!(reopened.is_active(ObjectType::Image, "IMG1").unwrap());
        assert!(reopened.is_active(ObjectType::Category, "C1").unwrap());
    }

    #[test]
    fn failed_collection_write_leaves_the_previous_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileEntityStore::open(dir.path()).unwrap();
            store.put_entity(&category("C1")).unwrap();
            store.commit().unwrap();

            // Categories are written before images; block the image file.
            let blocked = generation_dir(dir.path(), 2).join("images.jsonl");
            fs::create_dir_all(blocked.join("occupied")).unwrap();

            let processor = BatchProcessor::new(&store, BatchOptions::default());
            let err = processor
                .process_batch(vec![
                    CatalogRecord::new(ObjectType::Category, "C2", 1, json!({"name": "Tea"})),
                    CatalogRecord::new(
                        ObjectType::Image,
                        "IMG1",
                        1,
                        json!({"url": "https://cdn.example/IMG1.jpg"}),
                    ),
                ])
                .unwrap_err();
            assert!(matches!(err, ReplicaError::Storage(StoreError::Io(_))));

            assert!(!store.is_active(ObjectType::Category, "C2").unwrap());
            assert!(!store.is_active(ObjectType::Image, "IMG1").unwrap());
            assert_eq!(
                fs::read_to_string(dir.path().join(CURRENT_FILE)).unwrap(),
                "gen-000001"
            );
        }

        let reopened = FileEntityStore::open(dir.path()).unwrap();
        assert!(reopened.is_active(ObjectType::Category, "C1").unwrap());
        assert!(!reopened.is_active(ObjectType::Category, "C2").unwrap());
        assert!(!reopened.is_active(ObjectType::Image, "IMG1").unwrap());
        assert!(!generation_dir(dir.path(), 2).exists());
    }
}
