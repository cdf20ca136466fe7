//! Deferred item to image linking.
//!
//! Items declare their images by id, but an image may arrive later in the
//! same stream (or never). Edges are therefore materialized in a separate
//! pass over the store, once a whole batch has been ingested.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::entity::{CatalogEntity, ItemEntity};
use crate::error::StoreError;
use crate::record::ObjectType;
use crate::store::{EntityStore, WriterGuard};

/// How a relink treats edges already on an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelinkPolicy {
    /// Rebuild from the payload alone. When false, previous edges whose image
    /// is still present are kept and new ones are appended.
    pub clear_existing: bool,
}

impl RelinkPolicy {
    pub const FULL_REBUILD: RelinkPolicy = RelinkPolicy {
        clear_existing: true,
    };
    pub const ADDITIVE: RelinkPolicy = RelinkPolicy {
        clear_existing: false,
    };
}

impl Default for RelinkPolicy {
    fn default() -> Self {
        Self::FULL_REBUILD
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkReport {
    pub items_scanned: usize,
    pub edges_linked: usize,
    pub missing_references: usize,
    pub items_changed: usize,
}

pub struct RelationshipLinker<'a, S> {
    store: &'a S,
}

impl<'a, S: EntityStore> RelationshipLinker<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn relink_all(&self, policy: RelinkPolicy) -> Result<LinkReport, StoreError> {
        let guard = self.store.writer_gate().acquire()?;
        self.relink_all_locked(&guard, policy)
    }

    /// One pass over every live item. Only items whose edge set changes are
    /// rewritten, so repeated runs converge without duplicating edges.
    pub fn relink_all_locked(
        &self,
        _guard: &WriterGuard<'_>,
        policy: RelinkPolicy,
    ) -> Result<LinkReport, StoreError> {
        let items = self.store.find_entities::<ItemEntity>(&|item| !item.is_deleted())?;
        let mut report = LinkReport::default();

        for mut item in items {
            report.items_scanned += 1;

            let mut edges: Vec<String> = Vec::new();
            if !policy.clear_existing {
                for id in &item.image_refs {
                    if self.store.is_active(ObjectType::Image, id)? {
                        edges.push(id.clone());
                    }
                }
            }

            for image_id in item.declared_image_ids() {
                if edges.contains(&image_id) {
                    continue;
                }
                if self.store.is_active(ObjectType::Image, &image_id)? {
                    edges.push(image_id);
                } else {
                    report.missing_references += 1;
                    debug!(
                        item_id = %item.id(),
                        image_id = %image_id,
                        "image not present, edge skipped"
                    );
                }
            }

            report.edges_linked += edges.len();
            if edges != item.image_refs {
                item.image_refs = edges;
                self.store.put_entity(&item)?;
                report.items_changed += 1;
            }
        }

        info!(
            items = report.items_scanned,
            edges = report.edges_linked,
            missing = report.missing_references,
            changed = report.items_changed,
            clear_existing = policy.clear_existing,
            "relinked item images"
        );
        Ok(report)
    }
}
