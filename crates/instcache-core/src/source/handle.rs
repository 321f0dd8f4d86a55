//! Opened inventory handle.

use super::{Source, SourceDetails};
use crate::config::SourceConfig;
use crate::index::{InventoryIndex, SearchRequest, SearchResult};
use crate::lock::{LockHandle, LockMode};
use crate::models::{IndexedEntry, MetadataKind, RowId};
use crate::reconcile::ReconcileReport;
use crate::Result;
use serde::Serialize;

/// What happened to the cache contents while reusing an existing file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RefreshOutcome {
    /// This process ran the update.
    Refreshed(ReconcileReport),
    /// Another process was refreshing; this one waited for it to finish.
    WaitedForPeer,
}

/// Which tier produced a handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "tier", rename_all = "camelCase")]
pub enum CacheOutcome {
    Reused { refresh: RefreshOutcome },
    RebuiltOnDisk { populate: ReconcileReport },
    InMemory { populate: ReconcileReport },
}

impl CacheOutcome {
    /// Whether the handle is backed by the shared on-disk cache.
    pub fn is_persistent(&self) -> bool {
        !matches!(self, CacheOutcome::InMemory { .. })
    }
}

/// An open view of the installed inventory.
///
/// Holds the index and the lock that keeps the cache file alive. Fields drop
/// in declaration order: the index closes before the lock is released.
pub struct InventoryHandle {
    details: SourceDetails,
    outcome: CacheOutcome,
    index: InventoryIndex,
    lock: LockHandle,
}

impl InventoryHandle {
    pub(crate) fn new(
        details: SourceDetails,
        index: InventoryIndex,
        lock: LockHandle,
        outcome: CacheOutcome,
    ) -> Self {
        Self {
            details,
            outcome,
            index,
            lock,
        }
    }

    pub fn outcome(&self) -> &CacheOutcome {
        &self.outcome
    }

    /// Number of indexed entries.
    pub fn count(&self) -> Result<usize> {
        self.index.count()
    }

    pub fn is_in_memory(&self) -> bool {
        self.index.is_in_memory()
    }

    /// Mode of the held cache lock, `None` for the null lock.
    pub fn lock_mode(&self) -> Option<LockMode> {
        self.lock.mode()
    }
}

impl Source for InventoryHandle {
    fn details(&self) -> &SourceDetails {
        &self.details
    }

    fn identifier(&self) -> &str {
        SourceConfig::SOURCE_IDENTIFIER
    }

    fn search(&self, request: &SearchRequest) -> Result<SearchResult> {
        self.index.search(request)
    }

    fn get_entry(&self, row_id: RowId) -> Result<Option<IndexedEntry>> {
        self.index.get_entry(row_id)
    }

    fn get_metadata(&self, row_id: RowId, kind: MetadataKind) -> Result<Option<String>> {
        self.index.get_metadata(row_id, kind)
    }
}

impl std::fmt::Debug for InventoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryHandle")
            .field("details", &self.details)
            .field("outcome", &self.outcome)
            .field("db_path", &self.index.db_path())
            .field("lock", &self.lock)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SchemaVersion;
    use crate::models::{InstallScope, InstalledItem, Origin};

    fn memory_handle() -> InventoryHandle {
        let index = InventoryIndex::create_in_memory(SchemaVersion::LATEST).unwrap();
        let item = InstalledItem::new(Origin::System(InstallScope::Machine), "git", "git", "2.43")
            .with_display_name("Git");
        index.add_entry(&item, &item.source_key()).unwrap();

        InventoryHandle::new(
            SourceDetails::installed(),
            index,
            LockHandle::null(),
            CacheOutcome::InMemory {
                populate: ReconcileReport::default(),
            },
        )
    }

    #[test]
    fn test_handle_delegates_to_index() {
        let handle = memory_handle();

        assert_eq!(handle.identifier(), "*PredefinedInstalledSource");
        assert_eq!(handle.count().unwrap(), 1);
        assert!(handle.is_in_memory());
        assert_eq!(handle.lock_mode(), None);
        assert!(!handle.outcome().is_persistent());

        let result = handle.search(&SearchRequest::all().with_query("GIT")).unwrap();
        assert_eq!(result.total_count, 1);
        let row_id = result.matches[0].row_id;
        assert_eq!(handle.get_entry(row_id).unwrap().unwrap().name, "Git");
    }

    #[test]
    fn test_outcome_serializes_with_tier_tag() {
        let outcome = CacheOutcome::Reused {
            refresh: RefreshOutcome::WaitedForPeer,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["tier"], "reused");
        assert_eq!(json["refresh"]["kind"], "waitedForPeer");
    }
}
