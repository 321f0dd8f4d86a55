//! Reconciliation of the inventory index against fresh enumerations.
//!
//! Two passes share one per-item routine:
//! - **Populate** fills an empty index.
//! - **Update** brings an existing index in line with what is installed now:
//!   every row id starts out in a working set, each observed item strikes its
//!   row from the set, and whatever is left after all origins ran has
//!   disappeared from the machine and is removed.
//!
//! Per-item and per-origin failures are logged and skipped. Only failures of
//! the index itself are returned as errors.

use crate::enumerate::ItemEnumerator;
use crate::index::InventoryIndex;
use crate::models::{InstalledItem, Origin, RowId};
use crate::Result;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Counts of what a reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
    /// Items dropped because they could not be read or written.
    pub skipped: usize,
    /// Origins whose enumeration failed this cycle.
    pub failed_origins: Vec<Origin>,
}

impl ReconcileReport {
    /// Whether the pass wrote anything.
    pub fn has_changes(&self) -> bool {
        self.added + self.updated + self.removed > 0
    }

    fn log(&self, pass: &str) {
        info!(
            "{} finished: {} added, {} updated, {} unchanged, {} removed, {} skipped",
            pass, self.added, self.updated, self.unchanged, self.removed, self.skipped
        );
        if !self.failed_origins.is_empty() {
            warn!("{} had failed origins: {:?}", pass, self.failed_origins);
        }
    }
}

enum ItemOutcome {
    Added,
    Updated,
    Unchanged,
}

/// Fill an empty index from every enumerator.
pub fn populate(
    index: &InventoryIndex,
    enumerators: &[Box<dyn ItemEnumerator>],
) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    for enumerator in enumerators {
        reconcile_origin(index, enumerator.as_ref(), None, &mut report)?;
    }

    report.log("Populate");
    Ok(report)
}

/// Bring an existing index in line with the current enumerations.
///
/// Afterwards the index holds exactly the union of what the enumerators
/// yielded. Row ids of items that were already indexed are preserved.
pub fn update(
    index: &InventoryIndex,
    enumerators: &[Box<dyn ItemEnumerator>],
) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    let mut unseen: BTreeSet<RowId> = index
        .search_all()?
        .into_iter()
        .map(|(row_id, _)| row_id)
        .collect();
    debug!("Update starting with {} indexed entries", unseen.len());

    for enumerator in enumerators {
        reconcile_origin(index, enumerator.as_ref(), Some(&mut unseen), &mut report)?;
    }

    // Anything not observed above is no longer installed
    index.with_transaction(|index| {
        for row_id in &unseen {
            if index.remove_entry(*row_id)? {
                report.removed += 1;
            }
        }
        Ok(())
    })?;

    report.log("Update");
    Ok(report)
}

/// Run one origin's enumeration inside a single index transaction.
///
/// `unseen` is the update working set; `None` means populate.
fn reconcile_origin(
    index: &InventoryIndex,
    enumerator: &dyn ItemEnumerator,
    mut unseen: Option<&mut BTreeSet<RowId>>,
    report: &mut ReconcileReport,
) -> Result<()> {
    let origin = enumerator.origin();

    let items = match enumerator.enumerate() {
        Ok(items) => items,
        Err(e) => {
            warn!("Enumeration of {} failed, no items this cycle: {}", origin, e);
            report.failed_origins.push(origin);
            return Ok(());
        }
    };

    index.with_transaction(|index| {
        for item in items {
            let item = match item {
                Ok(item) => item,
                Err(e) => {
                    warn!("Skipping unreadable item from {}: {}", origin, e);
                    report.skipped += 1;
                    continue;
                }
            };

            if item.origin != origin {
                warn!(
                    "Skipping {}: enumerated by {} but claims origin {}",
                    item.identity, origin, item.origin
                );
                report.skipped += 1;
                continue;
            }

            if let Err(e) = &item.display_name {
                debug!("Using package name for {}: {}", item.identity, e);
            }

            match apply_item(index, &item, unseen.as_deref_mut()) {
                Ok(ItemOutcome::Added) => report.added += 1,
                Ok(ItemOutcome::Updated) => report.updated += 1,
                Ok(ItemOutcome::Unchanged) => report.unchanged += 1,
                Err(e) => {
                    warn!("Failed to index {}: {}", item.source_key(), e);
                    report.skipped += 1;
                }
            }
        }
        Ok(())
    })
}

fn apply_item(
    index: &InventoryIndex,
    item: &InstalledItem,
    unseen: Option<&mut BTreeSet<RowId>>,
) -> Result<ItemOutcome> {
    let source_key = item.source_key();

    let existing = match unseen {
        Some(unseen) => {
            let existing = index.find_by_source_key(&source_key)?;
            if let Some(row_id) = existing {
                unseen.remove(&row_id);
            }
            existing
        }
        None => None,
    };

    match existing {
        Some(row_id) => {
            let fields_changed = index.update_entry(row_id, item)?;
            let metadata_changed = write_metadata(index, row_id, item)?;
            if fields_changed || metadata_changed {
                Ok(ItemOutcome::Updated)
            } else {
                Ok(ItemOutcome::Unchanged)
            }
        }
        None => {
            let row_id = index.add_entry(item, &source_key)?;
            write_metadata(index, row_id, item)?;
            Ok(ItemOutcome::Added)
        }
    }
}

fn write_metadata(index: &InventoryIndex, row_id: RowId, item: &InstalledItem) -> Result<bool> {
    let mut changed = false;
    for (kind, value) in item.origin.implied_metadata() {
        changed |= index.set_metadata(row_id, kind, value)?;
    }
    Ok(changed)
}
