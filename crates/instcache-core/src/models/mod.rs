//! Data types for installed items and their indexed form.

mod entry;
mod item;

pub use entry::{EntrySummary, IndexedEntry, InstalledType, MetadataKind, RowId};
pub use item::{FieldResult, InstallScope, InstalledItem, Origin};
