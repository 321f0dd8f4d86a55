//! instcache - Cross-process cached inventory of installed software.
//!
//! This crate keeps a SQLite index of the software installed on the machine,
//! shared by every process of the same user through a cache directory and a
//! pair of named cross-process locks. Opening the source reuses and refreshes
//! the cache when possible, rebuilds it when it is missing or stale, and falls
//! back to a private in-memory index when the disk cannot be used.
//!
//! # Example
//!
//! ```rust,ignore
//! use instcache::{InstalledSourceFactory, SearchRequest, Source, SourceDetails, SourceFactory};
//!
//! fn main() -> instcache::Result<()> {
//!     let factory = InstalledSourceFactory::builder().build()?;
//!     let handle = factory.create(&SourceDetails::installed())?;
//!
//!     // Search installed packages by name or identity
//!     let result = handle.search(&SearchRequest::all().with_query("python").with_limit(10))?;
//!     println!("Found {} packages", result.total_count);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod enumerate;
pub mod error;
pub mod index;
pub mod lock;
pub mod models;
pub mod platform;
pub mod reconcile;
pub mod source;

pub use enumerate::{
    DpkgStatusEnumerator, FlatpakEnumerator, FlatpakKind, ItemEnumerator, StaticEnumerator,
};
pub use error::{FieldError, InventoryError, Result};
pub use index::{InventoryIndex, SchemaVersion, SearchRequest, SearchResult};
pub use lock::{FileLockProvider, LockHandle, LockMode, LockProvider};
pub use models::{IndexedEntry, InstallScope, InstalledItem, MetadataKind, Origin, RowId};
pub use reconcile::ReconcileReport;
pub use source::{
    CacheOutcome, CacheState, InstalledSourceFactory, InstalledSourceFactoryBuilder,
    InventoryHandle, RefreshOutcome, Source, SourceDetails, SourceFactory,
};
