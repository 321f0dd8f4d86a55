//! SQLite inventory index.
//!
//! This module provides:
//! - Entry and metadata storage in SQLite
//! - Schema/cache version records used to judge cache freshness
//! - Filtered search over the stored inventory

mod inventory_index;
mod query;
mod schema;

pub use inventory_index::{InventoryIndex, OpenDisposition};
pub use query::{build_like_pattern, escape_like_term, SearchRequest, SearchResult};
pub use schema::SchemaVersion;
