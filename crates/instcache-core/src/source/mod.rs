//! Source contract and the predefined installed-software source.
//!
//! A [`SourceFactory`] turns [`SourceDetails`] into an opened [`Source`].
//! The installed source is predefined: it can be opened but never added,
//! updated or removed through the factory.

mod handle;
mod installed;

pub use handle::{CacheOutcome, InventoryHandle, RefreshOutcome};
pub use installed::{CacheState, InstalledSourceFactory, InstalledSourceFactoryBuilder};

use crate::config::SourceConfig;
use crate::index::{SearchRequest, SearchResult};
use crate::models::{IndexedEntry, MetadataKind, RowId};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Descriptive record of a source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDetails {
    pub name: String,
    pub source_type: String,
    pub arg: String,
    pub data: String,
}

impl SourceDetails {
    pub fn new(name: impl Into<String>, source_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_type: source_type.into(),
            ..Default::default()
        }
    }

    /// Details naming the predefined installed source.
    pub fn installed() -> Self {
        Self::new("installed", SourceConfig::SOURCE_TYPE)
    }
}

/// An opened, queryable source.
pub trait Source: Send + Sync {
    fn details(&self) -> &SourceDetails;

    /// Logical identifier, stable across opens.
    fn identifier(&self) -> &str;

    fn search(&self, request: &SearchRequest) -> Result<SearchResult>;

    fn get_entry(&self, row_id: RowId) -> Result<Option<IndexedEntry>>;

    fn get_metadata(&self, row_id: RowId, kind: MetadataKind) -> Result<Option<String>>;
}

/// Creates and manages sources of one source type.
pub trait SourceFactory: Send + Sync {
    type Output: Source;

    /// The source type string this factory handles.
    fn source_type(&self) -> &str;

    fn create(&self, details: &SourceDetails) -> Result<Self::Output>;

    fn add(&self, details: &SourceDetails) -> Result<()>;

    fn update(&self, details: &SourceDetails) -> Result<()>;

    fn remove(&self, details: &SourceDetails) -> Result<()>;
}
