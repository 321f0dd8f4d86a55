//! Schema versioning for the inventory index.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version of the index table layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
}

impl SchemaVersion {
    pub const LATEST: SchemaVersion = SchemaVersion { major: 1, minor: 0 };

    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::LATEST
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Keys of the `index_metadata` table.
pub(crate) struct MetadataKeys;

impl MetadataKeys {
    pub const SCHEMA_MAJOR: &'static str = "schema_major";
    pub const SCHEMA_MINOR: &'static str = "schema_minor";
    pub const CACHE_FORMAT: &'static str = "cache_format_version";
    pub const CREATED_AT: &'static str = "created_at";
}

/// Table layout. Entry ids use AUTOINCREMENT so a removed id is never handed
/// out again while the file lives.
pub(crate) const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS index_metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS entries (
        entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_key TEXT NOT NULL UNIQUE,
        origin TEXT NOT NULL,
        identity TEXT NOT NULL,
        name TEXT NOT NULL,
        version TEXT NOT NULL,
        family_name TEXT,
        tags_json TEXT NOT NULL,
        indexed_at TEXT NOT NULL,
        UNIQUE (origin, identity)
    );

    CREATE INDEX IF NOT EXISTS idx_entries_name ON entries(name);
    CREATE INDEX IF NOT EXISTS idx_entries_origin ON entries(origin);

    CREATE TABLE IF NOT EXISTS entry_metadata (
        entry_id INTEGER NOT NULL REFERENCES entries(entry_id) ON DELETE CASCADE,
        kind TEXT NOT NULL,
        value TEXT NOT NULL,
        PRIMARY KEY (entry_id, kind)
    );
";
