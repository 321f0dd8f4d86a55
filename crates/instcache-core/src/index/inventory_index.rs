//! SQLite inventory index for storing and querying installed items.

use super::query::{build_like_pattern, SearchRequest, SearchResult, LIKE_ESCAPE};
use super::schema::{MetadataKeys, SchemaVersion, SCHEMA_SQL};
use crate::config::CacheConfig;
use crate::models::{EntrySummary, IndexedEntry, InstalledItem, MetadataKind, Origin, RowId};
use crate::{InventoryError, Result};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const ENTRY_COLUMNS: &str =
    "entry_id, identity, name, version, origin, family_name, tags_json, indexed_at";

/// How an existing index file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenDisposition {
    Read,
    ReadWrite,
}

/// SQLite-backed inventory index.
///
/// One connection per index, serialized behind a mutex for thread safety
/// within a process. Cross-process safety is the caller's job: the cache
/// controller only mutates a file while holding the matching named lock.
pub struct InventoryIndex {
    db_path: Option<PathBuf>,
    conn: Mutex<Connection>,
    schema_version: SchemaVersion,
    cache_format_version: u32,
    read_only: bool,
}

impl InventoryIndex {
    /// Create a brand-new index file at the given path.
    ///
    /// Fails if the file already exists.
    pub fn create_new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();

        if db_path.exists() {
            return Err(InventoryError::Io {
                message: format!("Index file already exists: {}", db_path.display()),
                path: Some(db_path),
                source: None,
            });
        }

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| InventoryError::Io {
                    message: format!("Failed to create directory {}", parent.display()),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let conn = Connection::open_with_flags(
            &db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::configure_connection(&conn)?;
        Self::initialize(&conn, SchemaVersion::LATEST)?;

        debug!("Created inventory index at {}", db_path.display());

        Ok(Self {
            db_path: Some(db_path),
            conn: Mutex::new(conn),
            schema_version: SchemaVersion::LATEST,
            cache_format_version: CacheConfig::CACHE_FORMAT_VERSION,
            read_only: false,
        })
    }

    /// Open an existing index file.
    ///
    /// Fails when the file is missing, is not a database, or lacks the
    /// version records written at creation.
    pub fn open(db_path: impl Into<PathBuf>, disposition: OpenDisposition) -> Result<Self> {
        let db_path = db_path.into();

        if !db_path.exists() {
            return Err(InventoryError::Io {
                message: format!("Index file not found: {}", db_path.display()),
                path: Some(db_path),
                source: None,
            });
        }

        let flags = match disposition {
            OpenDisposition::Read => OpenFlags::SQLITE_OPEN_READ_ONLY,
            OpenDisposition::ReadWrite => OpenFlags::SQLITE_OPEN_READ_WRITE,
        } | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&db_path, flags)?;
        Self::configure_connection(&conn)?;

        let schema_version = SchemaVersion::new(
            Self::read_version_key(&conn, MetadataKeys::SCHEMA_MAJOR)?,
            Self::read_version_key(&conn, MetadataKeys::SCHEMA_MINOR)?,
        );
        let cache_format_version = Self::read_version_key(&conn, MetadataKeys::CACHE_FORMAT)?;

        debug!(
            "Opened inventory index at {} (schema {}, {:?})",
            db_path.display(),
            schema_version,
            disposition
        );

        Ok(Self {
            db_path: Some(db_path),
            conn: Mutex::new(conn),
            schema_version,
            cache_format_version,
            read_only: disposition == OpenDisposition::Read,
        })
    }

    /// Create a transient index that lives only as long as this value.
    pub fn create_in_memory(schema_version: SchemaVersion) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn)?;
        Self::initialize(&conn, schema_version)?;

        debug!("Created in-memory inventory index (schema {})", schema_version);

        Ok(Self {
            db_path: None,
            conn: Mutex::new(conn),
            schema_version,
            cache_format_version: CacheConfig::CACHE_FORMAT_VERSION,
            read_only: false,
        })
    }

    /// Configure connection settings.
    ///
    /// The default rollback journal is kept so a finished file can be
    /// reopened read-only without any sidecar files.
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "PRAGMA busy_timeout={};\n\
             PRAGMA foreign_keys=ON;\n\
             PRAGMA temp_store=MEMORY;",
            CacheConfig::BUSY_TIMEOUT_MS,
        ))?;
        Ok(())
    }

    fn initialize(conn: &Connection, schema_version: SchemaVersion) -> Result<()> {
        conn.execute_batch(SCHEMA_SQL)?;

        let values = [
            (MetadataKeys::SCHEMA_MAJOR, schema_version.major.to_string()),
            (MetadataKeys::SCHEMA_MINOR, schema_version.minor.to_string()),
            (
                MetadataKeys::CACHE_FORMAT,
                CacheConfig::CACHE_FORMAT_VERSION.to_string(),
            ),
            (MetadataKeys::CREATED_AT, Utc::now().to_rfc3339()),
        ];

        for (key, value) in values {
            conn.execute(
                "INSERT OR REPLACE INTO index_metadata (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
        }

        Ok(())
    }

    fn read_version_key(conn: &Connection, key: &str) -> Result<u32> {
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM index_metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        let value = value.ok_or_else(|| InventoryError::Database {
            message: format!("Index metadata is missing {}", key),
            source: None,
        })?;

        value.parse().map_err(|_| InventoryError::Database {
            message: format!("Index metadata {} is not a version number: {}", key, value),
            source: None,
        })
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| InventoryError::Database {
            message: "Failed to acquire index connection lock".to_string(),
            source: None,
        })
    }

    /// How long a statement waits on another connection's lock before
    /// failing with `SQLITE_BUSY`.
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        self.lock_conn()?.busy_timeout(timeout)?;
        Ok(())
    }

    /// Get the database path, or `None` for an in-memory index.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn is_in_memory(&self) -> bool {
        self.db_path.is_none()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn schema_version(&self) -> SchemaVersion {
        self.schema_version
    }

    pub fn cache_format_version(&self) -> u32 {
        self.cache_format_version
    }

    /// Check that this index was written by a compatible build.
    pub fn check_compatibility(&self) -> Result<()> {
        if self.schema_version == SchemaVersion::LATEST
            && self.cache_format_version == CacheConfig::CACHE_FORMAT_VERSION
        {
            return Ok(());
        }

        Err(InventoryError::IncompatibleSchema {
            expected: format!(
                "{} (format {})",
                SchemaVersion::LATEST,
                CacheConfig::CACHE_FORMAT_VERSION
            ),
            found: format!(
                "{} (format {})",
                self.schema_version, self.cache_format_version
            ),
        })
    }

    /// Run `f` inside a single write transaction.
    ///
    /// Everything `f` wrote is rolled back when it returns an error.
    pub fn with_transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.lock_conn()?.execute_batch("BEGIN IMMEDIATE")?;

        let result = f(self).and_then(|value| {
            self.lock_conn()?.execute_batch("COMMIT")?;
            Ok(value)
        });

        if result.is_err() {
            let rollback = self
                .lock_conn()
                .and_then(|conn| conn.execute_batch("ROLLBACK").map_err(Into::into));
            if let Err(e) = rollback {
                warn!("Failed to roll back index transaction: {}", e);
            }
        }

        result
    }

    /// Insert a new entry for an installed item.
    ///
    /// Metadata is not written here; see [`InventoryIndex::set_metadata`].
    pub fn add_entry(&self, item: &InstalledItem, source_key: &str) -> Result<RowId> {
        let conn = self.lock_conn()?;
        let tags_json = serde_json::to_string(&item.tags)?;

        conn.execute(
            "INSERT INTO entries (source_key, origin, identity, name, version,
                                  family_name, tags_json, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                source_key,
                item.origin.key(),
                item.identity,
                item.resolved_name(),
                item.version,
                item.family_name,
                tags_json,
                Utc::now().to_rfc3339(),
            ],
        )?;

        let row_id = RowId(conn.last_insert_rowid());
        debug!("Added entry {} as row {}", source_key, row_id);
        Ok(row_id)
    }

    /// Rewrite an entry's fields from a freshly observed item.
    ///
    /// Returns `false` (and leaves the row untouched) when nothing differs.
    pub fn update_entry(&self, row_id: RowId, item: &InstalledItem) -> Result<bool> {
        let conn = self.lock_conn()?;
        let tags_json = serde_json::to_string(&item.tags)?;

        let rows_affected = conn.execute(
            "UPDATE entries SET name = ?2, version = ?3, family_name = ?4,
                                tags_json = ?5, indexed_at = ?6
             WHERE entry_id = ?1
               AND (name IS NOT ?2 OR version IS NOT ?3
                    OR family_name IS NOT ?4 OR tags_json IS NOT ?5)",
            params![
                row_id.0,
                item.resolved_name(),
                item.version,
                item.family_name,
                tags_json,
                Utc::now().to_rfc3339(),
            ],
        )?;

        if rows_affected > 0 {
            debug!("Updated entry row {}", row_id);
        }
        Ok(rows_affected > 0)
    }

    /// Look up the row of an entry by its origin-qualified key.
    pub fn find_by_source_key(&self, source_key: &str) -> Result<Option<RowId>> {
        let conn = self.lock_conn()?;

        let row_id = conn
            .query_row(
                "SELECT entry_id FROM entries WHERE source_key = ?1",
                params![source_key],
                |row| row.get(0),
            )
            .optional()?;

        Ok(row_id.map(RowId))
    }

    /// Set a metadata value on an entry.
    ///
    /// Returns `false` when the stored value was already equal.
    pub fn set_metadata(&self, row_id: RowId, kind: MetadataKind, value: &str) -> Result<bool> {
        let conn = self.lock_conn()?;

        let rows_affected = conn.execute(
            "INSERT INTO entry_metadata (entry_id, kind, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(entry_id, kind) DO UPDATE SET value = excluded.value
             WHERE value <> excluded.value",
            params![row_id.0, kind.as_str(), value],
        )?;

        Ok(rows_affected > 0)
    }

    /// Get a single metadata value of an entry.
    pub fn get_metadata(&self, row_id: RowId, kind: MetadataKind) -> Result<Option<String>> {
        let conn = self.lock_conn()?;

        let value = conn
            .query_row(
                "SELECT value FROM entry_metadata WHERE entry_id = ?1 AND kind = ?2",
                params![row_id.0, kind.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(value)
    }

    /// Remove an entry and its metadata.
    pub fn remove_entry(&self, row_id: RowId) -> Result<bool> {
        let conn = self.lock_conn()?;

        let rows_affected =
            conn.execute("DELETE FROM entries WHERE entry_id = ?1", params![row_id.0])?;

        if rows_affected > 0 {
            debug!("Removed entry row {}", row_id);
        }
        Ok(rows_affected > 0)
    }

    /// Get every entry's row id with a short summary, in row order.
    pub fn search_all(&self) -> Result<Vec<(RowId, EntrySummary)>> {
        let conn = self.lock_conn()?;

        let mut stmt = conn.prepare(
            "SELECT entry_id, identity, name, version, origin FROM entries ORDER BY entry_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                RowId(row.get(0)?),
                EntrySummary {
                    identity: row.get(1)?,
                    name: row.get(2)?,
                    version: row.get(3)?,
                    origin: Self::origin_column(row, 4)?,
                },
            ))
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }

        Ok(results)
    }

    /// Get a full entry, including metadata.
    pub fn get_entry(&self, row_id: RowId) -> Result<Option<IndexedEntry>> {
        let conn = self.lock_conn()?;

        let entry = conn
            .query_row(
                &format!("SELECT {} FROM entries WHERE entry_id = ?1", ENTRY_COLUMNS),
                params![row_id.0],
                Self::row_to_entry,
            )
            .optional()?;

        match entry {
            Some(mut entry) => {
                entry.metadata = Self::load_metadata(&conn, row_id)?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// Search entries by text, origin and tags.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResult> {
        let start = Instant::now();
        let conn = self.lock_conn()?;

        let mut sql = format!("SELECT {} FROM entries WHERE 1=1", ENTRY_COLUMNS);
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(pattern) = request.query.as_deref().and_then(build_like_pattern) {
            sql.push_str(&format!(
                " AND (lower(identity) LIKE ? ESCAPE '{esc}' OR lower(name) LIKE ? ESCAPE '{esc}')",
                esc = LIKE_ESCAPE
            ));
            params_vec.push(Box::new(pattern.clone()));
            params_vec.push(Box::new(pattern));
        }

        if let Some(origin) = request.origin {
            sql.push_str(" AND origin = ?");
            params_vec.push(Box::new(origin.key()));
        }

        sql.push_str(" ORDER BY name COLLATE NOCASE, entry_id");

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(params_refs.as_slice(), Self::row_to_entry)?;

        let mut matches = Vec::new();
        for row in rows {
            match row {
                // Apply tag filter in post-processing
                Ok(entry) if request.tags_match(&entry) => matches.push(entry),
                Ok(_) => {}
                Err(e) => {
                    warn!("Error reading entry row: {}", e);
                }
            }
        }

        let total_count = matches.len();
        if let Some(limit) = request.limit {
            matches.truncate(limit);
        }

        for entry in &mut matches {
            entry.metadata = Self::load_metadata(&conn, entry.row_id)?;
        }

        Ok(SearchResult {
            matches,
            total_count,
            query_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }

    /// Get the count of entries.
    pub fn count(&self) -> Result<usize> {
        let conn = self.lock_conn()?;
        let count: usize = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(count)
    }

    fn load_metadata(conn: &Connection, row_id: RowId) -> Result<BTreeMap<MetadataKind, String>> {
        let mut stmt = conn.prepare("SELECT kind, value FROM entry_metadata WHERE entry_id = ?1")?;
        let rows = stmt.query_map(params![row_id.0], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut metadata = BTreeMap::new();
        for row in rows {
            let (kind, value) = row?;
            match MetadataKind::from_str(&kind) {
                Some(kind) => {
                    metadata.insert(kind, value);
                }
                None => warn!("Ignoring unknown metadata kind {} on row {}", kind, row_id),
            }
        }

        Ok(metadata)
    }

    fn origin_column(row: &Row, idx: usize) -> rusqlite::Result<Origin> {
        let key: String = row.get(idx)?;
        Origin::from_key(&key).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                Type::Text,
                format!("unknown origin: {}", key).into(),
            )
        })
    }

    /// Convert a row to an IndexedEntry, without metadata.
    fn row_to_entry(row: &Row) -> rusqlite::Result<IndexedEntry> {
        let tags_json: String = row.get(6)?;
        let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();

        Ok(IndexedEntry {
            row_id: RowId(row.get(0)?),
            identity: row.get(1)?,
            name: row.get(2)?,
            version: row.get(3)?,
            origin: Self::origin_column(row, 4)?,
            family_name: row.get(5)?,
            tags,
            metadata: BTreeMap::new(),
            indexed_at: row.get(7)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InstallScope;
    use tempfile::TempDir;

    fn create_test_index() -> (InventoryIndex, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("cache.db");
        let index = InventoryIndex::create_new(&db_path).unwrap();
        (index, temp_dir)
    }

    fn machine_item(id: &str, name: &str, version: &str) -> InstalledItem {
        InstalledItem::new(Origin::System(InstallScope::Machine), id, id, version)
            .with_display_name(name)
    }

    fn add(index: &InventoryIndex, item: &InstalledItem) -> RowId {
        index.add_entry(item, &item.source_key()).unwrap()
    }

    #[test]
    fn test_add_and_get() {
        let (index, _temp) = create_test_index();

        let item = machine_item("git", "Git", "2.43.0").with_tags(["vcs"]);
        let row_id = add(&index, &item);

        let entry = index.get_entry(row_id).unwrap().unwrap();
        assert_eq!(entry.identity, "git");
        assert_eq!(entry.name, "Git");
        assert_eq!(entry.version, "2.43.0");
        assert_eq!(entry.origin, Origin::System(InstallScope::Machine));
        assert_eq!(entry.tags, vec!["vcs".to_string()]);
        assert_eq!(index.find_by_source_key("system.machine/git").unwrap(), Some(row_id));
    }

    #[test]
    fn test_identity_unique_within_origin_only() {
        let (index, _temp) = create_test_index();

        let machine = machine_item("git", "Git", "2.43.0");
        add(&index, &machine);
        assert!(index.add_entry(&machine, &machine.source_key()).is_err());

        let user = InstalledItem::new(Origin::System(InstallScope::User), "git", "git", "2.40.0");
        add(&index, &user);
        assert_eq!(index.count().unwrap(), 2);
    }

    #[test]
    fn test_update_entry_only_when_changed() {
        let (index, _temp) = create_test_index();

        let item = machine_item("curl", "curl", "8.4.0");
        let row_id = add(&index, &item);
        let before = index.get_entry(row_id).unwrap().unwrap();

        assert!(!index.update_entry(row_id, &item).unwrap());
        assert_eq!(index.get_entry(row_id).unwrap().unwrap(), before);

        let newer = machine_item("curl", "curl", "8.5.0");
        assert!(index.update_entry(row_id, &newer).unwrap());
        let after = index.get_entry(row_id).unwrap().unwrap();
        assert_eq!(after.row_id, row_id);
        assert_eq!(after.version, "8.5.0");
    }

    #[test]
    fn test_metadata_set_and_cascade_on_remove() {
        let (index, _temp) = create_test_index();

        let item = InstalledItem::new(Origin::Framework, "Contoso.App_abc", "Contoso.App", "1.0.0.0");
        let row_id = add(&index, &item);

        assert!(index.set_metadata(row_id, MetadataKind::InstalledType, "framework").unwrap());
        assert!(!index.set_metadata(row_id, MetadataKind::InstalledType, "framework").unwrap());
        assert_eq!(
            index.get_metadata(row_id, MetadataKind::InstalledType).unwrap().as_deref(),
            Some("framework")
        );

        assert!(index.remove_entry(row_id).unwrap());
        assert!(!index.remove_entry(row_id).unwrap());
        assert!(index.get_metadata(row_id, MetadataKind::InstalledType).unwrap().is_none());
        assert!(index.get_entry(row_id).unwrap().is_none());
    }

    #[test]
    fn test_set_metadata_on_missing_row_fails() {
        let (index, _temp) = create_test_index();
        assert!(index.set_metadata(RowId(42), MetadataKind::InstalledType, "framework").is_err());
    }

    #[test]
    fn test_removed_row_ids_are_not_reused() {
        let (index, _temp) = create_test_index();

        let first = add(&index, &machine_item("a", "A", "1"));
        index.remove_entry(first).unwrap();
        let second = add(&index, &machine_item("b", "B", "1"));
        assert!(second > first);
    }

    #[test]
    fn test_search_all_returns_summaries() {
        let (index, _temp) = create_test_index();

        for i in 1..=3 {
            add(&index, &machine_item(&format!("pkg-{}", i), &format!("Package {}", i), "1.0"));
        }

        let all = index.search_all().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].1.identity, "pkg-1");
        assert!(all.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_search_by_query_origin_and_tag() {
        let (index, _temp) = create_test_index();

        add(&index, &machine_item("python3", "Python 3", "3.12").with_tags(["interpreters"]));
        add(&index, &machine_item("python3-pip", "pip", "24.0").with_tags(["python"]));
        add(&index, &machine_item("lib_ssl", "OpenSSL", "3.0"));
        add(
            &index,
            &InstalledItem::new(Origin::Framework, "Python.3.12_qbz5", "Python.3.12", "3.12.0.0"),
        );

        let result = index.search(&SearchRequest::all().with_query("PYTHON")).unwrap();
        assert_eq!(result.total_count, 3);

        let result = index
            .search(&SearchRequest::all().with_query("python").with_origin(Origin::Framework))
            .unwrap();
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].identity, "Python.3.12_qbz5");

        let result = index.search(&SearchRequest::all().with_tag("Python")).unwrap();
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].identity, "python3-pip");

        // Underscore must match literally, not as a wildcard
        let result = index.search(&SearchRequest::all().with_query("b_s")).unwrap();
        assert_eq!(result.total_count, 1);
        let result = index.search(&SearchRequest::all().with_query("lib_")).unwrap();
        assert_eq!(result.matches[0].identity, "lib_ssl");
    }

    #[test]
    fn test_search_limit_keeps_total_count() {
        let (index, _temp) = create_test_index();

        for i in 1..=5 {
            add(&index, &machine_item(&format!("pkg-{}", i), &format!("Package {}", i), "1.0"));
        }

        let result = index.search(&SearchRequest::all().with_limit(2)).unwrap();
        assert_eq!(result.matches.len(), 2);
        assert_eq!(result.total_count, 5);
    }

    #[test]
    fn test_open_read_only_rejects_writes() {
        let (index, temp) = create_test_index();
        add(&index, &machine_item("vim", "Vim", "9.1"));
        drop(index);

        let db_path = temp.path().join("cache.db");
        let index = InventoryIndex::open(&db_path, OpenDisposition::Read).unwrap();
        assert!(index.is_read_only());
        assert_eq!(index.count().unwrap(), 1);
        assert!(index.add_entry(&machine_item("emacs", "Emacs", "29"), "system.machine/emacs").is_err());
    }

    #[test]
    fn test_open_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = InventoryIndex::open(temp_dir.path().join("missing.db"), OpenDisposition::ReadWrite);
        assert!(result.is_err());
    }

    #[test]
    fn test_open_corrupt_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("cache.db");
        std::fs::write(&db_path, b"definitely not a sqlite database, just some bytes").unwrap();

        assert!(InventoryIndex::open(&db_path, OpenDisposition::ReadWrite).is_err());
    }

    #[test]
    fn test_create_new_refuses_existing_file() {
        let (_index, temp) = create_test_index();
        assert!(InventoryIndex::create_new(temp.path().join("cache.db")).is_err());
    }

    #[test]
    fn test_versions_roundtrip_and_compatibility() {
        let (index, temp) = create_test_index();
        assert!(index.check_compatibility().is_ok());
        drop(index);

        let index = InventoryIndex::open(temp.path().join("cache.db"), OpenDisposition::ReadWrite).unwrap();
        assert_eq!(index.schema_version(), SchemaVersion::LATEST);
        assert_eq!(index.cache_format_version(), CacheConfig::CACHE_FORMAT_VERSION);
        assert!(index.check_compatibility().is_ok());
    }

    #[test]
    fn test_in_memory_index_with_old_schema_is_incompatible() {
        let index = InventoryIndex::create_in_memory(SchemaVersion::new(0, 9)).unwrap();
        assert!(index.is_in_memory());
        assert!(matches!(
            index.check_compatibility(),
            Err(InventoryError::IncompatibleSchema { .. })
        ));
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let (index, _temp) = create_test_index();

        let result: Result<()> = index.with_transaction(|index| {
            add(index, &machine_item("a", "A", "1"));
            Err(InventoryError::InvalidArgument("boom".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(index.count().unwrap(), 0);

        index
            .with_transaction(|index| {
                add(index, &machine_item("b", "B", "1"));
                Ok(())
            })
            .unwrap();
        assert_eq!(index.count().unwrap(), 1);
    }

    #[test]
    fn test_busy_timeout_bounds_wait_for_writer() {
        let (index, temp) = create_test_index();
        index.set_busy_timeout(Duration::from_millis(50)).unwrap();

        let other = Connection::open(temp.path().join("cache.db")).unwrap();
        other.execute_batch("BEGIN IMMEDIATE").unwrap();

        let start = Instant::now();
        let result = index.with_transaction(|index| {
            add(index, &machine_item("a", "A", "1"));
            Ok(())
        });
        assert!(matches!(result, Err(InventoryError::Database { .. })));
        assert!(start.elapsed() < Duration::from_secs(5));

        other.execute_batch("ROLLBACK").unwrap();
        index
            .with_transaction(|index| {
                add(index, &machine_item("a", "A", "1"));
                Ok(())
            })
            .unwrap();
        assert_eq!(index.count().unwrap(), 1);
    }
}
