//! Factory for the predefined installed-software source.
//!
//! Opening the source walks three tiers, falling through on any recoverable
//! failure:
//!
//! 1. **Reuse** the on-disk cache under a shared file lock, refreshing its
//!    contents in place (or waiting for a peer that is already refreshing).
//! 2. **Rebuild on disk** under the exclusive file lock: delete the cache
//!    directory, populate a new index, then reopen it read-only under a
//!    shared lock.
//! 3. **Rebuild in memory**, private to this process and unlocked.
//!
//! Lock protocol, across all processes sharing a cache directory:
//!
//! | Lock            | Shared                      | Exclusive                   |
//! |-----------------|-----------------------------|-----------------------------|
//! | file lock       | using the cache file        | deleting/recreating it      |
//! | contents lock   | waiting for a peer refresh  | running a refresh           |
//!
//! Tier 1 state is dropped before tier 2 asks for the exclusive file lock,
//! so a process never waits on its own shared holder.

use super::handle::{CacheOutcome, InventoryHandle, RefreshOutcome};
use super::{SourceDetails, SourceFactory};
use crate::config::{CacheConfig, LockConfig, SourceConfig};
use crate::enumerate::{self, ItemEnumerator};
use crate::index::{InventoryIndex, OpenDisposition, SchemaVersion};
use crate::lock::{FileLockProvider, LockHandle, LockProvider};
use crate::platform;
use crate::reconcile::{self, ReconcileReport};
use crate::{InventoryError, Result};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Condition of the on-disk cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum CacheState {
    Absent,
    Fresh,
    #[serde(rename_all = "camelCase")]
    Stale {
        found: SchemaVersion,
        format_version: u32,
    },
    Unreadable,
}

/// Cache tiers, in fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Reuse,
    RebuildOnDisk,
    InMemory,
}

impl Tier {
    fn next(self) -> Tier {
        match self {
            Tier::Reuse => Tier::RebuildOnDisk,
            Tier::RebuildOnDisk | Tier::InMemory => Tier::InMemory,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Reuse => f.write_str("reuse"),
            Tier::RebuildOnDisk => f.write_str("rebuild-on-disk"),
            Tier::InMemory => f.write_str("in-memory"),
        }
    }
}

/// Why a tier gave up.
#[derive(Debug)]
enum TierFailure {
    /// The cache file is absent or could not be opened.
    Unavailable(InventoryError),
    /// The cache file was written by an incompatible build.
    Stale(InventoryError),
    /// Refreshing an existing cache failed at the database level.
    Refresh(InventoryError),
    /// Deleting or recreating the cache failed.
    Io(InventoryError),
    Lock(InventoryError),
}

impl fmt::Display for TierFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierFailure::Unavailable(e) => write!(f, "cache unavailable: {}", e),
            TierFailure::Stale(e) => write!(f, "cache stale: {}", e),
            TierFailure::Refresh(e) => write!(f, "refresh failed: {}", e),
            TierFailure::Io(e) => write!(f, "rebuild failed: {}", e),
            TierFailure::Lock(e) => write!(f, "lock unavailable: {}", e),
        }
    }
}

impl TierFailure {
    fn error(&self) -> &InventoryError {
        match self {
            TierFailure::Unavailable(e)
            | TierFailure::Stale(e)
            | TierFailure::Refresh(e)
            | TierFailure::Io(e)
            | TierFailure::Lock(e) => e,
        }
    }

    fn into_error(self) -> InventoryError {
        match self {
            TierFailure::Unavailable(e)
            | TierFailure::Stale(e)
            | TierFailure::Refresh(e)
            | TierFailure::Io(e)
            | TierFailure::Lock(e) => e,
        }
    }
}

type TierResult = std::result::Result<Opened, TierFailure>;

/// Index, lock and outcome of a successful tier.
struct Opened {
    index: InventoryIndex,
    lock: LockHandle,
    outcome: CacheOutcome,
}

/// Factory for the predefined installed source.
///
/// # Example
///
/// ```rust,ignore
/// use instcache::{InstalledSourceFactory, Source, SourceDetails, SourceFactory, SearchRequest};
///
/// let factory = InstalledSourceFactory::builder().build()?;
/// let handle = factory.create(&SourceDetails::installed())?;
/// let result = handle.search(&SearchRequest::all().with_query("python"))?;
/// println!("{} matches", result.total_count);
/// ```
pub struct InstalledSourceFactory {
    cache_dir: PathBuf,
    lock_provider: Arc<dyn LockProvider>,
    enumerators: Vec<Box<dyn ItemEnumerator>>,
    busy_timeout: Duration,
}

impl InstalledSourceFactory {
    pub fn builder() -> InstalledSourceFactoryBuilder {
        InstalledSourceFactoryBuilder::new()
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn cache_file(&self) -> PathBuf {
        platform::cache_file_in(&self.cache_dir)
    }

    /// Open the installed source on the blocking thread pool.
    pub async fn create_async(self: Arc<Self>, details: SourceDetails) -> Result<InventoryHandle> {
        tokio::task::spawn_blocking(move || self.create(&details))
            .await
            .map_err(|e| InventoryError::Other(format!("Source creation task failed: {}", e)))?
    }

    /// Report the condition of the on-disk cache without changing it.
    pub fn cache_state(&self) -> Result<CacheState> {
        let _file_lock = self.lock_provider.lock_shared(LockConfig::FILE_LOCK_NAME)?;

        let cache_file = self.cache_file();
        if !cache_file.exists() {
            return Ok(CacheState::Absent);
        }

        let state = match InventoryIndex::open(&cache_file, OpenDisposition::Read) {
            Ok(index) => match index.check_compatibility() {
                Ok(()) => CacheState::Fresh,
                Err(_) => CacheState::Stale {
                    found: index.schema_version(),
                    format_version: index.cache_format_version(),
                },
            },
            Err(e) => {
                debug!("Cache file {} is unreadable: {}", cache_file.display(), e);
                CacheState::Unreadable
            }
        };

        Ok(state)
    }

    /// Delete the on-disk cache.
    ///
    /// Blocks until no process holds the cache open, including handles held
    /// by the calling process. Returns whether anything was removed.
    pub fn clear_cache(&self) -> Result<bool> {
        let _file_lock = self.lock_provider.lock_exclusive(LockConfig::FILE_LOCK_NAME)?;
        self.remove_cache_dir()
    }

    fn check_source_type(&self, details: &SourceDetails) -> Result<()> {
        if details.source_type != SourceConfig::SOURCE_TYPE {
            return Err(InventoryError::InvalidArgument(format!(
                "Source type {:?} is not handled by the {} factory",
                details.source_type,
                SourceConfig::SOURCE_TYPE
            )));
        }
        Ok(())
    }

    fn unsupported(&self, operation: &'static str) -> Result<()> {
        warn!(
            "Rejected {} on predefined source {}",
            operation,
            SourceConfig::SOURCE_IDENTIFIER
        );
        Err(InventoryError::UnsupportedOperation {
            operation,
            source_type: SourceConfig::SOURCE_TYPE.to_string(),
        })
    }

    fn open_tiers(&self) -> Result<Opened> {
        let mut tier = Tier::Reuse;

        loop {
            let attempt = match tier {
                Tier::Reuse => self.try_reuse(),
                Tier::RebuildOnDisk => self.try_rebuild_on_disk(),
                Tier::InMemory => return self.build_in_memory(),
            };

            match attempt {
                Ok(opened) => {
                    info!("Installed source opened via {} tier", tier);
                    return Ok(opened);
                }
                // Contract violations are surfaced, never absorbed by a fallback
                Err(failure) if !failure.error().is_recoverable() => {
                    warn!("Tier {} hit a non-recoverable error: {}", tier, failure);
                    return Err(failure.into_error());
                }
                Err(failure) => {
                    let next = tier.next();
                    info!("Tier {} failed ({}), falling back to {}", tier, failure, next);
                    tier = next;
                }
            }
        }
    }

    fn try_reuse(&self) -> TierResult {
        let file_lock = self
            .lock_provider
            .lock_shared(LockConfig::FILE_LOCK_NAME)
            .map_err(TierFailure::Lock)?;

        let index = InventoryIndex::open(self.cache_file(), OpenDisposition::ReadWrite)
            .map_err(TierFailure::Unavailable)?;
        index.check_compatibility().map_err(TierFailure::Stale)?;
        index
            .set_busy_timeout(self.busy_timeout)
            .map_err(TierFailure::Unavailable)?;

        let refresh = self.refresh_contents(&index).map_err(TierFailure::Refresh)?;

        Ok(Opened {
            index,
            lock: file_lock,
            outcome: CacheOutcome::Reused { refresh },
        })
    }

    /// Run the warm update, or wait for the peer already running it.
    ///
    /// Caller holds the shared file lock.
    fn refresh_contents(&self, index: &InventoryIndex) -> Result<RefreshOutcome> {
        let contents_lock = self
            .lock_provider
            .try_lock_exclusive(LockConfig::CONTENTS_LOCK_NAME, Duration::ZERO)?;

        match contents_lock {
            Some(contents_lock) => {
                let report = reconcile::update(index, &self.enumerators)?;
                contents_lock.release();
                Ok(RefreshOutcome::Refreshed(report))
            }
            None => {
                info!("Cache refresh already running in another process, waiting");
                self.lock_provider
                    .lock_shared(LockConfig::CONTENTS_LOCK_NAME)?
                    .release();
                Ok(RefreshOutcome::WaitedForPeer)
            }
        }
    }

    fn try_rebuild_on_disk(&self) -> TierResult {
        let report = {
            let _file_lock = self
                .lock_provider
                .lock_exclusive(LockConfig::FILE_LOCK_NAME)
                .map_err(TierFailure::Lock)?;

            match self.write_new_cache() {
                Ok(report) => report,
                Err(e) => {
                    // Never leave a half-built cache for the next process
                    if let Err(cleanup) = self.remove_cache_dir() {
                        warn!("Failed to clean up partial cache: {}", cleanup);
                    }
                    return Err(TierFailure::Io(e));
                }
            }
        };

        let file_lock = self
            .lock_provider
            .lock_shared(LockConfig::FILE_LOCK_NAME)
            .map_err(TierFailure::Lock)?;
        let index = InventoryIndex::open(self.cache_file(), OpenDisposition::Read)
            .map_err(TierFailure::Unavailable)?;

        Ok(Opened {
            index,
            lock: file_lock,
            outcome: CacheOutcome::RebuiltOnDisk { populate: report },
        })
    }

    /// Recreate the cache directory and populate a new index in it.
    ///
    /// Caller holds the exclusive file lock.
    fn write_new_cache(&self) -> Result<ReconcileReport> {
        self.remove_cache_dir()?;
        std::fs::create_dir_all(&self.cache_dir)
            .map_err(|e| InventoryError::io_with_path(e, &self.cache_dir))?;

        let index = InventoryIndex::create_new(self.cache_file())?;
        index.set_busy_timeout(self.busy_timeout)?;
        let report = reconcile::populate(&index, &self.enumerators)?;
        info!(
            "Rebuilt installed cache at {} with {} entries",
            self.cache_dir.display(),
            report.added
        );
        Ok(report)
    }

    fn build_in_memory(&self) -> Result<Opened> {
        let index = InventoryIndex::create_in_memory(SchemaVersion::LATEST)?;
        let report = reconcile::populate(&index, &self.enumerators)?;
        info!("Installed source opened in memory with {} entries", report.added);

        Ok(Opened {
            index,
            lock: LockHandle::null(),
            outcome: CacheOutcome::InMemory { populate: report },
        })
    }

    fn remove_cache_dir(&self) -> Result<bool> {
        match std::fs::remove_dir_all(&self.cache_dir) {
            Ok(()) => {
                debug!("Removed cache directory {}", self.cache_dir.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(InventoryError::io_with_path(e, &self.cache_dir)),
        }
    }
}

impl SourceFactory for InstalledSourceFactory {
    type Output = InventoryHandle;

    fn source_type(&self) -> &str {
        SourceConfig::SOURCE_TYPE
    }

    fn create(&self, details: &SourceDetails) -> Result<InventoryHandle> {
        self.check_source_type(details)?;

        let Opened {
            index,
            lock,
            outcome,
        } = self.open_tiers()?;
        Ok(InventoryHandle::new(details.clone(), index, lock, outcome))
    }

    fn add(&self, _details: &SourceDetails) -> Result<()> {
        self.unsupported("add")
    }

    fn update(&self, _details: &SourceDetails) -> Result<()> {
        self.unsupported("update")
    }

    fn remove(&self, _details: &SourceDetails) -> Result<()> {
        self.unsupported("remove")
    }
}

/// Builder for [`InstalledSourceFactory`].
///
/// Anything left unset falls back to the platform default: the cache and
/// lock directories under the user cache area, file-backed locks, and the
/// enumerators available on this platform.
#[derive(Default)]
pub struct InstalledSourceFactoryBuilder {
    cache_dir: Option<PathBuf>,
    lock_dir: Option<PathBuf>,
    lock_provider: Option<Arc<dyn LockProvider>>,
    enumerators: Option<Vec<Box<dyn ItemEnumerator>>>,
    busy_timeout: Option<Duration>,
}

impl InstalledSourceFactoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory holding the cache file. Deleted wholesale on rebuild.
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Directory for lock files. Ignored when a lock provider is set.
    pub fn lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = Some(dir.into());
        self
    }

    pub fn lock_provider(mut self, provider: Arc<dyn LockProvider>) -> Self {
        self.lock_provider = Some(provider);
        self
    }

    /// Add an enumerator. Once any is added, platform enumerators are not used.
    pub fn enumerator(mut self, enumerator: impl ItemEnumerator + 'static) -> Self {
        self.enumerators
            .get_or_insert_with(Vec::new)
            .push(Box::new(enumerator));
        self
    }

    /// Replace the enumerator list. An empty list yields an empty inventory.
    pub fn enumerators(mut self, enumerators: Vec<Box<dyn ItemEnumerator>>) -> Self {
        self.enumerators = Some(enumerators);
        self
    }

    /// How long cache writes wait on another process's database lock.
    ///
    /// Default: 30 seconds
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<InstalledSourceFactory> {
        let cache_dir = match self.cache_dir {
            Some(dir) => dir,
            None => platform::local_cache_dir()?,
        };

        let lock_provider: Arc<dyn LockProvider> = match (self.lock_provider, self.lock_dir) {
            (Some(provider), _) => provider,
            (None, Some(dir)) => Arc::new(FileLockProvider::new(dir)),
            (None, None) => Arc::new(FileLockProvider::platform_default()?),
        };

        let enumerators = self
            .enumerators
            .unwrap_or_else(enumerate::platform_enumerators);

        debug!(
            "Installed source factory: cache {}, {} enumerators",
            cache_dir.display(),
            enumerators.len()
        );

        Ok(InstalledSourceFactory {
            cache_dir,
            lock_provider,
            enumerators,
            busy_timeout: self
                .busy_timeout
                .unwrap_or(Duration::from_millis(CacheConfig::BUSY_TIMEOUT_MS)),
        })
    }
}
