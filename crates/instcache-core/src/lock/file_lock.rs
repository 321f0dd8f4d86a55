//! File-backed named locks shared across processes.

use super::{LockHandle, LockMode, LockProvider};
use crate::config::LockConfig;
use crate::{InventoryError, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

/// Lock provider that maps each name to `<lock_dir>/<name>.lock`.
///
/// Uses `fs2` advisory locks (flock on Unix, LockFileEx on Windows). These
/// belong to the open file, not the process, so two handles opened by the
/// same process exclude each other just as two processes would.
#[derive(Debug, Clone)]
pub struct FileLockProvider {
    lock_dir: PathBuf,
}

impl FileLockProvider {
    pub fn new(lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            lock_dir: lock_dir.into(),
        }
    }

    /// Open the provider at the platform lock directory.
    pub fn platform_default() -> Result<Self> {
        Ok(Self::new(crate::platform::lock_dir()?))
    }

    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }

    /// Path of the lock file backing `name`.
    pub fn lock_path(&self, name: &str) -> Result<PathBuf> {
        let file_name = sanitize_lock_name(name)?;
        Ok(self
            .lock_dir
            .join(format!("{}.{}", file_name, LockConfig::LOCK_FILE_EXTENSION)))
    }

    fn open_lock_file(&self, name: &str) -> Result<File> {
        let path = self.lock_path(name)?;

        std::fs::create_dir_all(&self.lock_dir)
            .map_err(|e| InventoryError::io_with_path(e, &self.lock_dir))?;

        OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| InventoryError::io_with_path(e, &path))
    }

    fn lock_error(name: &str, err: std::io::Error) -> InventoryError {
        InventoryError::Lock {
            name: name.to_string(),
            message: err.to_string(),
        }
    }
}

impl LockProvider for FileLockProvider {
    fn lock_shared(&self, name: &str) -> Result<LockHandle> {
        let file = self.open_lock_file(name)?;
        FileExt::lock_shared(&file).map_err(|e| Self::lock_error(name, e))?;
        debug!("Acquired shared lock {}", name);
        Ok(LockHandle::from_file(name, LockMode::Shared, file))
    }

    fn lock_exclusive(&self, name: &str) -> Result<LockHandle> {
        let file = self.open_lock_file(name)?;
        FileExt::lock_exclusive(&file).map_err(|e| Self::lock_error(name, e))?;
        debug!("Acquired exclusive lock {}", name);
        Ok(LockHandle::from_file(name, LockMode::Exclusive, file))
    }

    fn try_lock_exclusive(&self, name: &str, timeout: Duration) -> Result<Option<LockHandle>> {
        let file = self.open_lock_file(name)?;
        let deadline = Instant::now() + timeout;

        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    debug!("Acquired exclusive lock {} without waiting", name);
                    return Ok(Some(LockHandle::from_file(name, LockMode::Exclusive, file)));
                }
                Err(e) if is_contended(&e) => {
                    let now = Instant::now();
                    if now >= deadline {
                        debug!("Exclusive lock {} is held elsewhere", name);
                        return Ok(None);
                    }
                    std::thread::sleep(LockConfig::POLL_INTERVAL.min(deadline - now));
                }
                Err(e) => return Err(Self::lock_error(name, e)),
            }
        }
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
        || err.kind() == std::io::ErrorKind::WouldBlock
}

/// Reduce a lock name to a portable file name.
fn sanitize_lock_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(InventoryError::InvalidArgument(
            "lock name must not be empty".to_string(),
        ));
    }

    Ok(trimmed
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn create_test_provider() -> (FileLockProvider, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let provider = FileLockProvider::new(temp_dir.path().join("locks"));
        (provider, temp_dir)
    }

    #[test]
    fn test_sanitize_lock_name() {
        assert_eq!(sanitize_lock_name("Cache_File-1.v2").unwrap(), "Cache_File-1.v2");
        assert_eq!(sanitize_lock_name("Global\\cache/file").unwrap(), "Global_cache_file");
        assert!(sanitize_lock_name("  ").is_err());
    }

    #[test]
    fn test_lock_path_inside_lock_dir() {
        let (provider, _temp) = create_test_provider();
        let path = provider.lock_path("cache").unwrap();
        assert!(path.starts_with(provider.lock_dir()));
        assert!(path.to_string_lossy().ends_with("cache.lock"));
    }

    #[test]
    fn test_shared_holders_coexist() {
        let (provider, _temp) = create_test_provider();

        let first = provider.lock_shared("file").unwrap();
        let second = provider.lock_shared("file").unwrap();
        assert_eq!(first.mode(), Some(LockMode::Shared));
        assert_eq!(second.mode(), Some(LockMode::Shared));

        // A writer is shut out while readers hold the lock
        assert!(provider.try_lock_exclusive("file", Duration::ZERO).unwrap().is_none());

        drop(first);
        assert!(provider.try_lock_exclusive("file", Duration::ZERO).unwrap().is_none());

        drop(second);
        assert!(provider.try_lock_exclusive("file", Duration::ZERO).unwrap().is_some());
    }

    #[test]
    fn test_exclusive_excludes_exclusive() {
        let (provider, _temp) = create_test_provider();

        let held = provider.lock_exclusive("contents").unwrap();
        assert!(provider.try_lock_exclusive("contents", Duration::ZERO).unwrap().is_none());

        held.release();
        let reacquired = provider.try_lock_exclusive("contents", Duration::ZERO).unwrap();
        assert_eq!(reacquired.map(|h| h.mode()), Some(Some(LockMode::Exclusive)));
    }

    #[test]
    fn test_distinct_names_are_independent() {
        let (provider, _temp) = create_test_provider();

        let _file = provider.lock_exclusive("file").unwrap();
        assert!(provider.try_lock_exclusive("contents", Duration::ZERO).unwrap().is_some());
    }

    #[test]
    fn test_zero_timeout_does_not_block() {
        let (provider, _temp) = create_test_provider();

        let _held = provider.lock_exclusive("file").unwrap();
        let start = Instant::now();
        assert!(provider.try_lock_exclusive("file", Duration::ZERO).unwrap().is_none());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_timed_attempt_succeeds_after_release() {
        let (provider, _temp) = create_test_provider();

        let held = provider.lock_exclusive("file").unwrap();
        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            drop(held);
        });

        let acquired = provider
            .try_lock_exclusive("file", Duration::from_secs(10))
            .unwrap();
        assert!(acquired.is_some());
        releaser.join().unwrap();
    }

    #[test]
    fn test_shared_waits_for_exclusive_holder() {
        let (provider, _temp) = create_test_provider();
        let provider = Arc::new(provider);
        let released = Arc::new(AtomicBool::new(false));

        let held = provider.lock_exclusive("contents").unwrap();

        let waiter = {
            let provider = Arc::clone(&provider);
            let released = Arc::clone(&released);
            thread::spawn(move || {
                let _shared = provider.lock_shared("contents").unwrap();
                released.load(Ordering::SeqCst)
            })
        };

        thread::sleep(Duration::from_millis(100));
        released.store(true, Ordering::SeqCst);
        drop(held);

        assert!(waiter.join().unwrap(), "shared lock was granted while exclusive was held");
    }

    #[test]
    fn test_lock_dir_is_created_on_demand() {
        let (provider, _temp) = create_test_provider();
        assert!(!provider.lock_dir().exists());
        let _handle = provider.lock_shared("file").unwrap();
        assert!(provider.lock_dir().exists());
    }
}
