//! Platform-specific path utilities.
//!
//! This module resolves the machine-local locations used by the inventory:
//! - The cache directory holding the index file
//! - The lock directory holding the cross-process lock files

use crate::config::CacheConfig;
use crate::error::{InventoryError, Result};
use std::path::PathBuf;

/// Get the instcache root inside the platform cache area.
///
/// # Platform Behavior
/// - **Linux**: `~/.cache/instcache` (XDG_CACHE_HOME)
/// - **Windows**: `%LOCALAPPDATA%\instcache`
/// - **macOS**: `~/Library/Caches/instcache`
pub fn app_cache_root() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir().ok_or_else(|| InventoryError::Config {
        message: "Could not determine platform cache directory".to_string(),
    })?;
    Ok(cache_dir.join(CacheConfig::APP_DIR_NAME))
}

/// Get the directory that holds the installed-inventory index.
///
/// The whole directory is deleted and recreated on every disk rebuild, so
/// nothing else may live in it.
pub fn local_cache_dir() -> Result<PathBuf> {
    Ok(app_cache_root()?.join(CacheConfig::CACHE_DIR_NAME))
}

/// Get the directory that holds the named lock files.
///
/// Kept beside, not inside, the cache directory so that a rebuild can
/// remove the cache directory while the locks are held.
pub fn lock_dir() -> Result<PathBuf> {
    Ok(app_cache_root()?.join(CacheConfig::LOCKS_DIR_NAME))
}

/// Get the path of the index file inside a cache directory.
pub fn cache_file_in(cache_dir: &std::path::Path) -> PathBuf {
    cache_dir.join(CacheConfig::CACHE_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_and_lock_dirs_are_siblings() {
        // May fail in environments without a home directory
        let (Ok(cache), Ok(locks)) = (local_cache_dir(), lock_dir()) else {
            return;
        };
        assert_eq!(cache.parent(), locks.parent());
        assert!(!locks.starts_with(&cache));
    }

    #[test]
    fn test_app_cache_root_contains_app_name() {
        if let Ok(dir) = app_cache_root() {
            assert!(
                dir.to_string_lossy().contains("instcache"),
                "Cache root should contain 'instcache': {:?}",
                dir
            );
        }
    }

    #[test]
    fn test_cache_file_in_ends_with_db() {
        let path = cache_file_in(std::path::Path::new("/tmp/cache"));
        assert!(path.to_string_lossy().ends_with("cache.db"));
    }
}
