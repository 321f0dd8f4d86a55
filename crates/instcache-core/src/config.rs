//! Centralized configuration for the installed-software inventory.
//!
//! This module provides configuration constants for the cache layout, the
//! cross-process lock names, and the predefined source identity.

use std::time::Duration;

/// On-disk cache layout and SQLite settings.
pub struct CacheConfig;

impl CacheConfig {
    pub const APP_DIR_NAME: &'static str = "instcache";
    pub const CACHE_DIR_NAME: &'static str = "SysInstCache";
    pub const LOCKS_DIR_NAME: &'static str = "locks";
    pub const CACHE_FILE_NAME: &'static str = "cache.db";

    /// Bumped whenever the way entries are derived from enumerator output
    /// changes, even if the table layout does not.
    pub const CACHE_FORMAT_VERSION: u32 = 1;

    pub const BUSY_TIMEOUT_MS: u64 = 30_000;
}

/// Names of the two cross-process locks guarding the cache.
///
/// The file lock guards the existence of the cache file (shared for use,
/// exclusive for delete-and-recreate). The contents lock serializes warm
/// refreshes of an existing file.
pub struct LockConfig;

impl LockConfig {
    pub const FILE_LOCK_NAME: &'static str = "instcache_SysInstCacheFile";
    pub const CONTENTS_LOCK_NAME: &'static str = "instcache_SysInstCacheContents";
    pub const LOCK_FILE_EXTENSION: &'static str = "lock";

    /// Retry interval for timed exclusive attempts.
    pub const POLL_INTERVAL: Duration = Duration::from_millis(25);
}

/// Identity of the predefined installed source.
pub struct SourceConfig;

impl SourceConfig {
    pub const SOURCE_TYPE: &'static str = "Predefined.Installed";
    pub const SOURCE_IDENTIFIER: &'static str = "*PredefinedInstalledSource";
}

/// Platform package record locations.
pub struct EnumeratorConfig;

impl EnumeratorConfig {
    pub const DPKG_STATUS_PATH: &'static str = "/var/lib/dpkg/status";
    pub const FLATPAK_SYSTEM_DIR: &'static str = "/var/lib/flatpak";
    /// Under the user's local data directory.
    pub const FLATPAK_USER_DIR_NAME: &'static str = "flatpak";
}
