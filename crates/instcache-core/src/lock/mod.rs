//! Named, machine-wide reader/writer locks.
//!
//! Locks are obtained from a [`LockProvider`] keyed by name and returned as an
//! owned [`LockHandle`]. The handle is neither `Clone` nor `Copy`; the lock is
//! released exactly once, when the handle is dropped or passed to
//! [`LockHandle::release`].

mod file_lock;

pub use file_lock::FileLockProvider;

use crate::Result;
use std::fmt;
use std::fs::File;
use std::time::Duration;
use tracing::{debug, warn};

/// Ownership role held through a lock handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Shared => f.write_str("shared"),
            LockMode::Exclusive => f.write_str("exclusive"),
        }
    }
}

/// Source of named cross-process locks.
///
/// Any number of shared holders may coexist; an exclusive holder excludes
/// every other holder. Acquisition either returns a ready handle or fails.
pub trait LockProvider: Send + Sync {
    /// Block until shared access to `name` is available.
    fn lock_shared(&self, name: &str) -> Result<LockHandle>;

    /// Block until exclusive access to `name` is available.
    fn lock_exclusive(&self, name: &str) -> Result<LockHandle>;

    /// Attempt exclusive access, giving up after `timeout`.
    ///
    /// `Duration::ZERO` makes exactly one attempt and never blocks.
    /// `Ok(None)` means another holder kept the lock for the whole window.
    fn try_lock_exclusive(&self, name: &str, timeout: Duration) -> Result<Option<LockHandle>>;
}

enum HandleInner {
    File(File),
    Null,
}

/// Owned token for a held lock.
#[must_use = "the lock is released as soon as the handle is dropped"]
pub struct LockHandle {
    name: String,
    mode: Option<LockMode>,
    inner: HandleInner,
}

impl LockHandle {
    /// A handle that guards nothing, for state no other process can see.
    pub fn null() -> Self {
        Self {
            name: String::new(),
            mode: None,
            inner: HandleInner::Null,
        }
    }

    pub(crate) fn from_file(name: &str, mode: LockMode, file: File) -> Self {
        Self {
            name: name.to_string(),
            mode: Some(mode),
            inner: HandleInner::File(file),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The held role, or `None` for the null lock.
    pub fn mode(&self) -> Option<LockMode> {
        self.mode
    }

    pub fn is_null(&self) -> bool {
        matches!(self.inner, HandleInner::Null)
    }

    /// Release the lock now.
    pub fn release(self) {
        drop(self);
    }
}

impl fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockHandle")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .finish()
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if let HandleInner::File(file) = &self.inner {
            match fs2::FileExt::unlock(file) {
                Ok(()) => debug!("Released {:?} lock {}", self.mode, self.name),
                // Closing the file below still drops the OS lock
                Err(e) => warn!("Failed to unlock {}: {}", self.name, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handle() {
        let handle = LockHandle::null();
        assert!(handle.is_null());
        assert_eq!(handle.mode(), None);
        handle.release();
    }

    #[test]
    fn test_lock_mode_display() {
        assert_eq!(LockMode::Shared.to_string(), "shared");
        assert_eq!(LockMode::Exclusive.to_string(), "exclusive");
    }
}
