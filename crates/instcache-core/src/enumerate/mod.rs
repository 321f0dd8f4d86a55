//! Installed-item enumerators.
//!
//! Each enumerator walks one origin's package records and yields one result
//! per item. Enumeration is restartable: every refresh calls
//! [`ItemEnumerator::enumerate`] again.
//!
//! - `dpkg` - Debian package status records (system, machine scope)
//! - `flatpak` - Flatpak runtimes (frameworks) and apps (system, per scope)
//! - `StaticEnumerator` - A fixed item list, for embedding callers

mod dpkg;
mod flatpak;

pub use dpkg::{parse_status, DpkgStatusEnumerator};
pub use flatpak::{FlatpakEnumerator, FlatpakKind};

use crate::models::{InstalledItem, Origin};
use crate::Result;

/// Lazy sequence of per-item results.
///
/// An `Err` item is a per-item failure; the caller skips it and continues.
pub type ItemIter<'a> = Box<dyn Iterator<Item = Result<InstalledItem>> + Send + 'a>;

/// A source of installed-item descriptors for one origin.
pub trait ItemEnumerator: Send + Sync {
    /// The origin every yielded item belongs to.
    fn origin(&self) -> Origin;

    /// Start a fresh enumeration pass.
    ///
    /// An `Err` here means the whole origin is unavailable this cycle.
    fn enumerate(&self) -> Result<ItemIter<'_>>;
}

/// Enumerator over a fixed list of items.
#[derive(Debug, Clone)]
pub struct StaticEnumerator {
    origin: Origin,
    items: Vec<InstalledItem>,
}

impl StaticEnumerator {
    pub fn new(origin: Origin, items: Vec<InstalledItem>) -> Self {
        Self { origin, items }
    }
}

impl ItemEnumerator for StaticEnumerator {
    fn origin(&self) -> Origin {
        self.origin
    }

    fn enumerate(&self) -> Result<ItemIter<'_>> {
        Ok(Box::new(self.items.iter().cloned().map(Ok)))
    }
}

/// The enumerators available on the current platform.
pub fn platform_enumerators() -> Vec<Box<dyn ItemEnumerator>> {
    #[allow(unused_mut)]
    let mut enumerators: Vec<Box<dyn ItemEnumerator>> = Vec::new();

    #[cfg(target_os = "linux")]
    {
        use crate::config::EnumeratorConfig;
        use crate::models::InstallScope;
        use std::path::PathBuf;

        let status_path = std::path::Path::new(EnumeratorConfig::DPKG_STATUS_PATH);
        if status_path.exists() {
            enumerators.push(Box::new(DpkgStatusEnumerator::new(status_path)));
        }

        let system_flatpak = PathBuf::from(EnumeratorConfig::FLATPAK_SYSTEM_DIR);
        let user_flatpak =
            dirs::data_local_dir().map(|dir| dir.join(EnumeratorConfig::FLATPAK_USER_DIR_NAME));

        let installations: Vec<PathBuf> = std::iter::once(system_flatpak.clone())
            .chain(user_flatpak.clone())
            .filter(|dir| dir.is_dir())
            .collect();
        if !installations.is_empty() {
            enumerators.push(Box::new(FlatpakEnumerator::runtimes(installations)));
        }
        if system_flatpak.is_dir() {
            enumerators.push(Box::new(FlatpakEnumerator::apps(
                InstallScope::Machine,
                system_flatpak,
            )));
        }
        if let Some(user_flatpak) = user_flatpak.filter(|dir| dir.is_dir()) {
            enumerators.push(Box::new(FlatpakEnumerator::apps(InstallScope::User, user_flatpak)));
        }
    }

    enumerators
}
