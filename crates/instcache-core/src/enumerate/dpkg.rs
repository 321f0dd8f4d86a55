//! Debian package status records.
//!
//! Reads the dpkg `status` database: RFC 822 style stanzas separated by blank
//! lines, one per known package. Only stanzas whose `Status` ends in
//! `installed` are reported.

use super::{ItemEnumerator, ItemIter};
use crate::error::FieldError;
use crate::models::{InstallScope, InstalledItem, Origin};
use crate::{InventoryError, Result};
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const ORIGIN: Origin = Origin::System(InstallScope::Machine);

/// Enumerates packages recorded in a dpkg status file.
#[derive(Debug, Clone)]
pub struct DpkgStatusEnumerator {
    status_path: PathBuf,
}

impl DpkgStatusEnumerator {
    pub fn new(status_path: impl Into<PathBuf>) -> Self {
        Self {
            status_path: status_path.into(),
        }
    }

    pub fn status_path(&self) -> &Path {
        &self.status_path
    }
}

impl ItemEnumerator for DpkgStatusEnumerator {
    fn origin(&self) -> Origin {
        ORIGIN
    }

    fn enumerate(&self) -> Result<ItemIter<'_>> {
        let bytes = std::fs::read(&self.status_path).map_err(|e| InventoryError::Enumeration {
            origin: ORIGIN.to_string(),
            message: format!("Failed to read {}: {}", self.status_path.display(), e),
        })?;

        // Stray non-UTF-8 bytes only degrade the stanzas that contain them
        let contents = String::from_utf8_lossy(&bytes);
        if matches!(contents, Cow::Owned(_)) {
            warn!(
                "{} contains invalid UTF-8, affected fields are replaced",
                self.status_path.display()
            );
        }

        let items = parse_status(&contents);
        debug!(
            "Read {} installed dpkg records from {}",
            items.len(),
            self.status_path.display()
        );
        Ok(Box::new(items.into_iter()))
    }
}

/// Parse a dpkg status file into per-package results.
///
/// Packages that are known but not installed are omitted. A stanza missing
/// `Package` or `Version` yields an `Err` entry.
pub fn parse_status(contents: &str) -> Vec<Result<InstalledItem>> {
    let mut results = Vec::new();
    let mut fields: HashMap<&str, &str> = HashMap::new();

    for line in contents.lines().map(|l| l.trim_end_matches('\r')) {
        if line.trim().is_empty() {
            if let Some(result) = stanza_to_item(&fields) {
                results.push(result);
            }
            fields.clear();
            continue;
        }

        // Continuation of a multi-line field
        if line.starts_with(' ') || line.starts_with('\t') {
            continue;
        }

        if let Some((key, value)) = line.split_once(':') {
            fields.insert(key.trim(), value.trim());
        }
    }

    if let Some(result) = stanza_to_item(&fields) {
        results.push(result);
    }

    results
}

fn stanza_to_item(fields: &HashMap<&str, &str>) -> Option<Result<InstalledItem>> {
    if fields.is_empty() {
        return None;
    }

    let installed = fields
        .get("Status")
        .and_then(|status| status.split_whitespace().nth(2))
        .is_some_and(|state| state == "installed");
    if !installed {
        return None;
    }

    let Some(package) = fields.get("Package").filter(|p| !p.is_empty()) else {
        return Some(Err(InventoryError::Enumeration {
            origin: ORIGIN.to_string(),
            message: "installed record without a Package field".to_string(),
        }));
    };

    let Some(version) = fields.get("Version").filter(|v| !v.is_empty()) else {
        return Some(Err(InventoryError::Enumeration {
            origin: ORIGIN.to_string(),
            message: format!("installed record {} has no Version field", package),
        }));
    };

    if package.contains(char::REPLACEMENT_CHARACTER)
        || version.contains(char::REPLACEMENT_CHARACTER)
    {
        return Some(Err(InventoryError::Enumeration {
            origin: ORIGIN.to_string(),
            message: format!("installed record {} has an undecodable name or version", package),
        }));
    }

    let identity = match fields.get("Architecture") {
        Some(arch) if !arch.is_empty() => format!("{}:{}", package, arch),
        _ => package.to_string(),
    };

    let tags = fields
        .get("Section")
        .and_then(|section| section.rsplit('/').next())
        .filter(|section| !section.is_empty())
        .map(|section| vec![section.to_string()])
        .unwrap_or_default();

    Some(Ok(InstalledItem::new(ORIGIN, identity, *package, *version)
        .with_display_name_error(FieldError::new(
            "display_name",
            "dpkg records carry no display name",
        ))
        .with_tags(tags)))
}
