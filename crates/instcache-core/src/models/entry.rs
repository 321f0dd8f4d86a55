//! Persisted inventory entries.

use super::item::{InstallScope, Origin};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable internal handle of an indexed entry.
///
/// Assigned on insert and never reused while the entry exists, so metadata
/// and removal can target a row without re-deriving its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub i64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Well-known metadata kinds attached to entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetadataKind {
    /// The packaging technology the item was installed with.
    InstalledType,
    /// Machine or user install scope.
    InstalledScope,
}

impl MetadataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataKind::InstalledType => "installed-type",
            MetadataKind::InstalledScope => "installed-scope",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "installed-type" => Some(MetadataKind::InstalledType),
            "installed-scope" => Some(MetadataKind::InstalledScope),
            _ => None,
        }
    }
}

/// Values of the `installed-type` metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstalledType {
    Framework,
}

impl InstalledType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstalledType::Framework => "framework",
        }
    }
}

impl Origin {
    /// Metadata every entry from this origin carries.
    pub fn implied_metadata(&self) -> Vec<(MetadataKind, &'static str)> {
        match self {
            Origin::System(scope) => vec![(MetadataKind::InstalledScope, scope.as_str())],
            Origin::Framework => vec![(
                MetadataKind::InstalledType,
                InstalledType::Framework.as_str(),
            )],
        }
    }
}

/// Compact view of an entry as returned by a full scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrySummary {
    pub identity: String,
    pub name: String,
    pub version: String,
    pub origin: Origin,
}

/// A persisted inventory record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedEntry {
    pub row_id: RowId,
    pub identity: String,
    pub name: String,
    pub version: String,
    pub origin: Origin,
    pub family_name: Option<String>,
    pub tags: Vec<String>,
    pub metadata: BTreeMap<MetadataKind, String>,
    pub indexed_at: String,
}

impl IndexedEntry {
    pub fn scope(&self) -> Option<InstallScope> {
        self.origin.scope()
    }

    pub fn summary(&self) -> EntrySummary {
        EntrySummary {
            identity: self.identity.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
            origin: self.origin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_kind_roundtrip() {
        for kind in [MetadataKind::InstalledType, MetadataKind::InstalledScope] {
            assert_eq!(MetadataKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(MetadataKind::from_str("publisher"), None);
    }

    #[test]
    fn test_framework_origin_implies_installed_type() {
        let metadata = Origin::Framework.implied_metadata();
        assert_eq!(metadata, vec![(MetadataKind::InstalledType, "framework")]);

        let metadata = Origin::System(InstallScope::User).implied_metadata();
        assert_eq!(metadata, vec![(MetadataKind::InstalledScope, "user")]);
    }
}
