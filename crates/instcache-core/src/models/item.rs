//! Installed-item descriptors produced by enumerators.

use crate::error::FieldError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of reading a single optional item field.
pub type FieldResult<T> = std::result::Result<T, FieldError>;

/// Whether a system package is installed for the machine or a single user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallScope {
    Machine,
    User,
}

impl InstallScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallScope::Machine => "machine",
            InstallScope::User => "user",
        }
    }
}

/// A distinct source of installed-item descriptors.
///
/// Identities are only unique within one origin, so every persisted entry is
/// keyed by `<origin key>/<identity>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Origin {
    /// OS package records.
    System(InstallScope),
    /// Application-framework package records.
    Framework,
}

impl Origin {
    /// Every origin, in the order they are enumerated.
    pub const ALL: [Origin; 3] = [
        Origin::System(InstallScope::Machine),
        Origin::System(InstallScope::User),
        Origin::Framework,
    ];

    /// Stable key used to partition identities in the index.
    pub fn key(&self) -> &'static str {
        match self {
            Origin::System(InstallScope::Machine) => "system.machine",
            Origin::System(InstallScope::User) => "system.user",
            Origin::Framework => "framework",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|origin| origin.key() == key)
    }

    pub fn scope(&self) -> Option<InstallScope> {
        match self {
            Origin::System(scope) => Some(*scope),
            Origin::Framework => None,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.key())
    }
}

impl From<Origin> for String {
    fn from(origin: Origin) -> Self {
        origin.key().to_string()
    }
}

impl TryFrom<String> for Origin {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Origin::from_key(&value).ok_or_else(|| format!("unknown origin: {value}"))
    }
}

/// A transient record describing one installed item.
///
/// Created per enumeration pass and discarded after reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledItem {
    pub origin: Origin,
    /// Stable identity within the origin.
    pub identity: String,
    /// Localized display name; may be unreadable.
    pub display_name: FieldResult<String>,
    /// Secondary name used when the display name is unavailable.
    pub package_name: String,
    pub version: String,
    /// Package family identity, for framework packages.
    pub family_name: Option<String>,
    pub tags: Vec<String>,
}

impl InstalledItem {
    pub fn new(
        origin: Origin,
        identity: impl Into<String>,
        package_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            origin,
            identity: identity.into(),
            display_name: Err(FieldError::new("display_name", "not provided")),
            package_name: package_name.into(),
            version: version.into(),
            family_name: None,
            tags: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Ok(name.into());
        self
    }

    pub fn with_display_name_error(mut self, error: FieldError) -> Self {
        self.display_name = Err(error);
        self
    }

    pub fn with_family_name(mut self, family_name: impl Into<String>) -> Self {
        self.family_name = Some(family_name.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Unique key of this item across all origins.
    pub fn source_key(&self) -> String {
        format!("{}/{}", self.origin.key(), self.identity)
    }

    /// The name to index: the display name, or the package name when the
    /// display name is unavailable or blank.
    pub fn resolved_name(&self) -> &str {
        match &self.display_name {
            Ok(name) if !name.trim().is_empty() => name,
            _ => &self.package_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_key_roundtrip() {
        for origin in Origin::ALL {
            assert_eq!(Origin::from_key(origin.key()), Some(origin));
        }
        assert_eq!(Origin::from_key("registry"), None);
    }

    #[test]
    fn test_origin_serializes_as_key() {
        let json = serde_json::to_string(&Origin::System(InstallScope::User)).unwrap();
        assert_eq!(json, "\"system.user\"");
        let parsed: Origin = serde_json::from_str("\"framework\"").unwrap();
        assert_eq!(parsed, Origin::Framework);
    }

    #[test]
    fn test_resolved_name_falls_back_to_package_name() {
        let item = InstalledItem::new(Origin::Framework, "Contoso.App_8wekyb", "Contoso.App", "1.0");
        assert_eq!(item.resolved_name(), "Contoso.App");

        let item = item.with_display_name("   ");
        assert_eq!(item.resolved_name(), "Contoso.App");

        let item = item.with_display_name("Contoso App");
        assert_eq!(item.resolved_name(), "Contoso App");
    }

    #[test]
    fn test_source_key_partitions_by_origin() {
        let machine = InstalledItem::new(Origin::System(InstallScope::Machine), "git", "git", "2.43");
        let user = InstalledItem::new(Origin::System(InstallScope::User), "git", "git", "2.43");
        assert_ne!(machine.source_key(), user.source_key());
        assert_eq!(machine.source_key(), "system.machine/git");
    }
}
