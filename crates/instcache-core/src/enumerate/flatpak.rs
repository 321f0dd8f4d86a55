//! Flatpak installations.
//!
//! An installation keeps one deployment per ref under
//! `<root>/<kind>/<id>/<arch>/<branch>/`, where `active` links to the
//! deployed commit and `active/metadata` names the ref. Runtimes are shared
//! frameworks; apps are system software in the installation's scope.

use super::{ItemEnumerator, ItemIter};
use crate::error::FieldError;
use crate::models::{InstallScope, InstalledItem, Origin};
use crate::{InventoryError, Result};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

const COMMIT_DISPLAY_LEN: usize = 12;

/// Which refs of an installation to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlatpakKind {
    App,
    Runtime,
}

impl FlatpakKind {
    fn dir_name(&self) -> &'static str {
        match self {
            FlatpakKind::App => "app",
            FlatpakKind::Runtime => "runtime",
        }
    }

    fn metadata_group(&self) -> &'static str {
        match self {
            FlatpakKind::App => "[Application]",
            FlatpakKind::Runtime => "[Runtime]",
        }
    }
}

/// Enumerates deployed refs of one kind across Flatpak installations.
#[derive(Debug, Clone)]
pub struct FlatpakEnumerator {
    origin: Origin,
    kind: FlatpakKind,
    installations: Vec<PathBuf>,
}

impl FlatpakEnumerator {
    /// Runtimes from every given installation, reported as frameworks.
    ///
    /// A runtime deployed in more than one installation is reported once.
    pub fn runtimes<I, P>(installations: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            origin: Origin::Framework,
            kind: FlatpakKind::Runtime,
            installations: installations.into_iter().map(Into::into).collect(),
        }
    }

    /// Apps from one installation, reported in that installation's scope.
    pub fn apps(scope: InstallScope, installation: impl Into<PathBuf>) -> Self {
        Self {
            origin: Origin::System(scope),
            kind: FlatpakKind::App,
            installations: vec![installation.into()],
        }
    }

    pub fn kind(&self) -> FlatpakKind {
        self.kind
    }

    pub fn installations(&self) -> &[PathBuf] {
        &self.installations
    }

    fn enumeration_error(&self, path: &Path, e: std::io::Error) -> InventoryError {
        InventoryError::Enumeration {
            origin: self.origin.to_string(),
            message: format!("Failed to read {}: {}", path.display(), e),
        }
    }

    fn item_error(&self, message: String) -> InventoryError {
        InventoryError::Enumeration {
            origin: self.origin.to_string(),
            message,
        }
    }

    /// Collect every `<id>/<arch>/<branch>` deployment under one installation.
    fn deployments(&self, installation: &Path) -> Result<Vec<Deployment>> {
        let kind_dir = installation.join(self.kind.dir_name());
        let mut deployments = Vec::new();

        for id in subdirs(&kind_dir).map_err(|e| self.enumeration_error(&kind_dir, e))? {
            let id_dir = kind_dir.join(&id);
            for arch in subdirs(&id_dir).map_err(|e| self.enumeration_error(&id_dir, e))? {
                let arch_dir = id_dir.join(&arch);
                for branch in
                    subdirs(&arch_dir).map_err(|e| self.enumeration_error(&arch_dir, e))?
                {
                    deployments.push(Deployment {
                        dir: arch_dir.join(&branch),
                        id: id.clone(),
                        arch: arch.clone(),
                        branch,
                    });
                }
            }
        }

        deployments.sort_by(|a, b| a.dir.cmp(&b.dir));
        Ok(deployments)
    }

    fn deployment_to_item(&self, deployment: &Deployment) -> Result<InstalledItem> {
        let identity = deployment.identity();

        let active = deployment.dir.join("active");
        let commit = std::fs::read_link(&active)
            .ok()
            .and_then(|target| target.file_name().map(|n| n.to_string_lossy().into_owned()))
            .filter(|commit| !commit.is_empty())
            .ok_or_else(|| self.item_error(format!("{} has no active deployment", identity)))?;

        let metadata_path = active.join("metadata");
        let metadata = std::fs::read_to_string(&metadata_path).map_err(|e| {
            self.item_error(format!("{}: {}: {}", identity, metadata_path.display(), e))
        })?;
        let name = metadata_name(&metadata, self.kind.metadata_group())
            .ok_or_else(|| self.item_error(format!("{} metadata has no name", identity)))?;
        if name != deployment.id {
            return Err(self.item_error(format!(
                "{} metadata names a different ref: {}",
                identity, name
            )));
        }

        let version: String = commit.chars().take(COMMIT_DISPLAY_LEN).collect();
        let mut item = InstalledItem::new(self.origin, identity, &deployment.id, version)
            .with_display_name_error(FieldError::new(
                "display_name",
                "flatpak metadata carries no display name",
            ))
            .with_tags([deployment.branch.as_str()]);
        if self.kind == FlatpakKind::Runtime {
            item = item.with_family_name(&deployment.id);
        }
        Ok(item)
    }
}

impl ItemEnumerator for FlatpakEnumerator {
    fn origin(&self) -> Origin {
        self.origin
    }

    fn enumerate(&self) -> Result<ItemIter<'_>> {
        let mut seen = HashSet::new();
        let mut results = Vec::new();

        for installation in &self.installations {
            for deployment in self.deployments(installation)? {
                if !seen.insert(deployment.identity()) {
                    debug!(
                        "Skipping {} in {}, already reported",
                        deployment.identity(),
                        installation.display()
                    );
                    continue;
                }
                results.push(self.deployment_to_item(&deployment));
            }
        }

        debug!(
            "Read {} flatpak {} refs from {} installations",
            results.len(),
            self.kind.dir_name(),
            self.installations.len()
        );
        Ok(Box::new(results.into_iter()))
    }
}

struct Deployment {
    dir: PathBuf,
    id: String,
    arch: String,
    branch: String,
}

impl Deployment {
    fn identity(&self) -> String {
        format!("{}/{}/{}", self.id, self.arch, self.branch)
    }
}

/// Names of the subdirectories of `dir`. A missing directory has none.
fn subdirs(dir: &Path) -> std::io::Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if !name.starts_with('.') {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

/// The `name` key of the given group in a keyfile.
fn metadata_name<'a>(metadata: &'a str, group: &str) -> Option<&'a str> {
    let mut in_group = false;
    for line in metadata.lines().map(str::trim) {
        if line.starts_with('[') {
            in_group = line == group;
            continue;
        }
        if !in_group {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == "name" {
                return Some(value.trim()).filter(|v| !v.is_empty());
            }
        }
    }
    None
}
