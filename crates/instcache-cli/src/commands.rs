//! Subcommand implementations.
//!
//! Each command returns its rendered output; `main` prints it.

use anyhow::Result;
use clap::Args;
use instcache::platform;
use instcache::{
    CacheOutcome, CacheState, InstalledSourceFactory, ReconcileReport, RefreshOutcome,
    SearchRequest, Source, SourceDetails,
};
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::info;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Case-insensitive substring of identity or name
    #[arg(short, long)]
    pub query: Option<String>,

    /// Required tag (repeatable)
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,

    /// Maximum number of items to print
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

impl ListArgs {
    fn to_request(&self) -> SearchRequest {
        let mut request = SearchRequest::all();
        if let Some(query) = &self.query {
            request = request.with_query(query.clone());
        }
        for tag in &self.tags {
            request = request.with_tag(tag.clone());
        }
        if let Some(limit) = self.limit {
            request = request.with_limit(limit);
        }
        request
    }
}

pub async fn list(factory: Arc<InstalledSourceFactory>, args: &ListArgs) -> Result<String> {
    let handle = factory.create_async(SourceDetails::installed()).await?;
    let result = handle.search(&args.to_request())?;

    if args.json {
        return Ok(serde_json::to_string_pretty(&result)?);
    }

    let mut out = String::new();
    for entry in &result.matches {
        writeln!(
            out,
            "{:<40} {:<24} {:<16} {}",
            entry.identity, entry.version, entry.origin, entry.name
        )?;
    }
    write!(
        out,
        "{} of {} items",
        result.matches.len(),
        result.total_count
    )?;
    Ok(out)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    platform: &'static str,
    cache_file: String,
    state: CacheState,
}

pub fn status(factory: &InstalledSourceFactory, json: bool) -> Result<String> {
    let report = StatusReport {
        platform: platform::current_platform(),
        cache_file: factory.cache_file().display().to_string(),
        state: factory.cache_state()?,
    };

    if json {
        return Ok(serde_json::to_string_pretty(&report)?);
    }

    let state = match report.state {
        CacheState::Absent => "absent".to_string(),
        CacheState::Fresh => "fresh".to_string(),
        CacheState::Stale {
            found,
            format_version,
        } => format!("stale (schema {}, format {})", found, format_version),
        CacheState::Unreadable => "unreadable".to_string(),
    };

    Ok(format!(
        "Platform:   {}\nCache file: {}\nState:      {}",
        report.platform, report.cache_file, state
    ))
}

pub async fn refresh(factory: Arc<InstalledSourceFactory>, json: bool) -> Result<String> {
    let handle = factory.create_async(SourceDetails::installed()).await?;
    let count = handle.count()?;

    if json {
        return Ok(serde_json::to_string_pretty(handle.outcome())?);
    }

    let summary = match handle.outcome() {
        CacheOutcome::Reused {
            refresh: RefreshOutcome::Refreshed(report),
        } => format!("Refreshed cache: {}", describe(report)),
        CacheOutcome::Reused {
            refresh: RefreshOutcome::WaitedForPeer,
        } => "Cache was refreshed by another process".to_string(),
        CacheOutcome::RebuiltOnDisk { populate } => {
            format!("Rebuilt cache: {}", describe(populate))
        }
        CacheOutcome::InMemory { populate } => format!(
            "Cache directory unusable, built in memory only: {}",
            describe(populate)
        ),
    };

    Ok(format!("{}\n{} items installed", summary, count))
}

pub fn clear(factory: &InstalledSourceFactory) -> Result<String> {
    let removed = factory.clear_cache()?;
    let dir = factory.cache_dir().display();

    if removed {
        info!("Cleared cache at {}", dir);
        Ok(format!("Removed {}", dir))
    } else {
        Ok(format!("No cache at {}", dir))
    }
}

fn describe(report: &ReconcileReport) -> String {
    let mut text = format!(
        "{} added, {} updated, {} removed",
        report.added, report.updated, report.removed
    );
    if report.skipped > 0 {
        text.push_str(&format!(", {} skipped", report.skipped));
    }
    if !report.failed_origins.is_empty() {
        let origins: Vec<String> = report.failed_origins.iter().map(|o| o.to_string()).collect();
        text.push_str(&format!(", failed origins: {}", origins.join(", ")));
    }
    text
}
