//! instcache - Inspect and maintain the installed-software inventory cache.
//!
//! Opens the predefined installed source the same way library callers do,
//! so running `instcache refresh` warms the cache for every other process.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use instcache::{DpkgStatusEnumerator, InstalledSourceFactory};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "instcache")]
#[command(about = "Cached inventory of installed software")]
struct Args {
    /// Cache directory (defaults to the platform cache area)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Lock file directory (defaults to a sibling of the cache directory)
    #[arg(long, global = true)]
    lock_dir: Option<PathBuf>,

    /// Read installed packages from this dpkg status file only
    #[arg(long, global = true)]
    dpkg_status: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List installed items
    List(commands::ListArgs),

    /// Show the state of the on-disk cache
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Open the source, refreshing or rebuilding the cache
    Refresh {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Delete the on-disk cache
    Clear,
}

fn build_factory(args: &Args) -> Result<InstalledSourceFactory> {
    let mut builder = InstalledSourceFactory::builder();

    if let Some(dir) = &args.cache_dir {
        builder = builder.cache_dir(dir);
    }
    if let Some(dir) = &args.lock_dir {
        builder = builder.lock_dir(dir);
    }
    if let Some(path) = &args.dpkg_status {
        builder = builder.enumerator(DpkgStatusEnumerator::new(path));
    }

    Ok(builder.build()?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging; stdout is reserved for command output
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let factory = Arc::new(build_factory(&args)?);
    debug!("Cache directory: {}", factory.cache_dir().display());

    let output = match args.command {
        Command::List(list_args) => commands::list(factory, &list_args).await?,
        Command::Status { json } => commands::status(&factory, json)?,
        Command::Refresh { json } => commands::refresh(factory, json).await?,
        Command::Clear => commands::clear(&factory)?,
    };

    println!("{}", output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "instcache",
            "list",
            "--query",
            "git",
            "--cache-dir",
            "/tmp/cache",
            "--debug",
        ])
        .unwrap();

        assert!(args.debug);
        assert_eq!(args.cache_dir, Some(PathBuf::from("/tmp/cache")));
        match args.command {
            Command::List(list) => assert_eq!(list.query.as_deref(), Some("git")),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Args::try_parse_from(["instcache"]).is_err());
    }
}
