use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};

use module_versions::config::{EngineConfig, log_dir};
use module_versions::logging;
use module_versions::update::detector::UpdateDetector;
use module_versions::update::memory::MemoryStore;
use module_versions::update::types::InstallationId;
use module_versions::version::cache::ParseCache;
use module_versions::version::comparator::VersionComparator;
use module_versions::version::parser::{normalize, parse};

#[derive(Parser)]
#[command(name = "module-versions")]
#[command(version, about = "Version parsing and update detection for module catalogs")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the parsed structure of a version
    Parse { version: String },
    /// Print the canonical semantic form of a version
    Normalize { version: String },
    /// Compare two versions
    Compare { a: String, b: String },
    /// Print the latest of the given versions
    Latest {
        /// Only consider stable and security releases
        #[arg(long)]
        stable_only: bool,
        #[arg(required = true)]
        versions: Vec<String>,
    },
    /// Group versions by branch
    Branches {
        #[arg(required = true)]
        versions: Vec<String>,
    },
    /// Keep versions on a platform track and/or major version
    Compatible {
        #[arg(long)]
        track: Option<String>,
        #[arg(long)]
        major: Option<u64>,
        #[arg(required = true)]
        versions: Vec<String>,
    },
    /// Print the distance from one version to another
    Distance { from: String, to: String },
    /// Check every pending installation in a snapshot
    Check {
        /// JSON snapshot of modules and installations
        #[arg(long)]
        snapshot: PathBuf,
        /// Maximum number of module/version pairs to check
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Check installations and store their update flags in the snapshot
    Refresh {
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(required = true)]
        installations: Vec<InstallationId>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.as_deref())?;
    let _guard = logging::init(&config.log, Some(&log_dir()))?;

    let comparator = if config.cache.enabled {
        VersionComparator::with_cache(Arc::new(ParseCache::new(config.cache.capacity)))
    } else {
        VersionComparator::new()
    };

    match cli.command {
        Command::Parse { version } => print_json(&parse(&version)?),
        Command::Normalize { version } => {
            println!("{}", normalize(&version));
            Ok(())
        }
        Command::Compare { a, b } => {
            let symbol = match comparator.compare(&a, &b)? {
                Ordering::Less => "<",
                Ordering::Equal => "=",
                Ordering::Greater => ">",
            };
            println!("{} {} {}", a, symbol, b);
            Ok(())
        }
        Command::Latest {
            stable_only,
            versions,
        } => {
            let latest = comparator
                .get_latest_version(&versions, stable_only)
                .context("No parsable version given")?;
            println!("{}", latest);
            Ok(())
        }
        Command::Branches { versions } => {
            print_json(&comparator.group_versions_by_branch(&versions))
        }
        Command::Compatible {
            track,
            major,
            versions,
        } => {
            for version in
                comparator.filter_compatible_versions(&versions, track.as_deref(), major)
            {
                println!("{}", version);
            }
            Ok(())
        }
        Command::Distance { from, to } => {
            print_json(&comparator.calculate_version_distance(&from, &to)?.to_map())
        }
        Command::Check { snapshot, limit } => {
            let limit = limit.unwrap_or(config.detector.pending_limit);
            runtime()?.block_on(check(&snapshot, limit, comparator))
        }
        Command::Refresh {
            snapshot,
            installations,
        } => runtime()?.block_on(refresh(&snapshot, &installations, comparator)),
    }
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_store(path: &Path) -> anyhow::Result<Arc<MemoryStore>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {:?}", path))?;
    let store = MemoryStore::from_json(&content)
        .with_context(|| format!("Failed to parse snapshot {:?}", path))?;
    Ok(Arc::new(store))
}

async fn check(snapshot: &Path, limit: usize, comparator: VersionComparator) -> anyhow::Result<()> {
    let store = load_store(snapshot)?;
    let detector = UpdateDetector::new(store.clone(), store).with_comparator(comparator);

    let pairs = detector.get_modules_needing_check(limit).await?;
    info!("Checking {} module/version pairs", pairs.len());

    print_json(&detector.batch_check_updates(&pairs).await)
}

async fn refresh(
    snapshot: &Path,
    installation_ids: &[InstallationId],
    comparator: VersionComparator,
) -> anyhow::Result<()> {
    let store = load_store(snapshot)?;
    let detector = UpdateDetector::new(store.clone(), store.clone()).with_comparator(comparator);

    let outcomes = detector.refresh_installations(installation_ids).await;
    let failed = outcomes
        .iter()
        .filter(|outcome| outcome.result.is_err())
        .count();

    let snapshot = store.snapshot()?;
    let refreshed: Vec<_> = snapshot
        .installations
        .iter()
        .filter(|record| installation_ids.contains(&record.id))
        .collect();
    print_json(&refreshed)?;

    if failed > 0 {
        error!("{} of {} installations were not updated", failed, outcomes.len());
        anyhow::bail!("Failed to refresh {} installations", failed);
    }
    Ok(())
}
