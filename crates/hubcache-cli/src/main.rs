//! # hubcache CLI
//!
//! Command-line interface for inspecting and pruning a local hub cache.
//!
//! ## Commands
//!
//! - `hubcache scan` - report cached repos and their deduplicated disk usage
//! - `hubcache delete <REVISION>...` - plan and apply removal of cached revisions

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use hubcache_core::{scan_cache_dir, CachedRepo, RepoType};

mod render;

use render::{format_size, parse_age, parse_size, OutputFormat};

/// Hub cache inspector and janitor
#[derive(Parser)]
#[command(name = "hubcache")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Cache directory to operate on (defaults to the hub download cache)
    #[arg(long, env = "HF_HUB_CACHE", global = true)]
    cache_dir: Option<PathBuf>,

    /// Increase log verbosity (-v: info, -vv: debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the cache and report disk usage
    Scan {
        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,

        /// One row per cached revision instead of per repo
        #[arg(long)]
        revisions: bool,

        /// Only report repos of this type
        #[arg(long, value_enum)]
        repo_type: Option<RepoTypeFilter>,

        /// Only report repos at least this large (e.g. 500K, 1.5M, 2G)
        #[arg(long, value_parser = parse_size)]
        min_size: Option<u64>,

        /// Only report repos last accessed longer ago than this (e.g. 7d, 12h, 30m)
        #[arg(long, value_parser = parse_age)]
        accessed_before: Option<Duration>,
    },

    /// Delete cached revisions by commit hash
    Delete {
        /// Full 40-character commit hashes to delete
        #[arg(value_name = "REVISION", required = true)]
        revisions: Vec<String>,

        /// Print the plan without touching disk
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Repo type filter for `scan`.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum RepoTypeFilter {
    Model,
    Dataset,
    Space,
}

impl From<RepoTypeFilter> for RepoType {
    fn from(value: RepoTypeFilter) -> Self {
        match value {
            RepoTypeFilter::Model => RepoType::Model,
            RepoTypeFilter::Dataset => RepoType::Dataset,
            RepoTypeFilter::Space => RepoType::Space,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Scan {
            format,
            revisions,
            repo_type,
            min_size,
            accessed_before,
        } => cmd_scan(
            cli.cache_dir.as_deref(),
            format,
            revisions,
            &ScanFilter {
                repo_type: repo_type.map(RepoType::from),
                min_size,
                accessed_before,
            },
        ),
        Commands::Delete {
            revisions,
            dry_run,
            yes,
        } => cmd_delete(cli.cache_dir.as_deref(), &revisions, dry_run, yes),
    }
}

/// Initialize tracing output on stderr. `RUST_LOG` overrides the verbosity
/// flags when set.
fn init_logging(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Attribute filters evaluated against the scan report.
struct ScanFilter {
    repo_type: Option<RepoType>,
    min_size: Option<u64>,
    accessed_before: Option<Duration>,
}

impl ScanFilter {
    fn matches(&self, repo: &CachedRepo) -> bool {
        if let Some(repo_type) = self.repo_type {
            if repo.repo_type != repo_type {
                return false;
            }
        }
        if let Some(min_size) = self.min_size {
            if repo.size_on_disk < min_size {
                return false;
            }
        }
        if let Some(age) = self.accessed_before {
            let old_enough = SystemTime::now()
                .duration_since(repo.last_accessed)
                .map(|elapsed| elapsed >= age)
                .unwrap_or(false);
            if !old_enough {
                return false;
            }
        }
        true
    }
}

fn cmd_scan(
    cache_dir: Option<&Path>,
    format: OutputFormat,
    show_revisions: bool,
    filter: &ScanFilter,
) -> Result<()> {
    let report = scan_cache_dir(cache_dir)?;
    let repos: Vec<&CachedRepo> = report.repos.iter().filter(|r| filter.matches(r)).collect();

    render::render(&report, &repos, show_revisions, format)?;
    Ok(())
}

fn cmd_delete(
    cache_dir: Option<&Path>,
    revisions: &[String],
    dry_run: bool,
    yes: bool,
) -> Result<()> {
    let report = scan_cache_dir(cache_dir)?;
    let plan = report.delete_revisions(revisions);

    if plan.is_empty() {
        println!("Nothing to delete.");
        return Ok(());
    }

    // Preview comes before anything destructive, dry run or not.
    println!("Deletion plan:");
    for path in &plan.repos {
        println!("  repo      {}", path.display());
    }
    for path in &plan.snapshots {
        println!("  snapshot  {}", path.display());
    }
    for path in &plan.blobs {
        println!("  blob      {}", path.display());
    }
    for path in &plan.refs {
        println!("  ref       {}", path.display());
    }
    println!(
        "\n{} repo(s), {} snapshot(s), {} blob(s), {} ref(s); will free {}.",
        plan.repos.len(),
        plan.snapshots.len(),
        plan.blobs.len(),
        plan.refs.len(),
        format_size(plan.expected_freed_size)
    );

    if dry_run {
        println!("Dry run: no files were deleted.");
        return Ok(());
    }

    if !yes && !confirm("Proceed with deletion?")? {
        println!("Aborted.");
        return Ok(());
    }

    plan.execute();
    println!("Done. Freed {}.", format_size(plan.expected_freed_size));
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}
