//! Report rendering: table for humans, JSON/CSV for machines, plus the
//! size/age helpers shared by the `scan` and `delete` commands.

use std::io;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

use hubcache_core::{CacheReport, CachedRepo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

/// One `scan` output row per repo.
#[derive(Debug, Serialize)]
struct RepoRow {
    repo_id: String,
    repo_type: String,
    size_on_disk: u64,
    nb_files: usize,
    last_accessed: u64,
    last_modified: u64,
    refs: String,
    path: String,
}

impl RepoRow {
    fn new(repo: &CachedRepo) -> Self {
        Self {
            repo_id: repo.repo_id.clone(),
            repo_type: repo.repo_type.to_string(),
            size_on_disk: repo.size_on_disk,
            nb_files: repo.nb_files,
            last_accessed: unix_secs(repo.last_accessed),
            last_modified: unix_secs(repo.last_modified),
            refs: repo.refs.keys().cloned().collect::<Vec<_>>().join(", "),
            path: repo.repo_path.display().to_string(),
        }
    }
}

/// One `scan --revisions` output row per cached revision.
#[derive(Debug, Serialize)]
struct RevisionRow {
    repo_id: String,
    revision: String,
    size_on_disk: u64,
    nb_files: usize,
    last_modified: u64,
    refs: String,
    path: String,
}

impl RevisionRow {
    fn rows(repo: &CachedRepo) -> Vec<Self> {
        repo.revisions
            .iter()
            .map(|rev| Self {
                repo_id: repo.repo_id.clone(),
                revision: rev.commit_hash.clone(),
                size_on_disk: rev.size_on_disk,
                nb_files: rev.nb_files,
                last_modified: unix_secs(rev.last_modified),
                refs: rev.refs.iter().cloned().collect::<Vec<_>>().join(", "),
                path: rev.snapshot_path.display().to_string(),
            })
            .collect()
    }
}

/// Render the filtered report in the requested format.
///
/// Table and CSV send scan warnings to stderr; JSON embeds them in the
/// document so piped output stays self-contained.
pub fn render(
    report: &CacheReport,
    repos: &[&CachedRepo],
    show_revisions: bool,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Table => {
            render_table(repos, show_revisions);
            print_warnings(report);
        }
        OutputFormat::Json => render_json(report, repos, show_revisions)?,
        OutputFormat::Csv => {
            render_csv(repos, show_revisions)?;
            print_warnings(report);
        }
    }
    Ok(())
}

fn render_table(repos: &[&CachedRepo], show_revisions: bool) {
    let (header, rows): (Vec<&str>, Vec<Vec<String>>) = if show_revisions {
        (
            vec![
                "REPO ID", "REVISION", "SIZE", "FILES", "LAST MODIFIED", "REFS", "PATH",
            ],
            repos
                .iter()
                .flat_map(|repo| {
                    repo.revisions.iter().map(|rev| {
                        vec![
                            repo.repo_id.clone(),
                            rev.commit_hash.clone(),
                            format_size(rev.size_on_disk),
                            rev.nb_files.to_string(),
                            format_age(rev.last_modified),
                            rev.refs.iter().cloned().collect::<Vec<_>>().join(", "),
                            rev.snapshot_path.display().to_string(),
                        ]
                    })
                })
                .collect(),
        )
    } else {
        (
            vec![
                "REPO ID",
                "TYPE",
                "SIZE",
                "FILES",
                "LAST ACCESSED",
                "LAST MODIFIED",
                "REFS",
                "PATH",
            ],
            repos
                .iter()
                .map(|repo| {
                    vec![
                        repo.repo_id.clone(),
                        repo.repo_type.to_string(),
                        format_size(repo.size_on_disk),
                        repo.nb_files.to_string(),
                        format_age(repo.last_accessed),
                        format_age(repo.last_modified),
                        repo.refs.keys().cloned().collect::<Vec<_>>().join(", "),
                        repo.repo_path.display().to_string(),
                    ]
                })
                .collect(),
        )
    };

    print_aligned(&header, &rows);

    let total: u64 = repos.iter().map(|r| r.size_on_disk).sum();
    println!(
        "\nScanned {} repo(s) for a total of {}.",
        repos.len(),
        format_size(total)
    );
}

fn print_aligned(header: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let line = |cells: Vec<&str>| {
        let mut out = String::new();
        for (i, cell) in cells.iter().enumerate() {
            if i > 0 {
                out.push_str("  ");
            }
            out.push_str(&format!("{:<width$}", cell, width = widths[i]));
        }
        println!("{}", out.trim_end());
    };

    let dashes: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    line(header.to_vec());
    line(dashes.iter().map(String::as_str).collect());
    for row in rows {
        line(row.iter().map(String::as_str).collect());
    }
}

fn render_json(report: &CacheReport, repos: &[&CachedRepo], show_revisions: bool) -> Result<()> {
    let warnings: Vec<String> = report.warnings.iter().map(|w| w.to_string()).collect();
    let doc = if show_revisions {
        let rows: Vec<RevisionRow> = repos.iter().flat_map(|r| RevisionRow::rows(r)).collect();
        serde_json::json!({
            "cache_dir": report.cache_dir,
            "size_on_disk": report.size_on_disk,
            "revisions": rows,
            "warnings": warnings,
        })
    } else {
        let rows: Vec<RepoRow> = repos.iter().map(|r| RepoRow::new(r)).collect();
        serde_json::json!({
            "cache_dir": report.cache_dir,
            "size_on_disk": report.size_on_disk,
            "repos": rows,
            "warnings": warnings,
        })
    };
    serde_json::to_writer_pretty(io::stdout().lock(), &doc)?;
    println!();
    Ok(())
}

fn render_csv(repos: &[&CachedRepo], show_revisions: bool) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout().lock());
    if show_revisions {
        for repo in repos {
            for row in RevisionRow::rows(repo) {
                writer.serialize(row)?;
            }
        }
    } else {
        for repo in repos {
            writer.serialize(RepoRow::new(repo))?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn print_warnings(report: &CacheReport) {
    if report.warnings.is_empty() {
        return;
    }
    eprintln!(
        "\nEncountered {} warning(s) while scanning:",
        report.warnings.len()
    );
    for warning in &report.warnings {
        eprintln!("  - {warning}");
    }
}

fn unix_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Format bytes in human-readable form.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format a timestamp as a rough age ("3 days ago").
pub fn format_age(t: SystemTime) -> String {
    let elapsed = match SystemTime::now().duration_since(t) {
        Ok(d) => d,
        Err(_) => return "just now".to_string(),
    };
    let secs = elapsed.as_secs();
    if secs < 60 {
        "just now".to_string()
    } else if secs < 3600 {
        plural(secs / 60, "minute")
    } else if secs < 86_400 {
        plural(secs / 3600, "hour")
    } else {
        plural(secs / 86_400, "day")
    }
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{n} {unit}s ago")
    }
}

/// Parse a size with an optional binary suffix: `1234`, `500K`, `1.5M`, `2G`.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let upper = s.trim().to_ascii_uppercase();
    let trimmed = upper.strip_suffix('B').unwrap_or(&upper);
    let (digits, multiplier) = match trimmed.chars().last() {
        Some('K') => (&trimmed[..trimmed.len() - 1], 1u64 << 10),
        Some('M') => (&trimmed[..trimmed.len() - 1], 1u64 << 20),
        Some('G') => (&trimmed[..trimmed.len() - 1], 1u64 << 30),
        Some('T') => (&trimmed[..trimmed.len() - 1], 1u64 << 40),
        _ => (trimmed, 1),
    };
    let value: f64 = digits
        .trim()
        .parse()
        .map_err(|_| format!("invalid size '{s}', expected e.g. 500K, 1.5M, 2G"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("invalid size '{s}'"));
    }
    Ok((value * multiplier as f64) as u64)
}

/// Parse an age with a unit suffix: `7d`, `12h`, `30m`, `45s`.
pub fn parse_age(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let unit = s
        .chars()
        .last()
        .ok_or_else(|| "empty age".to_string())?;
    let secs_per_unit: u64 = match unit.to_ascii_lowercase() {
        'd' => 86_400,
        'h' => 3600,
        'm' => 60,
        's' => 1,
        _ => return Err(format!("invalid age '{s}', expected e.g. 7d, 12h, 30m")),
    };
    let value: f64 = s[..s.len() - unit.len_utf8()]
        .trim()
        .parse()
        .map_err(|_| format!("invalid age '{s}', expected e.g. 7d, 12h, 30m"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("invalid age '{s}'"));
    }
    Ok(Duration::from_secs_f64(value * secs_per_unit as f64))
}
