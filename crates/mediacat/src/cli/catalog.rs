//! `mediacat catalog`: build or update a catalog from a directory tree

use super::output::{format_size, print_json, print_table};
use anyhow::{Context, Result};
use mediacat::{build_catalog, BuildReport, CatalogConfig};
use mediacat_db::CatalogDb;
use std::path::PathBuf;

/// Walk errors listed after the summary
const MAX_ERRORS_SHOWN: usize = 10;

#[derive(Debug)]
pub struct CatalogArgs {
    pub root: PathBuf,
    pub db: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub location: Option<String>,
    pub no_deletions: bool,
    pub batch_size: Option<usize>,
    pub json: bool,
}

pub fn run(args: CatalogArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => CatalogConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => CatalogConfig::default(),
    };
    if let Some(location) = args.location {
        config.storage_location = location;
    }
    if let Some(batch_size) = args.batch_size {
        config.pipeline.batch_size = batch_size;
    }
    if args.no_deletions {
        config.scan.detect_deletions = false;
    }

    let db_path = args
        .db
        .or_else(|| config.database_path.clone())
        .context("No catalog file given: pass --db or set database_path in the config")?;

    let rt = super::runtime()?;
    let report = rt.block_on(async {
        let db = CatalogDb::open_with(&db_path, &config.database.db_options())
            .await
            .with_context(|| format!("Failed to open catalog {}", db_path.display()))?;
        let report = build_catalog(&args.root, &db, &config)
            .await
            .with_context(|| format!("Failed to catalog {}", args.root.display()))?;
        db.close().await;
        anyhow::Ok(report)
    })?;

    if args.json {
        return print_json(&report);
    }
    print_summary(&report);
    Ok(())
}

fn print_summary(report: &BuildReport) {
    let scan = &report.scan.stats;
    let queue = &report.queue;

    let mut rows = vec![
        vec!["Files seen".to_string(), scan.files_seen.to_string()],
        vec!["Bytes read".to_string(), format_size(scan.bytes_scanned)],
        vec!["Created".to_string(), scan.files_created.to_string()],
        vec!["Updated".to_string(), scan.files_updated.to_string()],
        vec!["Unchanged".to_string(), scan.files_unchanged.to_string()],
    ];
    match &report.deletions {
        Some(deletions) => rows.push(vec![
            "Deleted".to_string(),
            deletions.deletes_queued.to_string(),
        ]),
        None => rows.push(vec!["Deleted".to_string(), "(not checked)".to_string()]),
    }
    rows.extend([
        vec![
            "Unreadable files".to_string(),
            scan.fingerprint_failures.to_string(),
        ],
        vec!["Walk errors".to_string(), scan.walk_errors.to_string()],
        vec!["Events written".to_string(), report.events_written().to_string()],
        vec!["Batches".to_string(), queue.batches.to_string()],
        vec![
            "Mean batch size".to_string(),
            format!("{:.1}", queue.mean_batch_size()),
        ],
        vec![
            "Mean queue delay".to_string(),
            format!("{:.2} ms", queue.queue_delay.mean_ms),
        ],
        vec![
            "Mean batch time".to_string(),
            format!("{:.2} ms", queue.batch_time.mean_ms),
        ],
        vec!["Duration".to_string(), format!("{} ms", scan.duration_ms)],
    ]);

    print_table(&["Metric", "Value"], rows);

    let errors = &report.scan.errors;
    if !errors.is_empty() {
        eprintln!("Walk errors:");
        for err in errors.iter().take(MAX_ERRORS_SHOWN) {
            eprintln!("  {}: {}", err.path, err.message);
        }
        if errors.len() > MAX_ERRORS_SHOWN {
            eprintln!("  ... and {} more", errors.len() - MAX_ERRORS_SHOWN);
        }
    }
}
