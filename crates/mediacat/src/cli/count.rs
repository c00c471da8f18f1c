//! `mediacat count`: event and path totals

use super::output::{print_json, print_table};
use anyhow::{Context, Result};
use futures::TryStreamExt;
use mediacat_db::CatalogDb;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug)]
pub struct CountArgs {
    pub db: PathBuf,
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct Counts {
    events: i64,
    paths: i64,
    live_paths: u64,
}

pub fn run(args: CountArgs) -> Result<()> {
    let rt = super::runtime()?;
    let counts = rt.block_on(async {
        let db = CatalogDb::open_existing(&args.db)
            .await
            .with_context(|| format!("Failed to open catalog {}", args.db.display()))?;
        let events = db.event_count().await?;
        let paths = db.path_count().await?;
        let live_paths = db
            .live_paths()
            .try_fold(0u64, |n, _| async move { Ok(n + 1) })
            .await?;
        db.close().await;
        anyhow::Ok(Counts {
            events,
            paths,
            live_paths,
        })
    })?;

    if args.json {
        return print_json(&counts);
    }
    print_table(
        &["Events", "Paths", "Live paths"],
        vec![vec![
            counts.events.to_string(),
            counts.paths.to_string(),
            counts.live_paths.to_string(),
        ]],
    );
    Ok(())
}
