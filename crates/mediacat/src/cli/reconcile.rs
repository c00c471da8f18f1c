//! `mediacat reconcile`: diff two catalogs

use super::output::{print_json, print_table_colored, short_fingerprint};
use anyhow::{Context, Result};
use comfy_table::Color;
use mediacat::{
    CatalogConfig, CatalogReconciler, Diff, DiffKind, DiffSide, PathRewrite, ReconcileSettings,
};
use mediacat_db::CatalogDb;
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ReconcileArgs {
    pub lhs: PathBuf,
    pub rhs: PathBuf,
    pub config: Option<PathBuf>,
    pub lhs_strip: Option<String>,
    pub lhs_prefix: Option<String>,
    pub lhs_separator: Option<String>,
    pub rhs_strip: Option<String>,
    pub rhs_prefix: Option<String>,
    pub rhs_separator: Option<String>,
    pub reverse: bool,
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct ReconcileOutput {
    diffs: Vec<Diff>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reverse: Option<Vec<Diff>>,
}

/// Rewrites from the config's `[reconcile]` tables, with flags on top.
///
/// `--lhs-separator`/`--rhs-separator` name the separator each catalog's
/// paths use, so they set the target separator of one direction and the
/// source separator of the other.
fn rewrites(args: &ReconcileArgs) -> Result<(PathRewrite, PathRewrite)> {
    let settings = match &args.config {
        Some(path) => {
            CatalogConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?
                .reconcile
        }
        None => ReconcileSettings::default(),
    };

    let mut lhs_to_rhs = settings.lhs_to_rhs;
    let mut rhs_to_lhs = settings.rhs_to_lhs;

    override_with(&mut lhs_to_rhs.strip_prefix, &args.lhs_strip);
    override_with(&mut lhs_to_rhs.add_prefix, &args.lhs_prefix);
    override_with(&mut lhs_to_rhs.source_separator, &args.lhs_separator);
    override_with(&mut lhs_to_rhs.separator, &args.rhs_separator);

    override_with(&mut rhs_to_lhs.strip_prefix, &args.rhs_strip);
    override_with(&mut rhs_to_lhs.add_prefix, &args.rhs_prefix);
    override_with(&mut rhs_to_lhs.source_separator, &args.rhs_separator);
    override_with(&mut rhs_to_lhs.separator, &args.lhs_separator);

    Ok((lhs_to_rhs, rhs_to_lhs))
}

fn override_with(field: &mut Option<String>, flag: &Option<String>) {
    if flag.is_some() {
        field.clone_from(flag);
    }
}

pub fn run(args: ReconcileArgs) -> Result<()> {
    let (lhs_to_rhs, rhs_to_lhs) = rewrites(&args)?;
    debug!(?lhs_to_rhs, ?rhs_to_lhs, "Path rewrites");

    let rt = super::runtime()?;
    let output = rt.block_on(async {
        let lhs = CatalogDb::open_existing(&args.lhs)
            .await
            .with_context(|| format!("Failed to open catalog {}", args.lhs.display()))?;
        let rhs = CatalogDb::open_existing(&args.rhs)
            .await
            .with_context(|| format!("Failed to open catalog {}", args.rhs.display()))?;

        let reconciler =
            CatalogReconciler::new(&lhs, lhs_to_rhs.into_mapper(), &rhs, rhs_to_lhs.into_mapper());
        let diffs = reconciler.reconcile().await.context("Reconciliation failed")?;
        let reverse = if args.reverse {
            Some(
                reconciler
                    .reconcile_reverse()
                    .await
                    .context("Reverse reconciliation failed")?,
            )
        } else {
            None
        };
        anyhow::Ok(ReconcileOutput { diffs, reverse })
    })?;

    if args.json {
        return print_json(&output);
    }

    print_diffs(&format!("{} vs {}", args.lhs.display(), args.rhs.display()), &output.diffs);
    if let Some(reverse) = &output.reverse {
        print_diffs(
            &format!("{} vs {}", args.rhs.display(), args.lhs.display()),
            reverse,
        );
    }
    Ok(())
}

fn print_diffs(title: &str, diffs: &[Diff]) {
    if diffs.is_empty() {
        println!("{title}: no differences");
        return;
    }
    println!("{title}: {} difference(s)", diffs.len());

    let rows = diffs
        .iter()
        .map(|diff| {
            vec![
                (diff.path.clone(), None),
                (diff.kind.to_string(), Some(kind_color(diff.kind))),
                (side(Some(&diff.lhs)), None),
                (side(diff.rhs.as_ref()), None),
            ]
        })
        .collect();
    print_table_colored(&["Path", "Kind", "Left", "Right"], rows);
}

fn side(side: Option<&DiffSide>) -> String {
    match side {
        Some(s) => format!("{} {}", s.state, short_fingerprint(&s.fingerprint)),
        None => "-".to_string(),
    }
}

fn kind_color(kind: DiffKind) -> Color {
    match kind {
        DiffKind::MissingInRhs | DiffKind::ContentMismatch => Color::Red,
        DiffKind::ShouldBeDeletedInRhs | DiffKind::ShouldBeDeletedInLhs => Color::Yellow,
        DiffKind::RhsAdvanced | DiffKind::LhsAdvanced => Color::Blue,
    }
}
