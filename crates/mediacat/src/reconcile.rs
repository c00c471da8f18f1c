//! Cross-catalog reconciliation.
//!
//! Walks one catalog's full history and compares each event with the other
//! catalog's current state for the same file. Paths are mapped between the
//! two namespaces by caller-supplied rewrites. Nothing is written; the
//! result is a list of classified differences.

use crate::error::Result;
use futures::TryStreamExt;
use mediacat_db::{CatalogDb, EventType, FileEvent};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// How the two catalogs disagree about one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    /// The other catalog has never seen the file
    MissingInRhs,
    /// Same state, different content
    ContentMismatch,
    /// Deleted on the left, still live on the right
    ShouldBeDeletedInRhs,
    /// Live on the left, deleted on the right
    ShouldBeDeletedInLhs,
    /// Left still at its first version, right has an update
    RhsAdvanced,
    /// Left has an update, right still at its first version
    LhsAdvanced,
}

impl DiffKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingInRhs => "missing_in_rhs",
            Self::ContentMismatch => "content_mismatch",
            Self::ShouldBeDeletedInRhs => "should_be_deleted_in_rhs",
            Self::ShouldBeDeletedInLhs => "should_be_deleted_in_lhs",
            Self::RhsAdvanced => "rhs_advanced",
            Self::LhsAdvanced => "lhs_advanced",
        }
    }
}

impl fmt::Display for DiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffSide {
    pub state: EventType,
    pub fingerprint: String,
}

impl From<&FileEvent> for DiffSide {
    fn from(event: &FileEvent) -> Self {
        Self {
            state: event.event_type,
            fingerprint: event.fingerprint.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diff {
    /// Path in the left catalog's namespace
    pub path: String,
    /// The same path rewritten into the right catalog's namespace
    pub rhs_path: String,
    pub kind: DiffKind,
    pub lhs: DiffSide,
    pub rhs: Option<DiffSide>,
}

/// Compare one left-hand event with the right catalog's latest event.
pub fn classify_pair(lhs: &FileEvent, rhs: Option<&FileEvent>) -> Option<DiffKind> {
    use EventType::{Create, Delete, Update};

    let Some(rhs) = rhs else {
        return Some(DiffKind::MissingInRhs);
    };

    match (lhs.event_type, rhs.event_type) {
        (Create, Create) | (Update, Update) | (Delete, Delete) => {
            (lhs.fingerprint != rhs.fingerprint).then_some(DiffKind::ContentMismatch)
        }
        (Delete, Create | Update) => Some(DiffKind::ShouldBeDeletedInRhs),
        (Create | Update, Delete) => Some(DiffKind::ShouldBeDeletedInLhs),
        (Create, Update) => Some(DiffKind::RhsAdvanced),
        (Update, Create) => Some(DiffKind::LhsAdvanced),
    }
}

/// Diffs two catalogs with a path rewrite per direction.
pub struct CatalogReconciler<'a, FA, FB> {
    lhs: &'a CatalogDb,
    lhs_to_rhs: FA,
    rhs: &'a CatalogDb,
    rhs_to_lhs: FB,
}

impl<'a, FA, FB> CatalogReconciler<'a, FA, FB>
where
    FA: Fn(&str) -> String + Sync,
    FB: Fn(&str) -> String + Sync,
{
    pub fn new(lhs: &'a CatalogDb, lhs_to_rhs: FA, rhs: &'a CatalogDb, rhs_to_lhs: FB) -> Self {
        Self {
            lhs,
            lhs_to_rhs,
            rhs,
            rhs_to_lhs,
        }
    }

    /// Left history against right current state.
    pub async fn reconcile(&self) -> Result<Vec<Diff>> {
        diff_pass(self.lhs, &self.lhs_to_rhs, self.rhs).await
    }

    /// The mirrored pass: right history against left current state.
    ///
    /// In the returned diffs `lhs` is the right catalog.
    pub async fn reconcile_reverse(&self) -> Result<Vec<Diff>> {
        diff_pass(self.rhs, &self.rhs_to_lhs, self.lhs).await
    }
}

/// Diff every event in `lhs` against the latest state in `rhs`.
pub async fn reconcile<FA, FB>(
    lhs: &CatalogDb,
    lhs_to_rhs: FA,
    rhs: &CatalogDb,
    rhs_to_lhs: FB,
) -> Result<Vec<Diff>>
where
    FA: Fn(&str) -> String + Sync,
    FB: Fn(&str) -> String + Sync,
{
    CatalogReconciler::new(lhs, lhs_to_rhs, rhs, rhs_to_lhs)
        .reconcile()
        .await
}

async fn diff_pass(
    from: &CatalogDb,
    normalize: &(dyn Fn(&str) -> String + Sync),
    to: &CatalogDb,
) -> Result<Vec<Diff>> {
    let mut diffs = Vec::new();
    let mut compared = 0u64;
    let mut history = from.all_events();

    while let Some(event) = history.try_next().await? {
        compared += 1;
        let rhs_path = normalize(&event.file_path);
        let latest = to.latest_event(&rhs_path).await?;

        if let Some(kind) = classify_pair(&event, latest.as_ref()) {
            debug!(path = %event.file_path, kind = %kind, "Catalog difference");
            diffs.push(Diff {
                lhs: DiffSide::from(&event),
                rhs: latest.as_ref().map(DiffSide::from),
                path: event.file_path,
                rhs_path,
                kind,
            });
        }
    }

    info!(
        lhs = %from.path().display(),
        rhs = %to.path().display(),
        events = compared,
        diffs = diffs.len(),
        "Reconciliation complete"
    );
    Ok(diffs)
}
