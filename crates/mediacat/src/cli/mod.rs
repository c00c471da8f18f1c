//! CLI commands. Each builds its own runtime and returns `anyhow::Result`.

pub mod catalog;
pub mod count;
pub mod output;
pub mod reconcile;

use anyhow::Context;

pub(crate) fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")
}
