//! Configuration for catalog builds and reconciliation

use crate::error::{CatalogError, Result};
use crate::fingerprint::FingerprintAlgorithm;
use crate::queue::QueueConfig;
use mediacat_db::CatalogDbOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for a catalog build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Catalog file; the CLI `--db` flag takes precedence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    /// Tag stamped on every event this pipeline produces
    #[serde(default = "default_storage_location")]
    pub storage_location: String,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub scan: ScanSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    /// Log queue progress this often while a build runs (disabled when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats_report_interval_secs: Option<u64>,

    /// How this catalog's paths map onto a peer catalog's
    #[serde(default)]
    pub reconcile: ReconcileSettings,
}

/// Write pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Longest a producer waits for buffer space, and a flush for completion
    #[serde(default = "default_queue_timeout_ms")]
    pub queue_timeout_ms: u64,

    #[serde(default = "default_periodic_flush_interval_ms")]
    pub periodic_flush_interval_ms: u64,
}

/// Directory walk settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Walker threads (0 = one per core)
    #[serde(default)]
    pub threads: usize,

    #[serde(default)]
    pub follow_symlinks: bool,

    /// Emit tombstones for catalog paths missing from disk
    #[serde(default = "default_true")]
    pub detect_deletions: bool,

    #[serde(default)]
    pub fingerprint: FingerprintAlgorithm,
}

/// Path rewrites used when this catalog is reconciled against another
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSettings {
    /// Applied to this catalog's paths before lookup in the peer
    #[serde(default)]
    pub lhs_to_rhs: PathRewrite,

    /// Applied to the peer's paths in the reverse pass
    #[serde(default)]
    pub rhs_to_lhs: PathRewrite,
}

/// Catalog connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_storage_location() -> String {
    "local".to_string()
}

fn default_batch_size() -> usize {
    200
}

fn default_queue_timeout_ms() -> u64 {
    10_000
}

fn default_periodic_flush_interval_ms() -> u64 {
    25
}

fn default_true() -> bool {
    true
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout_ms() -> u64 {
    10_000
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            storage_location: default_storage_location(),
            pipeline: PipelineConfig::default(),
            scan: ScanSettings::default(),
            database: DatabaseSettings::default(),
            stats_report_interval_secs: None,
            reconcile: ReconcileSettings::default(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            queue_timeout_ms: default_queue_timeout_ms(),
            periodic_flush_interval_ms: default_periodic_flush_interval_ms(),
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            threads: 0,
            follow_symlinks: false,
            detect_deletions: true,
            fingerprint: FingerprintAlgorithm::default(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl CatalogConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CatalogConfig =
            toml::from_str(&content).map_err(|e| CatalogError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| CatalogError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.batch_size == 0 {
            return Err(CatalogError::Config("pipeline.batch_size must be at least 1".into()));
        }
        if self.pipeline.queue_timeout_ms == 0 {
            return Err(CatalogError::Config(
                "pipeline.queue_timeout_ms must be positive".into(),
            ));
        }
        if self.pipeline.periodic_flush_interval_ms == 0 {
            return Err(CatalogError::Config(
                "pipeline.periodic_flush_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn stats_report_interval(&self) -> Option<Duration> {
        self.stats_report_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

impl PipelineConfig {
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            batch_size: self.batch_size,
            queue_timeout: Duration::from_millis(self.queue_timeout_ms),
            flush_interval: Duration::from_millis(self.periodic_flush_interval_ms),
        }
    }
}

impl DatabaseSettings {
    pub fn db_options(&self) -> CatalogDbOptions {
        CatalogDbOptions {
            max_connections: self.max_connections,
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }
}

/// Rewrites a catalog path into another catalog's namespace.
///
/// Applied in order: replace `source_separator` with `/`, strip
/// `strip_prefix`, prepend `add_prefix`, then replace `/` with `separator`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRewrite {
    /// Separator used by the paths being rewritten, when not `/`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_separator: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip_prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
}

impl PathRewrite {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn apply(&self, path: &str) -> String {
        let normalized = match self.source_separator.as_deref().filter(|s| !s.is_empty()) {
            Some(sep) if sep != "/" => path.replace(sep, "/"),
            _ => path.to_string(),
        };

        let mut rest = normalized.as_str();
        if let Some(prefix) = self.strip_prefix.as_deref().filter(|p| !p.is_empty()) {
            if let Some(stripped) = rest.strip_prefix(prefix) {
                rest = stripped.trim_start_matches('/');
            }
        }

        let mut out = match self.add_prefix.as_deref().filter(|p| !p.is_empty()) {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), rest),
            None => rest.to_string(),
        };

        if let Some(sep) = self.separator.as_deref().filter(|s| !s.is_empty()) {
            out = out.replace('/', sep);
        }
        out
    }

    /// Turn the rule into a path mapper for [`crate::reconcile`].
    pub fn into_mapper(self) -> impl Fn(&str) -> String + Send + Sync + 'static {
        move |path: &str| self.apply(path)
    }
}
