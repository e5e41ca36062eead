//! Pipeline configuration.
//!
//! Built once by the entry point: defaults, then an optional JSON file,
//! then `AIRJOIN_*` environment overrides, then command-line flags.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::etl::schema::JsonSchemaCatalog;
use crate::join::merge::{MergeConfig, MissingPositionPolicy, DEFAULT_TENANT};

pub const DEFAULT_TABLE: &str = "mobile_measurements";
pub const DEFAULT_BATCH_SIZE: usize = 8192;

pub const ENV_TENANT: &str = "AIRJOIN_TENANT";
pub const ENV_MISSING_POSITION: &str = "AIRJOIN_MISSING_POSITION";
pub const ENV_SCHEMA_DIR: &str = "AIRJOIN_SCHEMA_DIR";
pub const ENV_TABLE: &str = "AIRJOIN_TABLE";
pub const ENV_BATCH_SIZE: &str = "AIRJOIN_BATCH_SIZE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Provenance tag stamped on every output row.
    /// Default: "urbanbetter"
    pub tenant: String,

    /// Handling of measurements with no usable position.
    /// Default: null_fill
    pub missing_position: MissingPositionPolicy,

    /// Directory holding the JSON table schemas.
    /// Default: "schemas"
    pub schema_dir: PathBuf,

    /// Destination table.
    /// Default: "mobile_measurements"
    pub table: String,

    /// Table name to schema file name under `schema_dir`.
    pub schema_files: BTreeMap<String, String>,

    /// Rows per Arrow batch / Parquet row group.
    /// Default: 8192
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut schema_files = BTreeMap::new();
        schema_files.insert(
            DEFAULT_TABLE.to_string(),
            format!("{DEFAULT_TABLE}.json"),
        );
        Self {
            tenant: DEFAULT_TENANT.to_string(),
            missing_position: MissingPositionPolicy::default(),
            schema_dir: PathBuf::from("schemas"),
            table: DEFAULT_TABLE.to_string(),
            schema_files,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl PipelineConfig {
    /// Reads a JSON config file. Missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config = serde_json::from_slice(&data)
            .with_context(|| format!("parse config {}", path.display()))?;
        Ok(config)
    }

    /// Overlays `AIRJOIN_*` values returned by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(tenant) = lookup(ENV_TENANT) {
            self.tenant = tenant;
        }
        if let Some(policy) = lookup(ENV_MISSING_POSITION) {
            self.missing_position = policy
                .parse()
                .map_err(|err: String| anyhow::anyhow!("{ENV_MISSING_POSITION}: {err}"))?;
        }
        if let Some(dir) = lookup(ENV_SCHEMA_DIR) {
            self.schema_dir = PathBuf::from(dir);
        }
        if let Some(table) = lookup(ENV_TABLE) {
            self.table = table;
        }
        if let Some(size) = lookup(ENV_BATCH_SIZE) {
            self.batch_size = size
                .trim()
                .parse()
                .with_context(|| format!("{ENV_BATCH_SIZE}={size:?} is not a row count"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be > 0");
        }
        if self.tenant.trim().is_empty() {
            bail!("tenant must not be empty");
        }
        if self.table.trim().is_empty() {
            bail!("table must not be empty");
        }
        Ok(())
    }

    pub fn merge_config(&self) -> MergeConfig {
        MergeConfig {
            missing_position: self.missing_position,
            tenant: self.tenant.clone(),
        }
    }

    pub fn catalog(&self) -> JsonSchemaCatalog {
        JsonSchemaCatalog::new(self.schema_dir.clone(), self.schema_files.clone())
    }
}
