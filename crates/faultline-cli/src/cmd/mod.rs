pub mod close;
pub mod config;
pub mod ingest;
pub mod init;
pub mod list;
pub mod outbox;
pub mod show;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Local, Utc};
use faultline_core::config::{self as core_config, Config};
use faultline_core::db::SqliteStore;
use faultline_core::store::StoreError;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::output::CliError;

/// Resolved configuration plus the directory its relative paths hang off.
pub struct Workspace {
    pub config_path: PathBuf,
    pub root: PathBuf,
    pub config: Config,
}

impl Workspace {
    /// Locate, load and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be read, parsed or validated.
    pub fn load(explicit: Option<&Path>, cwd: &Path) -> Result<Self> {
        let config_path = core_config::resolve_config_path(explicit, cwd);
        let config = core_config::load_config(&config_path)?;
        config
            .validate()
            .with_context(|| format!("invalid configuration in {}", config_path.display()))?;
        let root = core_config::config_root(&config_path);
        debug!(config = %config_path.display(), root = %root.display(), "configuration loaded");
        Ok(Self {
            config_path,
            root,
            config,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.config.database_path(&self.root)
    }

    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_store(&self) -> Result<SqliteStore> {
        let path = self.database_path();
        SqliteStore::open(&path, self.config.store_timeout())
            .with_context(|| format!("open tracking store {}", path.display()))
    }
}

pub fn store_error(err: &StoreError) -> CliError {
    let code = err.code();
    CliError {
        message: err.to_string(),
        suggestion: code.hint().map(str::to_string),
        error_code: Some(code.code().to_string()),
    }
}

pub fn micros_to_local_datetime(us: i64) -> String {
    DateTime::<Utc>::from_timestamp_micros(us).map_or_else(
        || us.to_string(),
        |ts| ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}
