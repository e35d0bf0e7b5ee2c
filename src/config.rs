//! Application configuration management.
//!
//! Settings are layered, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. A TOML file (the platform config directory by default)
//! 3. `DUPESTORE_*` environment variables, e.g. `DUPESTORE_HASH_THREADS=8`

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::actions::{Disposal, ExecuteConfig, DEFAULT_BATCH_SIZE};
use crate::scanner::{ScannerConfig, DEFAULT_BUFFER_SIZE};
use crate::store::{IndexStore, StoreResult};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "DUPESTORE_";

const DATABASE_FILE: &str = "dupestore.sqlite";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Location of the index database.
    pub database: PathBuf,
    /// Files removed per index transaction during execution.
    pub batch_size: usize,
    /// Files written per index transaction during a scan.
    pub scan_batch_size: usize,
    /// Worker threads used for hashing.
    pub hash_threads: usize,
    /// Read buffer used for hashing, in bytes.
    pub buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database_path(),
            batch_size: DEFAULT_BATCH_SIZE,
            scan_batch_size: 256,
            hash_threads: 4,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl Config {
    /// The layered provider chain. `file` replaces the default config path.
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = file.map(Path::to_path_buf).or_else(default_config_path) {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load and validate the configuration.
    ///
    /// # Errors
    ///
    /// Fails on malformed TOML, mistyped values or zero sizes.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(file)
            .extract()
            .context("Failed to load configuration")?;
        config.validate()?;
        log::debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Reject settings that would stall the pipeline.
    ///
    /// # Errors
    ///
    /// Names the first zero-valued setting.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.batch_size > 0, "batch_size must be at least 1");
        ensure!(self.scan_batch_size > 0, "scan_batch_size must be at least 1");
        ensure!(self.hash_threads > 0, "hash_threads must be at least 1");
        ensure!(self.buffer_size > 0, "buffer_size must be at least 1");
        Ok(())
    }

    /// Write the configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Fails if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Scanner settings derived from this configuration.
    #[must_use]
    pub fn scanner_config(&self) -> ScannerConfig {
        ScannerConfig::default()
            .with_hash_threads(self.hash_threads)
            .with_batch_size(self.scan_batch_size)
            .with_buffer_size(self.buffer_size)
    }

    /// Executor settings derived from this configuration.
    #[must_use]
    pub fn execute_config(&self, disposal: Disposal) -> ExecuteConfig {
        let base = match disposal {
            Disposal::MoveTo(dest) => ExecuteConfig::move_to(dest),
            Disposal::Delete => ExecuteConfig::delete(),
        };
        base.with_batch_size(self.batch_size)
    }

    /// Open the configured database, creating its directory if needed.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the database cannot be opened.
    pub fn open_store(&self) -> StoreResult<IndexStore> {
        if let Some(parent) = self.database.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = fs::create_dir_all(parent) {
                    log::warn!("Failed to create {}: {}", parent.display(), e);
                }
            }
        }
        IndexStore::open(&self.database)
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "dupestore", "dupestore")
}

/// Platform config file location (`config.toml` in the config directory).
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Platform data directory database, or `dupestore.sqlite` in the working
/// directory when no home directory is known.
#[must_use]
pub fn default_database_path() -> PathBuf {
    project_dirs().map_or_else(
        || PathBuf::from(DATABASE_FILE),
        |dirs| dirs.data_dir().join(DATABASE_FILE),
    )
}
