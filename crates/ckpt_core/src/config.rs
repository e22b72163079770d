//! Configuration for the checkpoint service.

use crate::error::{CkptError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file inside the data root.
pub const CONFIG_FILE: &str = "config.toml";

/// Upper bound for `limits.operation_timeout_secs` (one week).
pub const MAX_OPERATION_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Upper bound for `limits.lock_timeout_ms` (one hour).
pub const MAX_LOCK_TIMEOUT_MS: u64 = 60 * 60 * 1000;

/// Comprehensive configuration for a checkpoint data root.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Storage-related configuration.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Commit authorship.
    #[serde(default)]
    pub commit: CommitConfig,

    /// Locking and deadline limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Context digest bounds.
    #[serde(default)]
    pub digest: DigestConfig,

    /// Garbage collection configuration.
    #[serde(default)]
    pub gc: GcConfig,
}

impl Config {
    /// Creates a default configuration rooted at `data_root`.
    pub fn with_root(data_root: impl AsRef<Path>) -> Self {
        let mut config = Self::default();
        config.storage.data_root = data_root.as_ref().to_path_buf();
        config
    }

    /// Load configuration from `<data_root>/config.toml`.
    ///
    /// A missing file yields the defaults. The data root always reflects the
    /// directory the file was loaded from, whatever the file says.
    pub fn load(data_root: &Path) -> Result<Self> {
        let path = data_root.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| CkptError::ConfigError(format!("failed to read config: {}", e)))?;
            toml::from_str::<Config>(&content)
                .map_err(|e| CkptError::ConfigError(format!("failed to parse config: {}", e)))?
        } else {
            Config::default()
        };
        config.storage.data_root = data_root.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `<data_root>/config.toml`.
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.storage.data_root)?;
        let path = self.storage.data_root.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self)
            .map_err(|e| CkptError::ConfigError(format!("failed to serialize config: {}", e)))?;
        fs::write(&path, content)
            .map_err(|e| CkptError::ConfigError(format!("failed to write config: {}", e)))?;
        Ok(())
    }

    /// Rejects values the service cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if !(1..=22).contains(&self.storage.compression_level) {
            return Err(CkptError::ConfigError(format!(
                "storage.compression_level must be 1-22, got {}",
                self.storage.compression_level
            )));
        }
        if self.commit.author_name.trim().is_empty() {
            return Err(CkptError::ConfigError("commit.author_name is empty".into()));
        }
        if !(1..=MAX_OPERATION_TIMEOUT_SECS).contains(&self.limits.operation_timeout_secs) {
            return Err(CkptError::ConfigError(format!(
                "limits.operation_timeout_secs must be 1-{}, got {}",
                MAX_OPERATION_TIMEOUT_SECS, self.limits.operation_timeout_secs
            )));
        }
        if self.limits.lock_timeout_ms > MAX_LOCK_TIMEOUT_MS {
            return Err(CkptError::ConfigError(format!(
                "limits.lock_timeout_ms must be at most {}, got {}",
                MAX_LOCK_TIMEOUT_MS, self.limits.lock_timeout_ms
            )));
        }
        if self.digest.max_key_decisions == 0 || self.digest.excerpt_chars == 0 {
            return Err(CkptError::ConfigError(
                "digest bounds must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Directory holding per-repository directories.
    pub fn repos_dir(&self) -> PathBuf {
        self.storage.data_root.join("repos")
    }

    /// Directory holding checkpoint records and snapshots.
    pub fn checkpoints_dir(&self) -> PathBuf {
        self.storage.data_root.join("checkpoints")
    }
}

/// Storage-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for repositories and checkpoints.
    #[serde(skip)]
    pub data_root: PathBuf,

    /// Compression level for zstd (1-22, default: 3).
    pub compression_level: i32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from(".ckpt-data"),
            compression_level: 3,
        }
    }
}

/// Identity recorded on every commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    /// Author name (default: "ckpt").
    pub author_name: String,

    /// Author email (default: "ckpt@localhost").
    pub author_email: String,
}

impl CommitConfig {
    /// Formats the author as `Name <email>`.
    pub fn author(&self) -> String {
        format!("{} <{}>", self.author_name, self.author_email)
    }
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            author_name: "ckpt".to_string(),
            author_email: "ckpt@localhost".to_string(),
        }
    }
}

/// Locking and deadline limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// How long to wait for the repository lock (default: 10s).
    pub lock_timeout_ms: u64,

    /// Overall bound for a single operation (default: 300s).
    pub operation_timeout_secs: u64,
}

impl LimitsConfig {
    /// Returns the lock timeout as a Duration.
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Returns the operation timeout as a Duration.
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 10_000,
            operation_timeout_secs: 300,
        }
    }
}

/// Bounds for transcript digests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    /// Most recent key decisions kept (default: 10).
    pub max_key_decisions: usize,

    /// Characters kept per decision excerpt before the ellipsis (default: 200).
    pub excerpt_chars: usize,

    /// Leading user messages inspected for project attributes (default: 5).
    pub profile_messages: usize,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            max_key_decisions: 10,
            excerpt_chars: 200,
            profile_messages: 5,
        }
    }
}

/// Garbage collection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// Grace period in hours before leftovers are reaped (default: 24).
    pub grace_period_hours: u64,
}

impl GcConfig {
    /// Returns the grace period as a Duration.
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_hours.saturating_mul(60 * 60))
    }
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            grace_period_hours: 24,
        }
    }
}
