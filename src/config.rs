//! # Configuration Module
//!
//! Runtime settings for throttling, feature extraction, clustering and
//! sampling, plus the platform-appropriate location of the config file.
//!
//! ## Config File
//!
//! Tunesift reads an optional JSON file from the platform config directory:
//! - Linux: `~/.config/tunesift/config.json`
//! - macOS: `~/Library/Application Support/tunesift/config.json`
//! - Windows: `%APPDATA%\tunesift\config.json`
//!
//! Every field is optional; anything left out keeps its default.
//!
//! ```json
//! {
//!   "quotas": { "search": 5, "other": 10 },
//!   "window_mode": "shared",
//!   "k_range": { "min": 2, "max": 10 },
//!   "pool_size": 100
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::RecError;
use crate::features::DEFAULT_CHUNK_SIZE;
use crate::kmeans::KMeansConfig;
use crate::rate_limiter::{Quotas, RateLimiter, WindowMode};
use crate::recommend::DEFAULT_COUNT;
use crate::sampler::SamplerConfig;
use crate::selector::KRange;

/// Returns the platform-appropriate config file path, creating the
/// `tunesift` directory if needed.
///
/// # Returns
///
/// * `Ok(PathBuf)` - Path to `config.json` inside the tunesift config directory
/// * `Err(anyhow::Error)` - If the directory cannot be determined or created
///
/// # Errors
///
/// This function will return an error if:
/// - The system config directory cannot be determined
/// - The tunesift subdirectory cannot be created due to permissions
///
/// # Examples
///
/// ```no_run
/// use tunesift::config::get_config_path;
///
/// let config_path = get_config_path()?;
/// println!("Config lives at: {}", config_path.display());
/// # Ok::<(), anyhow::Error>(())
/// ```
///
/// # Design Notes
///
/// - Only the directory is created; the file itself stays optional
/// - Commands that never read configuration should not call this, so that
///   they leave the filesystem alone
pub fn get_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system config directory. Please pass --config explicitly."
        )
    })?;

    let tunesift_dir = config_dir.join("tunesift");
    fs::create_dir_all(&tunesift_dir).with_context(|| {
        format!(
            "Failed to create Tunesift config directory at {}. Please check file permissions.",
            tunesift_dir.display()
        )
    })?;

    Ok(tunesift_dir.join("config.json"))
}

/// Configuration for runtime behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub quotas: Quotas,
    pub window_mode: WindowMode,
    /// Longest a single quota wait may take, in milliseconds. Unbounded when absent.
    pub max_quota_wait_ms: Option<u64>,
    pub chunk_size: usize,
    pub k_range: KRange,
    pub kmeans: KMeansConfig,
    pub sampler: SamplerConfig,
    /// Distinct candidate tracks to sample.
    pub pool_size: usize,
    pub recommendation_count: usize,
    /// Keep the user's own tracks out of the candidate pool.
    pub exclude_known: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            quotas: Quotas::default(),
            window_mode: WindowMode::default(),
            max_quota_wait_ms: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            k_range: KRange::default(),
            kmeans: KMeansConfig::default(),
            sampler: SamplerConfig::default(),
            pool_size: 100,
            recommendation_count: DEFAULT_COUNT,
            exclude_known: true,
        }
    }
}

impl RuntimeConfig {
    /// Loads configuration.
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// tried and defaults are used when no file is there.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or parsed, or holds invalid values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = get_config_path()?;
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    log::debug!("No config at {}, using defaults", default_path.display());
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Fails when the file cannot be read or is not valid JSON.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Config file {} is not valid", path.display()))
    }

    /// # Errors
    ///
    /// [`RecError::InvalidConfig`] describing the first bad value.
    pub fn validate(&self) -> Result<(), RecError> {
        let invalid = |msg: &str| Err(RecError::InvalidConfig(msg.to_string()));

        if self.quotas.search == 0 || self.quotas.other == 0 {
            return invalid("quotas must allow at least one request per second");
        }
        if self.chunk_size == 0 {
            return invalid("chunk_size must be positive");
        }
        if self.sampler.page_size == 0 || self.sampler.query_length == 0 {
            return invalid("sampler page_size and query_length must be positive");
        }
        if self.kmeans.max_iterations == 0 {
            return invalid("kmeans.max_iterations must be positive");
        }
        if self.recommendation_count == 0 {
            return invalid("recommendation_count must be positive");
        }
        if self.pool_size == 0 {
            return invalid("pool_size must be positive");
        }
        self.k_range.validate()
    }

    #[must_use]
    pub fn max_quota_wait(&self) -> Option<Duration> {
        self.max_quota_wait_ms.map(Duration::from_millis)
    }

    /// Limiter on the system clock configured from these settings.
    #[must_use]
    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(self.quotas, self.window_mode).with_max_wait(self.max_quota_wait())
    }
}
