//! Engine configuration
//!
//! Policies for review acceptance, deadlines, metrics, field trials and
//! storage. Loaded from an optional TOML file layered with `AGROVALIDATE__*`
//! environment overrides:
//!
//! ```toml
//! [review]
//! min_comment_length = 20
//! max_review_hours = 168.0
//!
//! [deadlines]
//! low_hours = 168
//! normal_hours = 72
//! high_hours = 24
//! critical_hours = 8
//!
//! [metrics]
//! default_window_days = 30
//! success_threshold = 0.7
//!
//! [field_tests]
//! max_duration_days = 730
//!
//! [storage]
//! pool_size = 8
//! ```

use crate::error::{AgroError, Result};
use crate::types::Priority;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Prefix for environment overrides, e.g. `AGROVALIDATE__REVIEW__MIN_COMMENT_LENGTH`
const ENV_PREFIX: &str = "AGROVALIDATE";

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub review: ReviewPolicy,

    #[serde(default)]
    pub deadlines: DeadlinePolicy,

    #[serde(default)]
    pub metrics: MetricsPolicy,

    #[serde(default)]
    pub field_tests: FieldTestPolicy,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Acceptance rules for submitted reviews
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewPolicy {
    /// Minimum trimmed length of review comments
    #[serde(default = "default_min_comment_length")]
    pub min_comment_length: usize,

    /// Upper bound on declared review time
    #[serde(default = "default_max_review_hours")]
    pub max_review_hours: f64,
}

impl Default for ReviewPolicy {
    fn default() -> Self {
        Self {
            min_comment_length: default_min_comment_length(),
            max_review_hours: default_max_review_hours(),
        }
    }
}

/// Review window per priority tier, in hours
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadlinePolicy {
    #[serde(default = "default_low_hours")]
    pub low_hours: i64,
    #[serde(default = "default_normal_hours")]
    pub normal_hours: i64,
    #[serde(default = "default_high_hours")]
    pub high_hours: i64,
    #[serde(default = "default_critical_hours")]
    pub critical_hours: i64,
}

impl Default for DeadlinePolicy {
    fn default() -> Self {
        Self {
            low_hours: default_low_hours(),
            normal_hours: default_normal_hours(),
            high_hours: default_high_hours(),
            critical_hours: default_critical_hours(),
        }
    }
}

/// Longest review window a priority tier may be configured with (ten years)
pub const MAX_DEADLINE_HOURS: i64 = 24 * 365 * 10;

/// Longest field trial that may be configured (ten years)
pub const MAX_TRIAL_DAYS: u32 = 365 * 10;

impl DeadlinePolicy {
    /// Offset from creation time to deadline for a priority tier
    pub fn offset(&self, priority: Priority) -> Result<Duration> {
        let (name, hours) = match priority {
            Priority::Low => ("low_hours", self.low_hours),
            Priority::Normal => ("normal_hours", self.normal_hours),
            Priority::High => ("high_hours", self.high_hours),
            Priority::Critical => ("critical_hours", self.critical_hours),
        };
        if hours <= 0 || hours > MAX_DEADLINE_HOURS {
            return Err(AgroError::Config(format!(
                "deadlines.{}: must be between 1 and {} hours",
                name, MAX_DEADLINE_HOURS
            )));
        }
        Ok(Duration::hours(hours))
    }
}

/// Rolling metrics settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsPolicy {
    #[serde(default = "default_window_days")]
    pub default_window_days: u32,

    /// Effectiveness score above which a field test counts as a success
    #[serde(default = "default_success_threshold")]
    pub success_threshold: f64,
}

impl Default for MetricsPolicy {
    fn default() -> Self {
        Self {
            default_window_days: default_window_days(),
            success_threshold: default_success_threshold(),
        }
    }
}

/// Field trial limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldTestPolicy {
    #[serde(default = "default_max_duration_days")]
    pub max_duration_days: u32,
}

impl Default for FieldTestPolicy {
    fn default() -> Self {
        Self {
            max_duration_days: default_max_duration_days(),
        }
    }
}

/// Storage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path (None = platform data dir)
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Maximum number of pooled connections
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            pool_size: default_pool_size(),
        }
    }
}

impl StorageConfig {
    /// Resolve the database path, falling back to the platform data directory
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(default_db_path)
    }
}

fn default_min_comment_length() -> usize {
    20
}

fn default_max_review_hours() -> f64 {
    168.0
}

fn default_low_hours() -> i64 {
    Priority::Low.default_deadline().num_hours()
}

fn default_normal_hours() -> i64 {
    Priority::Normal.default_deadline().num_hours()
}

fn default_high_hours() -> i64 {
    Priority::High.default_deadline().num_hours()
}

fn default_critical_hours() -> i64 {
    Priority::Critical.default_deadline().num_hours()
}

fn default_window_days() -> u32 {
    30
}

fn default_success_threshold() -> f64 {
    0.7
}

fn default_max_duration_days() -> u32 {
    730
}

fn default_pool_size() -> usize {
    8
}

/// Default database path using the XDG data directory
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agrovalidate")
        .join("agrovalidate.db")
}

impl EngineConfig {
    /// Load configuration from an optional TOML file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: EngineConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(toml_str).map_err(|e| AgroError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let toml_str =
            toml::to_string_pretty(self).map_err(|e| AgroError::Config(e.to_string()))?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        for priority in [
            Priority::Low,
            Priority::Normal,
            Priority::High,
            Priority::Critical,
        ] {
            self.deadlines.offset(priority)?;
        }

        if self.review.min_comment_length == 0 {
            return Err(AgroError::Config(
                "review.min_comment_length: must be at least 1".to_string(),
            ));
        }

        if !(self.review.max_review_hours > 0.0) {
            return Err(AgroError::Config(
                "review.max_review_hours: must be greater than zero".to_string(),
            ));
        }

        if self.metrics.default_window_days == 0 {
            return Err(AgroError::Config(
                "metrics.default_window_days: must be at least 1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.metrics.success_threshold) {
            return Err(AgroError::Config(
                "metrics.success_threshold: must be within [0, 1]".to_string(),
            ));
        }

        if self.field_tests.max_duration_days == 0
            || self.field_tests.max_duration_days > MAX_TRIAL_DAYS
        {
            return Err(AgroError::Config(format!(
                "field_tests.max_duration_days: must be between 1 and {}",
                MAX_TRIAL_DAYS
            )));
        }

        if self.storage.pool_size == 0 {
            return Err(AgroError::Config(
                "storage.pool_size: must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
