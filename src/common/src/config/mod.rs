use std::path::Path;
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Default configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = "legalhold.toml";

/// Prefix of environment overrides, e.g. `LEGALHOLD__JOB__INTERVAL=1h`.
pub const ENV_PREFIX: &str = "LEGALHOLD__";

/// Record store holding the channels, posts and attachments being exported.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub dsn: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("sqlite::memory:"),
        }
    }
}

/// Hold registry storage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub dsn: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("sqlite::memory:"),
        }
    }
}

/// Object store receiving the export bundles.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `file:///path`, `memory://` or `s3://[key:secret@]host[:port]/bucket`
    pub dsn: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("file:///.data/bundles"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobConfig {
    /// Run the periodic export job.
    ///
    /// Env: LEGALHOLD__JOB__ENABLED
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Time between runs when no `time_of_day` is set.
    ///
    /// Env: LEGALHOLD__JOB__INTERVAL
    #[serde(with = "humantime_serde", default = "default_interval")]
    pub interval: Duration,

    /// Daily run time as "HH:MM" in UTC. Takes precedence over `interval`.
    ///
    /// Env: LEGALHOLD__JOB__TIME_OF_DAY
    #[serde(default)]
    pub time_of_day: Option<String>,

    /// How long shutdown waits for an active run to observe cancellation.
    ///
    /// Env: LEGALHOLD__JOB__STOP_TIMEOUT
    #[serde(with = "humantime_serde", default = "default_stop_timeout")]
    pub stop_timeout: Duration,
}

fn default_enabled() -> bool {
    true
}

fn default_interval() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval: default_interval(),
            time_of_day: None,
            stop_timeout: default_stop_timeout(),
        }
    }
}

impl JobConfig {
    /// Parsed `time_of_day`, if one is configured.
    pub fn parsed_time_of_day(&self) -> Result<Option<NaiveTime>, ConfigError> {
        match &self.time_of_day {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M")
                .map(Some)
                .map_err(|_| ConfigError::InvalidTimeOfDay(raw.clone())),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Maximum number of posts fetched and written per CSV batch.
    ///
    /// Env: LEGALHOLD__EXPORT__BATCH_SIZE
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between consecutive slices of the same hold.
    ///
    /// Env: LEGALHOLD__EXPORT__SLICE_PAUSE
    #[serde(with = "humantime_serde", default = "default_slice_pause")]
    pub slice_pause: Duration,
}

fn default_batch_size() -> usize {
    10_000
}

fn default_slice_pause() -> Duration {
    Duration::from_millis(250)
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            slice_pause: default_slice_pause(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub job: JobConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

impl Configuration {
    /// Load defaults, then `legalhold.toml`, then `LEGALHOLD__*` variables.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::figment(Toml::file(CONFIG_FILE))
            .extract()
            .map_err(Box::new)
    }

    /// Like [`Configuration::load`] but reads the given file instead of
    /// `legalhold.toml`.
    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        Self::figment(Toml::file(path)).extract().map_err(Box::new)
    }

    fn figment(file: figment::providers::Data<Toml>) -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
            .merge(file)
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.dsn.is_empty() {
            return Err(ConfigError::EmptyDsn("database"));
        }
        if self.registry.dsn.is_empty() {
            return Err(ConfigError::EmptyDsn("registry"));
        }
        if self.storage.dsn.is_empty() {
            return Err(ConfigError::EmptyDsn("storage"));
        }
        if self.export.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.job.interval.is_zero() {
            return Err(ConfigError::InvalidInterval(self.job.interval));
        }
        self.job.parsed_time_of_day()?;
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} DSN must not be empty")]
    EmptyDsn(&'static str),

    #[error("export batch size must be greater than zero")]
    ZeroBatchSize,

    #[error("job interval must be positive, got {0:?}")]
    InvalidInterval(Duration),

    #[error("invalid job time of day '{0}', expected HH:MM")]
    InvalidTimeOfDay(String),
}
