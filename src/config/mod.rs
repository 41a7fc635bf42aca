use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::driver::SnapshotNaming;

pub const ENV_PREFIX: &str = "ZFSDRIVER";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub driver: DriverConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Directory the driver manages; must be the mountpoint of a dataset.
    pub root: PathBuf,
    pub zfs_binary: String,
    pub filesystems_path: PathBuf,
    /// Upper bound for every `zfs` invocation; 0 disables it.
    pub command_timeout_secs: u64,
    pub snapshot_naming: SnapshotNaming,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    pub json: bool,
}

impl DriverConfig {
    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_secs > 0).then(|| Duration::from_secs(self.command_timeout_secs))
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/var/lib/docker"),
            zfs_binary: "zfs".to_string(),
            filesystems_path: PathBuf::from("/proc/filesystems"),
            command_timeout_secs: 120,
            snapshot_naming: SnapshotNaming::Derived,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: "zfsdriver=info".to_string(), json: false }
    }
}

impl Config {
    /// Load from `path` (or `zfsdriver.toml` in the working directory when
    /// present), then apply `ZFSDRIVER_*` environment overrides such as
    /// `ZFSDRIVER_DRIVER__ROOT`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_from(path, None)
    }

    fn load_from(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("zfsdriver").required(false),
        };

        let environment = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(env);

        let config = config::Config::builder().add_source(file).add_source(environment).build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
