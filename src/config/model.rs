use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [settings]
/// concurrency = 4
/// max_attempts = 3
/// retry_delay = "5s"
///
/// [source]
/// host = "db.example.com"
/// user = "reader"
/// password_env = "SRC_PASSWORD"
///
/// [destination]
/// host = "127.0.0.1"
/// user = "root"
///
/// [backend]
/// extract = "mysqldump -h {src_host} {source} {table} > {artifact}"
/// prepare = "mysql -h {dst_host} -e 'CREATE DATABASE IF NOT EXISTS {dest}'"
/// load = "mysql -h {dst_host} {dest} < {artifact}"
/// verify = "mysql -h {dst_host} -N -e 'SELECT COUNT(*) FROM {dest}.{table}'"
///
/// [transfer]
/// units = ["shop:*", "crm:crm_copy:users,orders"]
/// ```
///
/// This is the unvalidated shape; [`ConfigFile`] is obtained through
/// `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub settings: SettingsSection,

    pub source: ConnectionSection,

    pub destination: ConnectionSection,

    pub backend: BackendSection,

    #[serde(default)]
    pub transfer: TransferSection,
}

/// `[settings]` section. Durations are strings like `"5s"` or `"30m"`.
#[derive(Debug, Clone, Deserialize)]
pub struct SettingsSection {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay: String,

    #[serde(default = "default_stage_timeout")]
    pub stage_timeout: String,

    #[serde(default = "default_progress_interval")]
    pub progress_interval: String,

    #[serde(default = "default_stop_grace_period")]
    pub stop_grace_period: String,

    /// Prefix applied to `source` when a unit does not name its destination.
    #[serde(default)]
    pub dest_prefix: String,

    /// Directory for per-session outcome/error journals. Disabled if unset.
    #[serde(default)]
    pub journal_dir: Option<PathBuf>,
}

fn default_concurrency() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> String {
    "5s".to_string()
}

fn default_stage_timeout() -> String {
    "30m".to_string()
}

fn default_progress_interval() -> String {
    "10s".to_string()
}

fn default_stop_grace_period() -> String {
    "10s".to_string()
}

impl Default for SettingsSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            retry_delay: default_retry_delay(),
            stage_timeout: default_stage_timeout(),
            progress_interval: default_progress_interval(),
            stop_grace_period: default_stop_grace_period(),
            dest_prefix: String::new(),
            journal_dir: None,
        }
    }
}

/// `[source]` / `[destination]` connection parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionSection {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub user: String,

    /// Literal password. Prefer `password_env`.
    #[serde(default)]
    pub password: Option<String>,

    /// Name of an environment variable holding the password.
    #[serde(default)]
    pub password_env: Option<String>,
}

fn default_port() -> u16 {
    3306
}

/// `[backend]` section: command templates for the command backend.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSection {
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Lists the tables of `{source}`, one per stdout line. Needed for `*`.
    #[serde(default)]
    pub list_tables: Option<String>,

    pub extract: String,
    pub prepare: String,
    pub load: String,
    pub verify: String,

    /// Regexes for stderr lines that are informational rather than errors.
    #[serde(default = "default_warning_patterns")]
    pub warning_patterns: Vec<String>,
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_warning_patterns() -> Vec<String> {
    vec![r"(?i)\bwarning\b".to_string()]
}

/// `[transfer]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TransferSection {
    /// Unit specifications: `source`, `source:tables` or `source:dest:tables`.
    #[serde(default)]
    pub units: Vec<String>,
}

/// Orchestration tunables, validated and converted to concrete types.
///
/// Built once per session and handed to the resolver, scheduler and
/// executors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tunables {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub stage_timeout: Duration,
    pub progress_interval: Duration,
    pub stop_grace_period: Duration,
    pub dest_prefix: String,
    pub journal_dir: Option<PathBuf>,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            retry_delay: Duration::from_secs(5),
            stage_timeout: Duration::from_secs(30 * 60),
            progress_interval: Duration::from_secs(10),
            stop_grace_period: Duration::from_secs(10),
            dest_prefix: String::new(),
            journal_dir: None,
        }
    }
}

/// Connection parameters with the password already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub tunables: Tunables,
    pub source: Connection,
    pub destination: Connection,
    pub backend: BackendSection,
    pub units: Vec<String>,
}

impl ConfigFile {
    /// Assemble a config from already-validated parts.
    pub fn new_unchecked(
        tunables: Tunables,
        source: Connection,
        destination: Connection,
        backend: BackendSection,
        units: Vec<String>,
    ) -> Self {
        Self {
            tunables,
            source,
            destination,
            backend,
            units,
        }
    }
}
