#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use dbmirror::config::Tunables;
use dbmirror::task::{Task, TaskId};

/// Builder for `Tunables` with fast, test-friendly defaults:
/// no retry delay, short timeouts and a short grace period.
pub struct TunablesBuilder {
    tunables: Tunables,
}

impl TunablesBuilder {
    pub fn new() -> Self {
        Self {
            tunables: Tunables {
                concurrency: 2,
                max_attempts: 3,
                retry_delay: Duration::ZERO,
                stage_timeout: Duration::from_secs(5),
                progress_interval: Duration::from_millis(50),
                stop_grace_period: Duration::from_millis(100),
                dest_prefix: String::new(),
                journal_dir: None,
            },
        }
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.tunables.concurrency = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.tunables.max_attempts = n;
        self
    }

    pub fn retry_delay(mut self, d: Duration) -> Self {
        self.tunables.retry_delay = d;
        self
    }

    pub fn stage_timeout(mut self, d: Duration) -> Self {
        self.tunables.stage_timeout = d;
        self
    }

    pub fn grace(mut self, d: Duration) -> Self {
        self.tunables.stop_grace_period = d;
        self
    }

    pub fn dest_prefix(mut self, prefix: &str) -> Self {
        self.tunables.dest_prefix = prefix.to_string();
        self
    }

    pub fn journal_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tunables.journal_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> Tunables {
        self.tunables
    }
}

impl Default for TunablesBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// `count` table tasks `source.t0 .. source.t{count-1}` into `source`.
pub fn table_ids(source: &str, count: usize) -> Vec<TaskId> {
    (0..count)
        .map(|i| TaskId::table(source, source, format!("t{i}")))
        .collect()
}

pub fn tasks(ids: &[TaskId], max_attempts: u32) -> Vec<Task> {
    ids.iter()
        .map(|id| Task::new(id.clone(), max_attempts))
        .collect()
}

/// `[backend]` body whose commands succeed without touching a database.
pub const ECHO_BACKEND: &str = r#"list_tables = "echo orders; echo users"
extract = "echo dump > {artifact}"
prepare = "true"
load = "cat {artifact} > /dev/null"
verify = "echo 1""#;

/// A complete config file body using [`ECHO_BACKEND`].
///
/// `settings` is spliced into `[settings]` verbatim.
pub fn config_toml(settings: &str, units: &[&str]) -> String {
    config_toml_with_backend(settings, ECHO_BACKEND, units)
}

/// Same as [`config_toml`] with a custom `[backend]` body.
pub fn config_toml_with_backend(settings: &str, backend: &str, units: &[&str]) -> String {
    let units = units
        .iter()
        .map(|u| format!("{u:?}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"[settings]
{settings}

[source]
host = "db.example.internal"
user = "reader"
password = "secret"

[destination]
host = "127.0.0.1"
user = "root"

[backend]
{backend}

[transfer]
units = [{units}]
"#
    )
}
