// src/config/validate.rs

use std::ops::RangeInclusive;

use regex::Regex;

use crate::config::duration::parse_duration;
use crate::config::model::{
    BackendSection, ConfigFile, Connection, ConnectionSection, RawConfigFile, SettingsSection,
    Tunables,
};
use crate::errors::{MirrorError, Result};

/// Accepted values for `[settings].concurrency`.
pub const CONCURRENCY_RANGE: RangeInclusive<usize> = 1..=32;

/// Accepted values for `[settings].max_attempts`.
pub const MAX_ATTEMPTS_RANGE: RangeInclusive<u32> = 1..=100;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = MirrorError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(raw, |name| std::env::var(name).ok())
    }
}

/// Validate a raw config, resolving `password_env` through `lookup_env`.
pub fn validate_config<F>(raw: RawConfigFile, lookup_env: F) -> Result<ConfigFile>
where
    F: Fn(&str) -> Option<String>,
{
    let tunables = validate_settings(&raw.settings)?;
    let source = resolve_connection("source", &raw.source, &lookup_env)?;
    let destination = resolve_connection("destination", &raw.destination, &lookup_env)?;
    validate_backend(&raw.backend)?;

    Ok(ConfigFile::new_unchecked(
        tunables,
        source,
        destination,
        raw.backend,
        raw.transfer.units,
    ))
}

fn validate_settings(settings: &SettingsSection) -> Result<Tunables> {
    validate_concurrency(settings.concurrency)?;

    if !MAX_ATTEMPTS_RANGE.contains(&settings.max_attempts) {
        return Err(MirrorError::Configuration(format!(
            "[settings].max_attempts must be in {}..={} (got {})",
            MAX_ATTEMPTS_RANGE.start(),
            MAX_ATTEMPTS_RANGE.end(),
            settings.max_attempts
        )));
    }

    let stage_timeout = duration_setting("stage_timeout", &settings.stage_timeout)?;
    if stage_timeout.is_zero() {
        return Err(MirrorError::Configuration(
            "[settings].stage_timeout must be greater than zero".to_string(),
        ));
    }

    let progress_interval = duration_setting("progress_interval", &settings.progress_interval)?;
    if progress_interval.is_zero() {
        return Err(MirrorError::Configuration(
            "[settings].progress_interval must be greater than zero".to_string(),
        ));
    }

    Ok(Tunables {
        concurrency: settings.concurrency,
        max_attempts: settings.max_attempts,
        retry_delay: duration_setting("retry_delay", &settings.retry_delay)?,
        stage_timeout,
        progress_interval,
        stop_grace_period: duration_setting("stop_grace_period", &settings.stop_grace_period)?,
        dest_prefix: settings.dest_prefix.trim().to_string(),
        journal_dir: settings.journal_dir.clone(),
    })
}

/// Check a concurrency limit against [`CONCURRENCY_RANGE`].
///
/// Also used for the `--concurrency` CLI override.
pub fn validate_concurrency(concurrency: usize) -> Result<()> {
    if !CONCURRENCY_RANGE.contains(&concurrency) {
        return Err(MirrorError::Configuration(format!(
            "concurrency must be in {}..={} (got {})",
            CONCURRENCY_RANGE.start(),
            CONCURRENCY_RANGE.end(),
            concurrency
        )));
    }
    Ok(())
}

fn duration_setting(key: &str, value: &str) -> Result<std::time::Duration> {
    parse_duration(value)
        .map_err(|e| MirrorError::Configuration(format!("[settings].{key}: {e}")))
}

fn resolve_connection<F>(
    section: &str,
    conn: &ConnectionSection,
    lookup_env: &F,
) -> Result<Connection>
where
    F: Fn(&str) -> Option<String>,
{
    if conn.host.trim().is_empty() {
        return Err(MirrorError::Configuration(format!(
            "[{section}].host must not be empty"
        )));
    }
    if conn.user.trim().is_empty() {
        return Err(MirrorError::Configuration(format!(
            "[{section}].user must not be empty"
        )));
    }

    let password = match (&conn.password, &conn.password_env) {
        (Some(_), Some(_)) => {
            return Err(MirrorError::Configuration(format!(
                "[{section}] sets both `password` and `password_env`; pick one"
            )));
        }
        (Some(literal), None) => Some(literal.clone()),
        (None, Some(var)) => Some(lookup_env(var).ok_or_else(|| {
            MirrorError::Configuration(format!(
                "[{section}].password_env names '{var}', which is not set"
            ))
        })?),
        (None, None) => None,
    };

    Ok(Connection {
        host: conn.host.trim().to_string(),
        port: conn.port,
        user: conn.user.trim().to_string(),
        password,
    })
}

fn validate_backend(backend: &BackendSection) -> Result<()> {
    let templates = [
        ("extract", Some(&backend.extract)),
        ("prepare", Some(&backend.prepare)),
        ("load", Some(&backend.load)),
        ("verify", Some(&backend.verify)),
        ("list_tables", backend.list_tables.as_ref()),
    ];

    for (key, template) in templates {
        if let Some(template) = template {
            if template.trim().is_empty() {
                return Err(MirrorError::Configuration(format!(
                    "[backend].{key} must not be empty"
                )));
            }
        }
    }

    if !backend.extract.contains("{artifact}") || !backend.load.contains("{artifact}") {
        return Err(MirrorError::Configuration(
            "[backend].extract and [backend].load must reference {artifact}".to_string(),
        ));
    }

    for pattern in &backend.warning_patterns {
        Regex::new(pattern).map_err(|e| {
            MirrorError::Configuration(format!(
                "[backend].warning_patterns: invalid regex '{pattern}': {e}"
            ))
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::TransferSection;

    fn raw() -> RawConfigFile {
        RawConfigFile {
            settings: SettingsSection::default(),
            source: ConnectionSection {
                host: "remote".into(),
                port: 3306,
                user: "reader".into(),
                password: None,
                password_env: Some("SRC_PW".into()),
            },
            destination: ConnectionSection {
                host: "localhost".into(),
                port: 3307,
                user: "root".into(),
                password: Some("secret".into()),
                password_env: None,
            },
            backend: BackendSection {
                artifact_dir: "backups".into(),
                list_tables: Some("list {source}".into()),
                extract: "dump {source} > {artifact}".into(),
                prepare: "create {dest}".into(),
                load: "restore {dest} < {artifact}".into(),
                verify: "count {dest}".into(),
                warning_patterns: vec!["(?i)warning".into()],
            },
            transfer: TransferSection {
                units: vec!["shop:*".into()],
            },
        }
    }

    fn env_with_password(name: &str) -> Option<String> {
        (name == "SRC_PW").then(|| "pw".to_string())
    }

    #[test]
    fn valid_config_resolves_passwords_and_durations() {
        let cfg = validate_config(raw(), env_with_password).unwrap();
        assert_eq!(cfg.source.password.as_deref(), Some("pw"));
        assert_eq!(cfg.destination.password.as_deref(), Some("secret"));
        assert_eq!(cfg.tunables.retry_delay, std::time::Duration::from_secs(5));
        assert_eq!(cfg.units, vec!["shop:*"]);
    }

    #[test]
    fn missing_password_env_is_a_configuration_error() {
        let err = validate_config(raw(), |_| None).unwrap_err();
        match err {
            MirrorError::Configuration(msg) => assert!(msg.contains("SRC_PW")),
            other => panic!("expected Configuration, got {other:?}"),
        }
    }

    #[test]
    fn concurrency_out_of_range_is_rejected() {
        let mut cfg = raw();
        cfg.settings.concurrency = 0;
        assert!(validate_config(cfg.clone(), env_with_password).is_err());
        cfg.settings.concurrency = 33;
        assert!(validate_config(cfg, env_with_password).is_err());
    }

    #[test]
    fn bad_duration_names_the_key() {
        let mut cfg = raw();
        cfg.settings.retry_delay = "soon".into();
        let err = validate_config(cfg, env_with_password).unwrap_err();
        assert!(err.to_string().contains("retry_delay"));
    }

    #[test]
    fn invalid_warning_regex_is_rejected() {
        let mut cfg = raw();
        cfg.backend.warning_patterns = vec!["(".into()];
        assert!(validate_config(cfg, env_with_password).is_err());
    }

    #[test]
    fn extract_without_artifact_placeholder_is_rejected() {
        let mut cfg = raw();
        cfg.backend.extract = "dump {source}".into();
        assert!(validate_config(cfg, env_with_password).is_err());
    }
}
