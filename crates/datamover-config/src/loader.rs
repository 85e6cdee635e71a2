//! YAML document loader with a `DATAMOVER_*` environment overlay.
//!
//! # Design
//! - The document is optional; every field can come from the environment.
//! - Overrides are applied to the raw document before validation so that
//!   errors always name the effective value.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{DatamoverConfig, RawConfig};
use crate::validate::{parse_bool, parse_u64};

/// Environment variable naming the configuration document.
pub const CONFIG_PATH_ENV: &str = "DATAMOVER_CONFIG";

const ENV_PREFIX: &str = "DATAMOVER_";

/// Load configuration from `path` (or `DATAMOVER_CONFIG`) and the process environment.
///
/// # Errors
///
/// Returns an error when the document cannot be read or parsed, when an
/// override is malformed, or when the effective configuration is invalid.
pub fn load(path: Option<&Path>) -> ConfigResult<DatamoverConfig> {
    let from_env = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
    let document = path.map(Path::to_path_buf).or(from_env);
    load_from(document.as_deref(), std::env::vars_os())
}

/// Load configuration from an optional document and an explicit set of variables.
///
/// Variables without the `DATAMOVER_` prefix or with non UTF-8 content are ignored.
///
/// # Errors
///
/// Returns an error when the document cannot be read or parsed, when an
/// override is malformed, or when the effective configuration is invalid.
pub fn load_from<I>(path: Option<&Path>, vars: I) -> ConfigResult<DatamoverConfig>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut raw = match path {
        Some(path) => read_document(path)?,
        None => RawConfig::default(),
    };
    for (key, value) in vars {
        let (Some(key), Some(value)) = (key.to_str(), value.to_str()) else {
            continue;
        };
        if let Some(name) = key.strip_prefix(ENV_PREFIX) {
            apply_override(&mut raw, name, value)?;
        }
    }
    DatamoverConfig::try_from(raw)
}

fn read_document(path: &Path) -> ConfigResult<RawConfig> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        operation: "config.read",
        path: path.to_path_buf(),
        source,
    })?;
    if contents.trim().is_empty() {
        return Ok(RawConfig::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn apply_override(raw: &mut RawConfig, name: &str, value: &str) -> ConfigResult<()> {
    match name {
        "INCOMING" => raw.incoming = Some(value.to_string()),
        "DESTINATION" => raw.destination = Some(value.to_string()),
        "MOVER" => raw.mover = value.parse()?,
        "CHECK_INTERVAL_SECS" => {
            raw.check_interval_secs = parse_u64("scan", "check_interval_secs", value)?;
        }
        "HIGHWATER_INTERVAL_SECS" => {
            raw.highwater_interval_secs = parse_u64("highwater", "highwater_interval_secs", value)?;
        }
        "HIGHWATER_RETRY_ATTEMPTS" => {
            let attempts = parse_u64("highwater", "highwater_retry.attempts", value)?;
            raw.highwater_retry.attempts = u32::try_from(attempts).map_err(|_| {
                ConfigError::invalid(
                    "highwater",
                    "highwater_retry.attempts",
                    value,
                    "attempt count is too large",
                )
            })?;
        }
        "HIGHWATER_RETRY_DELAY_MS" => {
            raw.highwater_retry.delay_ms = parse_u64("highwater", "highwater_retry.delay_ms", value)?;
        }
        "HIGHWATER_PROBE_TIMEOUT_MS" => {
            raw.highwater_retry.probe_timeout_ms =
                parse_u64("highwater", "highwater_retry.probe_timeout_ms", value)?;
        }
        "COPIER_EXECUTABLE" => raw.copier.executable = PathBuf::from(value),
        "COPIER_OVERWRITE_SUPPORTED" => {
            raw.copier.overwrite_supported =
                parse_bool("copier", "copier.overwrite_supported", value)?;
        }
        "COPIER_CHECK_TIMEOUT_MS" => {
            raw.copier.check_timeout_ms = parse_u64("copier", "copier.check_timeout_ms", value)?;
        }
        "COPIER_EXPECTED_HELP_OUTPUT" => raw.copier.expected_help_output = value.to_string(),
        "FILTER_INCLUDE_HIDDEN" => {
            raw.filter.include_hidden = parse_bool("filter", "filter.include_hidden", value)?;
        }
        "FILTER_EXCLUDE" => {
            raw.filter.exclude = value
                .split(',')
                .map(str::trim)
                .filter(|pattern| !pattern.is_empty())
                .map(str::to_string)
                .collect();
        }
        "PAUSE_ON_HIGHWATER" => {
            raw.pause_on_highwater = parse_bool("highwater", "pause_on_highwater", value)?;
        }
        "LOG_LEVEL" => raw.logging.level = value.to_string(),
        "LOG_FORMAT" => raw.logging.format = Some(value.to_string()),
        // The document path itself is consumed by `load`.
        "CONFIG" => {}
        other => debug!(variable = %format!("{ENV_PREFIX}{other}"), "ignoring unknown override"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MoverKind;
    use std::time::Duration;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(OsString, OsString)> {
        pairs
            .iter()
            .map(|(key, value)| (OsString::from(key), OsString::from(value)))
            .collect()
    }

    #[test]
    fn environment_alone_is_sufficient() -> ConfigResult<()> {
        let config = load_from(
            None,
            vars(&[
                ("DATAMOVER_INCOMING", "/in"),
                ("DATAMOVER_DESTINATION", "/out>500"),
                ("DATAMOVER_MOVER", "process"),
                ("DATAMOVER_CHECK_INTERVAL_SECS", "5"),
                ("DATAMOVER_FILTER_EXCLUDE", "*.tmp, *.part ,"),
                ("UNRELATED", "ignored"),
            ]),
        )?;
        assert_eq!(config.incoming, Path::new("/in"));
        assert_eq!(config.destination.highwater_kb(), 500);
        assert_eq!(config.mover, MoverKind::Process);
        assert_eq!(config.check_interval, Duration::from_secs(5));
        assert_eq!(config.filter.exclude, vec!["*.tmp", "*.part"]);
        Ok(())
    }

    #[test]
    fn malformed_override_is_rejected() {
        let result = load_from(
            None,
            vars(&[
                ("DATAMOVER_INCOMING", "/in"),
                ("DATAMOVER_DESTINATION", "/out"),
                ("DATAMOVER_PAUSE_ON_HIGHWATER", "sometimes"),
            ]),
        );
        assert!(matches!(
            result,
            Err(ConfigError::InvalidField {
                field: "pause_on_highwater",
                ..
            })
        ));
    }

    #[test]
    fn missing_document_is_an_io_error() {
        let result = load_from(Some(Path::new("/nonexistent/datamover.yaml")), Vec::new());
        assert!(matches!(
            result,
            Err(ConfigError::Io {
                operation: "config.read",
                ..
            })
        ));
    }
}
