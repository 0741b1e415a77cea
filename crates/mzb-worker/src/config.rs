//! Worker configuration, read from the environment the node sets up.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Variable naming the FIFO the worker writes frames to.
pub const CHANNEL_ENV: &str = "MZ_PYTHON_WORKER_FIFO_NAME";
/// Optional FIFO to read responses from instead of stdin.
pub const RESPONSE_FIFO_ENV: &str = "MZB_WORKER_RESPONSE_FIFO";
/// Optional call deadline in milliseconds.
pub const CALL_TIMEOUT_ENV: &str = "MZB_WORKER_CALL_TIMEOUT_MS";

/// Where response frames are read from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    #[default]
    Stdin,
    Fifo(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Environment variable holding the channel FIFO path.
    pub channel_env: String,
    pub responses: ResponseSource,
    /// Deadline for a whole call exchange; `None` waits forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_timeout_ms: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            channel_env: CHANNEL_ENV.to_string(),
            responses: ResponseSource::Stdin,
            call_timeout_ms: None,
        }
    }
}

impl WorkerConfig {
    /// Build from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var_os(name))
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = lookup(RESPONSE_FIFO_ENV).filter(|p| !p.is_empty()) {
            config.responses = ResponseSource::Fifo(PathBuf::from(path));
        }

        if let Some(raw) = lookup(CALL_TIMEOUT_ENV) {
            let raw = raw.to_string_lossy();
            let ms = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or_else(|| {
                    BridgeError::configuration(format!(
                        "{CALL_TIMEOUT_ENV} must be a positive integer, got {raw:?}"
                    ))
                })?;
            config.call_timeout_ms = Some(ms);
        }

        Ok(config)
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = Some(timeout.as_millis().try_into().unwrap_or(u64::MAX));
        self
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    /// Channel FIFO path from the process environment.
    pub fn channel_path(&self) -> Result<PathBuf> {
        self.channel_path_with(|name| std::env::var_os(name))
    }

    pub fn channel_path_with(&self, lookup: impl Fn(&str) -> Option<OsString>) -> Result<PathBuf> {
        match lookup(&self.channel_env) {
            Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => Err(BridgeError::configuration(format!(
                "{} environment variable must be defined!",
                self.channel_env
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> {
        let vars: HashMap<String, OsString> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_match_node_wiring() {
        let config = WorkerConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, WorkerConfig::default());
        assert_eq!(config.channel_env, CHANNEL_ENV);
        assert_eq!(config.responses, ResponseSource::Stdin);
        assert_eq!(config.call_timeout(), None);
    }

    #[test]
    fn from_env_reads_process_environment() {
        let from_env = WorkerConfig::from_env().ok();
        let from_lookup = WorkerConfig::from_lookup(|name| std::env::var_os(name)).ok();
        assert_eq!(from_env, from_lookup);
    }

    #[test]
    fn missing_channel_variable_is_configuration_error() {
        let config = WorkerConfig::default();
        let err = config.channel_path_with(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, BridgeError::Configuration(_)));
        assert_eq!(
            err.to_string(),
            "configuration error: MZ_PYTHON_WORKER_FIFO_NAME environment variable must be defined!"
        );

        let empty = config
            .channel_path_with(lookup_from(&[(CHANNEL_ENV, "")]))
            .unwrap_err();
        assert!(matches!(empty, BridgeError::Configuration(_)));
    }

    #[test]
    fn channel_path_resolves() {
        let config = WorkerConfig::default();
        let path = config
            .channel_path_with(lookup_from(&[(CHANNEL_ENV, "/tmp/mzb.fifo")]))
            .unwrap();
        assert_eq!(path, PathBuf::from("/tmp/mzb.fifo"));
    }

    #[test]
    fn optional_variables() {
        let config = WorkerConfig::from_lookup(lookup_from(&[
            (RESPONSE_FIFO_ENV, "/tmp/responses.fifo"),
            (CALL_TIMEOUT_ENV, "2500"),
        ]))
        .unwrap();
        assert_eq!(
            config.responses,
            ResponseSource::Fifo(PathBuf::from("/tmp/responses.fifo"))
        );
        assert_eq!(config.call_timeout(), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn bad_timeout_is_rejected() {
        for raw in ["0", "-5", "soon"] {
            let err = WorkerConfig::from_lookup(lookup_from(&[(CALL_TIMEOUT_ENV, raw)])).unwrap_err();
            assert!(matches!(err, BridgeError::Configuration(_)), "{raw}");
        }
    }

    #[test]
    fn config_serializes() {
        let config = WorkerConfig {
            responses: ResponseSource::Fifo(PathBuf::from("/tmp/r.fifo")),
            ..WorkerConfig::default()
        }
        .with_call_timeout(Duration::from_secs(3));
        insta::assert_json_snapshot!(config, @r#"
        {
          "channel_env": "MZ_PYTHON_WORKER_FIFO_NAME",
          "responses": {
            "fifo": "/tmp/r.fifo"
          },
          "call_timeout_ms": 3000
        }
        "#);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: WorkerConfig = serde_json::from_str(r#"{"call_timeout_ms": 10}"#).unwrap();
        assert_eq!(config.channel_env, CHANNEL_ENV);
        assert_eq!(config.responses, ResponseSource::Stdin);
        assert_eq!(config.call_timeout(), Some(Duration::from_millis(10)));

        let stdin: WorkerConfig = serde_json::from_str(r#"{"responses": "stdin"}"#).unwrap();
        assert_eq!(stdin.responses, ResponseSource::Stdin);
    }
}
