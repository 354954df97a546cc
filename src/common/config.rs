//! Configuration file handling

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::paths::config_path;
use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Retry and backoff policy for automated checks
    #[serde(default)]
    pub retry: RetryConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Orchestration policy flags
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Probe adapters keyed by capability name
    #[serde(default)]
    pub probes: BTreeMap<String, ProbeConfig>,
}

/// Retry settings
#[derive(Debug, Deserialize)]
pub struct RetryConfig {
    /// Maximum automated invocations per step (first try included)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after the first failed attempt; doubles per further failure
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,

    /// Upper bound on a single backoff delay
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base(),
            backoff_cap_secs: default_backoff_cap(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base() -> u64 {
    2
}
fn default_backoff_cap() -> u64 {
    30
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize)]
pub struct Timeouts {
    /// Default bound on a single probe attempt
    #[serde(default = "default_probe")]
    pub probe_secs: u64,

    /// Bound on establishing the device connection
    #[serde(default = "default_connect")]
    pub connect_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            probe_secs: default_probe(),
            connect_secs: default_connect(),
        }
    }
}

fn default_probe() -> u64 {
    15
}
fn default_connect() -> u64 {
    10
}

/// Orchestration policy flags
#[derive(Debug, Deserialize, Default)]
pub struct OrchestratorConfig {
    /// Record fully automated steps as passed without asking when their
    /// check matched
    #[serde(default)]
    pub auto_pass_clean_checks: bool,
}

/// Adapter selection for one probe capability
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeConfig {
    /// ffprobe against the camera's RTSP stream
    Ffprobe {
        /// ffprobe executable; searched on PATH when unset
        binary: Option<PathBuf>,
        /// Override of the default probe timeout
        timeout_secs: Option<u64>,
    },
    /// HTTP GET against a URL; `{param}` placeholders are filled from step params
    Http {
        url: String,
        timeout_secs: Option<u64>,
    },
    /// Shell command; exit status carries the verdict
    Command {
        command: String,
        timeout_secs: Option<u64>,
    },
}

impl ProbeConfig {
    /// Per-capability timeout override
    pub fn timeout_secs(&self) -> Option<u64> {
        match self {
            ProbeConfig::Ffprobe { timeout_secs, .. }
            | ProbeConfig::Http { timeout_secs, .. }
            | ProbeConfig::Command { timeout_secs, .. } => *timeout_secs,
        }
    }
}

impl Config {
    /// Load configuration
    ///
    /// An explicit path must exist. Without one, the default config file is
    /// used if present, otherwise defaults apply.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path: Option<PathBuf> = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => config_path().filter(|p| p.exists()),
        };

        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(&path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let config = Self::parse(&content)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::Configuration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.backoff_cap_secs < self.retry.backoff_base_secs {
            return Err(Error::Configuration(format!(
                "retry.backoff_cap_secs ({}) is smaller than retry.backoff_base_secs ({})",
                self.retry.backoff_cap_secs, self.retry.backoff_base_secs
            )));
        }
        if self.timeouts.probe_secs == 0 {
            return Err(Error::Configuration(
                "timeouts.probe_secs must be at least 1".to_string(),
            ));
        }
        if self.timeouts.connect_secs == 0 {
            return Err(Error::Configuration(
                "timeouts.connect_secs must be at least 1".to_string(),
            ));
        }
        for (name, probe) in &self.probes {
            if probe.timeout_secs() == Some(0) {
                return Err(Error::Configuration(format!(
                    "probes.{}.timeout_secs must be at least 1",
                    name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.backoff_base_secs, 2);
        assert_eq!(config.retry.backoff_cap_secs, 30);
        assert_eq!(config.timeouts.probe_secs, 15);
        assert!(!config.orchestrator.auto_pass_clean_checks);
        assert!(config.probes.is_empty());
    }

    #[test]
    fn test_probe_sections() {
        let config = Config::parse(
            r#"
            [probes.stream]
            kind = "ffprobe"
            timeout_secs = 5

            [probes.upload]
            kind = "http"
            url = "https://storage.example/{preset}/latest.mp4"

            [probes.discovery]
            kind = "command"
            command = "./scripts/discover.sh"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.probes["stream"],
            ProbeConfig::Ffprobe {
                binary: None,
                timeout_secs: Some(5)
            }
        );
        assert!(matches!(config.probes["upload"], ProbeConfig::Http { .. }));
        assert_eq!(config.probes["discovery"].timeout_secs(), None);
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let err = Config::parse("[retry]\nmax_attempts = 0\n").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_rejects_cap_below_base() {
        let err =
            Config::parse("[retry]\nbackoff_base_secs = 10\nbackoff_cap_secs = 5\n").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_rejects_zero_connect_timeout() {
        let err = Config::parse("[timeouts]\nconnect_secs = 0\n").unwrap_err();
        assert!(matches!(err, Error::Configuration(ref m) if m.contains("connect_secs")));
    }

    #[test]
    fn test_example_config_covers_builtin_checklist() {
        let config = Config::parse(include_str!("../../config.example.toml")).unwrap();
        let checklist = crate::checklist::load(None).unwrap();
        for step in &checklist.steps {
            if let Some(check) = &step.automated_check {
                assert!(
                    config.probes.contains_key(check.capability.as_str()),
                    "example config has no [probes.{}] for '{}'",
                    check.capability,
                    step.id
                );
            }
        }
    }

    #[test]
    fn test_rejects_unknown_probe_kind() {
        let err = Config::parse("[probes.stream]\nkind = \"carrier-pigeon\"\n").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[orchestrator]\nauto_pass_clean_checks = true").unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert!(config.orchestrator.auto_pass_clean_checks);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let err = Config::load(Some(Path::new("/nonexistent/rigcheck.toml"))).unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }
}
