//! Orchestration policy and its on-disk configuration.
//!
//! The policy is read from JSON. Fields are snake_case, and the camelCase
//! spellings are accepted as aliases. Discovery order:
//!
//! 1. `CHORUS_CONFIG` environment variable (path to a JSON file).
//! 2. `~/.chorus/config.json`
//! 3. Built-in defaults.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bridge::RuntimeStrategy;
use crate::error::{ProviderError, Result};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "CHORUS_CONFIG";

fn default_shuffle() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_delay_ms() -> u64 {
    30_000
}

/// How the orchestrator selects and sequences providers for a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Randomize candidate order on every call (default: true).
    #[serde(default = "default_shuffle")]
    pub shuffle: bool,

    /// Attempts against the pinned provider in single-provider mode (default: 3).
    #[serde(default = "default_max_retries", alias = "maxRetries")]
    pub max_retries: u32,

    /// Pin one provider and retry it instead of walking the pool.
    #[serde(default, alias = "singleProviderRetry")]
    pub single_provider_retry: bool,

    /// Providers never selected.
    #[serde(default, alias = "ignoredProviders")]
    pub ignored_providers: BTreeSet<String>,

    /// Per-invocation timeout, overridable per call.
    #[serde(default, alias = "timeoutSecs")]
    pub timeout_secs: Option<u64>,

    /// Forward swallowed failures as in-band error markers.
    #[serde(default, alias = "emitErrorChunks")]
    pub emit_error_chunks: bool,

    /// Fixed shuffle seed, for reproducible ordering.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Delay between single-provider retry attempts.
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// How blocking calls find a runtime.
    #[serde(default)]
    pub runtime: RuntimeMode,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            shuffle: default_shuffle(),
            max_retries: default_max_retries(),
            single_provider_retry: false,
            ignored_providers: BTreeSet::new(),
            timeout_secs: None,
            emit_error_chunks: false,
            seed: None,
            backoff: BackoffConfig::default(),
            runtime: RuntimeMode::default(),
        }
    }
}

impl RetryPolicy {
    /// Policy-level timeout as a [`Duration`].
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Attempts in single-provider mode. Zero is treated as one.
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Reject settings that cannot be honored.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.backoff.jitter_fraction) {
            return Err(ProviderError::Config(format!(
                "backoff.jitter_fraction must be within 0..=1, got {}",
                self.backoff.jitter_fraction
            )));
        }
        if self.backoff.max_delay_ms < self.backoff.base_delay_ms {
            return Err(ProviderError::Config(format!(
                "backoff.max_delay_ms ({}) is below backoff.base_delay_ms ({})",
                self.backoff.max_delay_ms, self.backoff.base_delay_ms
            )));
        }
        Ok(())
    }

    /// Parse and validate a policy from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let policy: Self = serde_json::from_str(json)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Load from an explicit file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ProviderError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    /// Load using the discovery chain, falling back to defaults.
    ///
    /// An explicit `path` wins over discovery.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let discovered = match path {
            Some(p) => Some(p.to_path_buf()),
            None => discover_config_path(),
        };
        match discovered {
            Some(p) => {
                debug!(path = %p.display(), "loading orchestration policy");
                Self::from_file(&p)
            }
            None => {
                debug!("no config file found, using default policy");
                Ok(Self::default())
            }
        }
    }
}

/// Exponential backoff settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// First retry delay (default: 0, i.e. immediate).
    #[serde(default, alias = "baseDelayMs")]
    pub base_delay_ms: u64,

    /// Upper bound on any single delay (default: 30s).
    #[serde(default = "default_max_delay_ms", alias = "maxDelayMs")]
    pub max_delay_ms: u64,

    /// Random `0..jitter_fraction` of the delay is added (default: 0).
    #[serde(default, alias = "jitterFraction")]
    pub jitter_fraction: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 0,
            max_delay_ms: default_max_delay_ms(),
            jitter_fraction: 0.0,
        }
    }
}

/// Serializable form of [`RuntimeStrategy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    #[default]
    Auto,
    FailIfNested,
}

impl From<RuntimeMode> for RuntimeStrategy {
    fn from(mode: RuntimeMode) -> Self {
        match mode {
            RuntimeMode::Auto => RuntimeStrategy::Auto,
            RuntimeMode::FailIfNested => RuntimeStrategy::FailIfNested,
        }
    }
}

/// Discover the config file using the process environment and home directory.
pub fn discover_config_path() -> Option<PathBuf> {
    discover_config_path_from(std::env::var(CONFIG_ENV_VAR).ok(), dirs::home_dir())
}

/// Discovery with explicit inputs.
///
/// An env path is returned as-is, even when the file does not exist, so a
/// typo surfaces as a load error instead of silently falling through.
pub fn discover_config_path_from(
    env_path: Option<String>,
    home_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(p) = env_path.filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(p));
    }
    let candidate = home_dir?.join(".chorus").join("config.json");
    candidate.exists().then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let policy = RetryPolicy::default();
        assert!(policy.shuffle);
        assert_eq!(policy.max_retries, 3);
        assert!(!policy.single_provider_retry);
        assert!(policy.ignored_providers.is_empty());
        assert!(policy.timeout().is_none());
        assert_eq!(policy.backoff.base_delay_ms, 0);
        assert_eq!(policy.runtime, RuntimeMode::Auto);
    }

    #[test]
    fn empty_json_is_default() {
        let policy = RetryPolicy::from_json("{}").unwrap();
        assert_eq!(policy, RetryPolicy::default());
    }

    #[test]
    fn camel_case_aliases() {
        let json = r#"{
            "shuffle": false,
            "maxRetries": 5,
            "singleProviderRetry": true,
            "ignoredProviders": ["flaky"],
            "timeoutSecs": 10,
            "backoff": { "baseDelayMs": 100, "jitterFraction": 0.5 },
            "runtime": "fail_if_nested",
            "unknownField": "ignored"
        }"#;
        let policy = RetryPolicy::from_json(json).unwrap();
        assert!(!policy.shuffle);
        assert_eq!(policy.max_retries, 5);
        assert!(policy.single_provider_retry);
        assert!(policy.ignored_providers.contains("flaky"));
        assert_eq!(policy.timeout(), Some(Duration::from_secs(10)));
        assert_eq!(policy.backoff.base_delay_ms, 100);
        assert_eq!(policy.backoff.max_delay_ms, 30_000);
        assert_eq!(policy.runtime, RuntimeMode::FailIfNested);
    }

    #[test]
    fn zero_retries_still_attempts_once() {
        let policy = RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.attempts(), 1);
    }

    #[test]
    fn validate_rejects_bad_jitter() {
        let err = RetryPolicy::from_json(r#"{"backoff": {"jitter_fraction": 1.5}}"#).unwrap_err();
        assert!(matches!(err, ProviderError::Config(_)));
    }

    #[test]
    fn validate_rejects_inverted_delays() {
        let err = RetryPolicy::from_json(
            r#"{"backoff": {"base_delay_ms": 5000, "max_delay_ms": 10}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_delay_ms"));
    }

    #[test]
    fn discovery_prefers_env() {
        let dir = tempfile::tempdir().unwrap();
        let found = discover_config_path_from(
            Some("/etc/chorus.json".into()),
            Some(dir.path().to_path_buf()),
        );
        assert_eq!(found, Some(PathBuf::from("/etc/chorus.json")));
    }

    #[test]
    fn discovery_uses_home_file_when_present() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_config_path_from(None, Some(dir.path().to_path_buf())).is_none());

        let chorus_dir = dir.path().join(".chorus");
        std::fs::create_dir_all(&chorus_dir).unwrap();
        std::fs::write(chorus_dir.join("config.json"), "{}").unwrap();
        let found = discover_config_path_from(None, Some(dir.path().to_path_buf()));
        assert_eq!(found, Some(chorus_dir.join("config.json")));
    }

    #[test]
    fn load_reads_env_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(&path, r#"{"max_retries": 7}"#).unwrap();

        temp_env::with_var(CONFIG_ENV_VAR, Some(path.to_str().unwrap()), || {
            let policy = RetryPolicy::load(None).unwrap();
            assert_eq!(policy.max_retries, 7);
        });
    }

    #[test]
    fn load_missing_env_path_is_an_error() {
        temp_env::with_var(CONFIG_ENV_VAR, Some("/nonexistent/chorus.json"), || {
            let err = RetryPolicy::load(None).unwrap_err();
            assert!(matches!(err, ProviderError::Config(_)));
        });
    }

    #[test]
    fn explicit_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("explicit.json");
        std::fs::write(&path, r#"{"shuffle": false}"#).unwrap();

        temp_env::with_var(CONFIG_ENV_VAR, Some("/nonexistent/chorus.json"), || {
            let policy = RetryPolicy::load(Some(&path)).unwrap();
            assert!(!policy.shuffle);
        });
    }
}
