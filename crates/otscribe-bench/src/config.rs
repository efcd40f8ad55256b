//! Configuration for otscribe-bench.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $OTSCRIBE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/otscribe/config.toml
//!   3. ~/.config/otscribe/config.toml
//!
//! A missing file is not an error; a malformed one is.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use otscribe_core::{DigestConfig, DigestError};
use otscribe_engine::{EngineConfig, Variant};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub network: NetworkConfig,
    pub bench: BenchSettings,
    pub engine: EngineConfig,
    pub digest: DigestSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address party 1 listens on.
    pub listen_host: String,
    /// Address party 2 connects to.
    pub peer_host: String,
    /// Connect attempts per channel before party 2 gives up.
    pub connect_attempts: u32,
    pub connect_retry_ms: u64,
    pub nodelay: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchSettings {
    /// Parallel channels, one worker each.
    pub channels: usize,
    /// log2 of the bulk request when none is given on the command line.
    pub default_log2: u32,
    /// Requests above 2^max_log2 are refused before any work starts.
    pub max_log2: u32,
    /// Correlations spot-checked after each bulk phase. 0 = skip.
    pub verify_samples: usize,
    /// Exchange aggregate digests with the peer at the end of the run.
    pub cross_check: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestSettings {
    /// Digest length in bytes.
    pub len: usize,
}

/// Hard ceiling for `max_log2`, whatever the config says.
pub const MAX_LOG2_CEILING: u32 = 40;

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".to_string(),
            peer_host: "127.0.0.1".to_string(),
            connect_attempts: 600,
            connect_retry_ms: 50,
            nodelay: true,
        }
    }
}

impl Default for BenchSettings {
    fn default() -> Self {
        Self {
            channels: 2,
            default_log2: 24,
            max_log2: 30,
            verify_samples: 1024,
            cross_check: true,
        }
    }
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            len: otscribe_core::digest::DEFAULT_DIGEST_LEN,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home().join(".config"))
        .join("otscribe")
}

fn home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Digest(#[from] DigestError),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl BenchConfig {
    /// Load config: env vars → file → defaults, then validate.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            BenchConfig::default()
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("OTSCRIBE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Apply OTSCRIBE_* overrides. `lookup` stands in for the process
    /// environment.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("OTSCRIBE_NETWORK__PEER_HOST") {
            self.network.peer_host = v;
        }
        if let Some(v) = lookup("OTSCRIBE_NETWORK__LISTEN_HOST") {
            self.network.listen_host = v;
        }
        if let Some(v) = lookup("OTSCRIBE_BENCH__CHANNELS") {
            self.bench.channels = parse("OTSCRIBE_BENCH__CHANNELS", v)?;
        }
        if let Some(v) = lookup("OTSCRIBE_BENCH__MAX_LOG2") {
            self.bench.max_log2 = parse("OTSCRIBE_BENCH__MAX_LOG2", v)?;
        }
        if let Some(v) = lookup("OTSCRIBE_BENCH__VERIFY_SAMPLES") {
            self.bench.verify_samples = parse("OTSCRIBE_BENCH__VERIFY_SAMPLES", v)?;
        }
        if let Some(v) = lookup("OTSCRIBE_BENCH__CROSS_CHECK") {
            self.bench.cross_check = flag(v);
        }
        if let Some(v) = lookup("OTSCRIBE_ENGINE__MALICIOUS") {
            self.engine.malicious = flag(v);
        }
        if let Some(v) = lookup("OTSCRIBE_ENGINE__PRECOMPUTE") {
            self.engine.precompute = flag(v);
        }
        if let Some(v) = lookup("OTSCRIBE_ENGINE__VARIANT") {
            self.engine.variant = v.parse::<Variant>().map_err(|_| ConfigError::InvalidEnv {
                var: "OTSCRIBE_ENGINE__VARIANT",
                value: v,
            })?;
        }
        if let Some(v) = lookup("OTSCRIBE_ENGINE__BATCH_LIMIT") {
            self.engine.batch_limit = Some(parse("OTSCRIBE_ENGINE__BATCH_LIMIT", v)?);
        }
        if let Some(v) = lookup("OTSCRIBE_DIGEST__LEN") {
            self.digest.len = parse("OTSCRIBE_DIGEST__LEN", v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bench.channels == 0 {
            return Err(ConfigError::Invalid("bench.channels must be at least 1".into()));
        }
        if self.bench.max_log2 > MAX_LOG2_CEILING {
            return Err(ConfigError::Invalid(format!(
                "bench.max_log2 {} exceeds {MAX_LOG2_CEILING}",
                self.bench.max_log2
            )));
        }
        if self.engine.batch_limit == Some(0) {
            return Err(ConfigError::Invalid("engine.batch_limit must be positive".into()));
        }
        if self.network.connect_attempts == 0 {
            return Err(ConfigError::Invalid(
                "network.connect_attempts must be at least 1".into(),
            ));
        }
        self.digest_config()?;
        Ok(())
    }

    pub fn digest_config(&self) -> Result<DigestConfig, ConfigError> {
        Ok(DigestConfig::new(self.digest.len)?)
    }
}

fn parse<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}

fn flag(value: String) -> bool {
    value == "true" || value == "1"
}
