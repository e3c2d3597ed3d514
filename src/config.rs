//! Pool configuration
//!
//! Everything the pool needs to launch engines is carried by one immutable
//! [`PoolConfig`], built once at startup (defaults, a JSON file, or CLI flags)
//! and handed to [`crate::EnginePool::new`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config_error;
use crate::errors::Result;

/// Default location of bundled engine executables
pub const DEFAULT_ASSETS_DIR: &str = "assets/engines/";

/// Engine build flavour, mapped to a file-name suffix by the resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Works on Unix and Windows machines
    #[default]
    Default,
    /// Works on Unix and Windows machines
    Bmi2,
    /// Works on Windows machines
    Popcnt,
    /// Works on Unix machines
    Modern,
}

/// A UCI option passed to every engine at construction.
///
/// Immutable: the pool shares one list of these across all spawns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOption {
    pub name: String,
    pub value: String,
}

impl EngineOption {
    pub fn new(name: impl Into<String>, value: impl ToString) -> Self {
        Self {
            name: name.into(),
            value: value.to_string(),
        }
    }

    /// The `setoption` command line for this option
    pub fn to_command(&self) -> String {
        format!("setoption name {} value {}", self.name, self.value)
    }
}

/// Configuration for the engine pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub engine_path: Option<PathBuf>, // Explicit executable, bypasses the assets scan
    pub engine_args: Vec<String>,
    pub assets_dir: PathBuf,
    pub variant: Variant,
    pub engine_version: Option<u32>,    // None = highest available
    pub evaluator_version: Option<u32>, // Version launched for the evaluator
    pub initial_instances: usize,
    pub max_instances: usize, // Cap on regular engines (evaluator excluded)
    pub options: Vec<EngineOption>,
    pub evaluator_poll_interval_ms: u64,
    pub eval_stall_window_ms: u64, // How long "more output" may lag during eval dumps
    pub handshake_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            engine_path: None,
            engine_args: Vec::new(),
            assets_dir: PathBuf::from(DEFAULT_ASSETS_DIR),
            variant: Variant::Default,
            engine_version: None,
            evaluator_version: Some(10),
            initial_instances: 1,
            max_instances: num_cpus::get().max(1),
            options: Vec::new(),
            evaluator_poll_interval_ms: 500,
            eval_stall_window_ms: 25,
            handshake_timeout_ms: 10_000,
        }
    }
}

impl PoolConfig {
    /// Config that launches `path` directly instead of scanning the assets directory
    pub fn with_engine_path(path: impl Into<PathBuf>) -> Self {
        Self {
            engine_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PoolConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_instances == 0 {
            return Err(config_error!("max_instances must be at least 1"));
        }
        if self.initial_instances > self.max_instances {
            return Err(config_error!(
                "initial_instances ({}) exceeds max_instances ({})",
                self.initial_instances,
                self.max_instances
            ));
        }
        Ok(())
    }

    pub fn evaluator_poll_interval(&self) -> Duration {
        Duration::from_millis(self.evaluator_poll_interval_ms)
    }

    pub fn eval_stall_window(&self) -> Duration {
        Duration::from_millis(self.eval_stall_window_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.initial_instances, 1);
        assert!(config.max_instances >= 1);
        assert_eq!(config.evaluator_version, Some(10));
        assert_eq!(config.evaluator_poll_interval(), Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_option_command() {
        let option = EngineOption::new("Threads", 4);
        assert_eq!(option.to_command(), "setoption name Threads value 4");
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "engine_path": "/usr/bin/stockfish",
            "variant": "bmi2",
            "max_instances": 3,
            "options": [{ "name": "Hash", "value": "64" }]
        }"#;
        let config = PoolConfig::from_json_str(json).unwrap();
        assert_eq!(config.engine_path, Some(PathBuf::from("/usr/bin/stockfish")));
        assert_eq!(config.variant, Variant::Bmi2);
        assert_eq!(config.max_instances, 3);
        assert_eq!(config.options, vec![EngineOption::new("Hash", 64)]);
        // Unspecified fields keep their defaults
        assert_eq!(config.initial_instances, 1);
        assert_eq!(config.handshake_timeout_ms, 10_000);
    }

    #[test]
    fn test_config_rejects_bad_bounds() {
        assert!(PoolConfig::from_json_str(r#"{ "max_instances": 0 }"#).is_err());
        assert!(
            PoolConfig::from_json_str(r#"{ "initial_instances": 5, "max_instances": 2 }"#).is_err()
        );
        assert!(PoolConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");
        std::fs::write(&path, r#"{ "max_instances": 2, "eval_stall_window_ms": 5 }"#).unwrap();

        let config = PoolConfig::from_json_file(&path).unwrap();
        assert_eq!(config.max_instances, 2);
        assert_eq!(config.eval_stall_window(), Duration::from_millis(5));

        assert!(PoolConfig::from_json_file(dir.path().join("missing.json")).is_err());
    }
}
