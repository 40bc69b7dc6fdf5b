//! 引擎配置文件的加载。
//!
//! 配置是一个 JSON 文档：运行时开关直接写在顶层（见 [`RuntimeConfig`]），
//! 另外可以带一个可选的 `log_level`。缺省的字段保持默认值。

use std::{fmt::Display, fs, path::Path};

use onyx_vm::RuntimeConfig;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(flatten)]
    pub runtime: RuntimeConfig,
    /// `error`, `warn`, `info`, `debug` or `trace`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "cannot read configuration: {}", e),
            ConfigError::Parse(e) => write!(f, "invalid configuration: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

pub fn load_config_str(json: &str) -> Result<EngineConfig, ConfigError> {
    Ok(serde_json::from_str(json)?)
}

pub fn load_config_file(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
    let text = fs::read_to_string(path)?;
    load_config_str(&text)
}

/// Loads a configuration file and installs its runtime part process-wide.
pub fn install_config_file(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
    let config = load_config_file(path)?;
    onyx_vm::config::install(config.runtime.clone());
    Ok(config)
}
