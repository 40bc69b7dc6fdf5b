//! 运行时配置。
//!
//! 配置在进程范围内安装一次（通常由嵌入方在启动时完成），之后各处只读。
//! 热路径上频繁读取的开关另外缓存在原子变量中，避免每次解引用都获取锁。

use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    RwLock,
};

use log::debug;

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde_support", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde_support", serde(default))]
pub struct RuntimeConfig {
    /// Scan for unreachable reference cycles when an object loses a reference.
    pub cycle_collection: bool,
    /// How often a cycle scan is restarted after the object graph changed under it.
    pub rset_max_retries: u32,
    /// Functional domain bits that classes may not use.
    pub forbidden_domains: u64,
    /// Log exceptions raised by destructors on implicit release paths.
    pub log_implicit_destructor_errors: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            cycle_collection: true,
            rset_max_retries: 8,
            forbidden_domains: 0,
            log_implicit_destructor_errors: true,
        }
    }
}

#[cfg(feature = "serde_support")]
impl RuntimeConfig {
    /// Parses a JSON document; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

static CONFIG: RwLock<Option<RuntimeConfig>> = RwLock::new(None);
static CYCLE_COLLECTION: AtomicBool = AtomicBool::new(true);
static LOG_IMPLICIT: AtomicBool = AtomicBool::new(true);
static MAX_RETRIES: AtomicU32 = AtomicU32::new(8);

/// Replaces the process-wide configuration.
pub fn install(config: RuntimeConfig) {
    CYCLE_COLLECTION.store(config.cycle_collection, Ordering::Release);
    LOG_IMPLICIT.store(config.log_implicit_destructor_errors, Ordering::Release);
    MAX_RETRIES.store(config.rset_max_retries, Ordering::Release);
    debug!("installing runtime configuration: {:?}", config);
    match CONFIG.write() {
        Ok(mut slot) => *slot = Some(config),
        Err(poisoned) => *poisoned.into_inner() = Some(config),
    }
}

pub fn current() -> RuntimeConfig {
    let slot = match CONFIG.read() {
        Ok(slot) => slot.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    slot.unwrap_or_default()
}

#[inline(always)]
pub fn cycle_collection_enabled() -> bool {
    CYCLE_COLLECTION.load(Ordering::Acquire)
}

#[inline(always)]
pub fn log_implicit_destructor_errors() -> bool {
    LOG_IMPLICIT.load(Ordering::Acquire)
}

#[inline(always)]
pub fn rset_max_retries() -> u32 {
    MAX_RETRIES.load(Ordering::Acquire)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert!(config.cycle_collection);
        assert_eq!(config.rset_max_retries, 8);
        assert_eq!(config.forbidden_domains, 0);
    }

    #[cfg(feature = "serde_support")]
    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = RuntimeConfig::from_json_str(r#"{"rset_max_retries": 2}"#).unwrap();
        assert_eq!(config.rset_max_retries, 2);
        assert!(config.cycle_collection);
        assert!(config.log_implicit_destructor_errors);
    }
}
