//! Onyx 嵌入接口。
//!
//! # 主要功能
//! - [`Engine`]：持有类注册表，注册内置迭代器类，执行语句块
//! - 配置文件加载（[`config`]）
//! - 日志初始化（[`logging`]）
//! - 内置原生迭代器类（[`stdlib`]）

use std::{path::Path, sync::Arc};

pub use onyx_vm;
use onyx_vm::{
    exception::{merge_outcome, ExceptionSink},
    runtime::{
        frame::Frame,
        scope::ParseScope,
        statement::{Flow, StatementBlock},
    },
    ClassRegistry, ObjectRef, OnyxClass, OnyxException, OnyxValue, RuntimeConfig,
};

pub mod config;
pub mod logging;
pub mod stdlib;

use config::{ConfigError, EngineConfig};

/// A class registry populated with the builtin classes.
pub struct Engine {
    registry: ClassRegistry,
}

impl Engine {
    /// Uses the process-wide runtime configuration as it is.
    pub fn new() -> Result<Self, OnyxException> {
        Self::build(&onyx_vm::config::current())
    }

    /// Installs `config` process-wide, then builds the engine.
    pub fn with_config(config: RuntimeConfig) -> Result<Self, OnyxException> {
        onyx_vm::config::install(config.clone());
        Self::build(&config)
    }

    /// Like [`Engine::with_config`]; also sets up logging when a level is given.
    pub fn from_engine_config(config: EngineConfig) -> Result<Self, OnyxException> {
        if let Some(level) = &config.log_level {
            logging::init_logging_named(level);
        }
        Self::with_config(config.runtime)
    }

    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let config = config::load_config_file(path)?;
        Ok(Self::from_engine_config(config)?)
    }

    fn build(config: &RuntimeConfig) -> Result<Self, OnyxException> {
        let registry = ClassRegistry::from_config(config);
        stdlib::register_all(&registry)?;
        #[cfg(feature = "debug")]
        log::debug!("engine ready with {} classes", registry.len());
        Ok(Engine { registry })
    }

    #[inline(always)]
    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    pub fn register_class(&self, class: Arc<OnyxClass>) -> Result<(), OnyxException> {
        self.registry.register(class)
    }

    pub fn find_class(&self, name: &str) -> Option<Arc<OnyxClass>> {
        self.registry.find(name)
    }

    /// Instantiates a registered class from outside any class.
    pub fn instantiate(&self, name: &str, args: Vec<OnyxValue>) -> Result<ObjectRef, OnyxException> {
        self.registry.instantiate(name, args, None)
    }

    /// Executes a top-level block in a fresh frame sized for `scope`.
    ///
    /// Returns the value of a `return` statement, or `Nothing`. All locals are
    /// released before returning; exceptions raised while releasing them are
    /// chained after the block's own exception.
    pub fn run(&self, scope: &ParseScope, block: &StatementBlock) -> Result<OnyxValue, OnyxException> {
        let mut frame = Frame::new(scope.frame_size(), None, None);
        let outcome = block.exec(&mut frame).map(|flow| match flow {
            Flow::Return(value) => value,
            _ => OnyxValue::Nothing,
        });
        let mut xsink = ExceptionSink::new();
        xsink.absorb(frame.release());
        merge_outcome(outcome, xsink)
    }
}

#[derive(Debug)]
pub enum EngineError {
    Config(ConfigError),
    Runtime(OnyxException),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Config(e) => write!(f, "{}", e),
            EngineError::Runtime(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        EngineError::Config(e)
    }
}

impl From<OnyxException> for EngineError {
    fn from(e: OnyxException) -> Self {
        EngineError::Runtime(e)
    }
}
