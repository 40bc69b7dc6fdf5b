//! 日志初始化。运行时通过 `log` 门面输出，这里用 `env_logger` 接收。
//!
//! 未启用 `debug` 特性时这些函数什么也不做。

#[cfg(feature = "debug")]
use log::LevelFilter;

/// Parses `error`, `warn`, `info`, `debug`, `trace` or `off`.
#[cfg(feature = "debug")]
pub fn parse_level(level: &str) -> Option<LevelFilter> {
    level.trim().parse().ok()
}

/// Installs a logger with a fixed level. Returns false if one was already installed.
#[cfg(feature = "debug")]
pub fn init_logging(level: LevelFilter) -> bool {
    env_logger::Builder::new()
        .filter_level(level)
        .try_init()
        .is_ok()
}

/// Installs a logger configured by `RUST_LOG`, defaulting to `warn`.
#[cfg(feature = "debug")]
pub fn init_logging_from_env() -> bool {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .try_init()
        .is_ok()
}

#[cfg(not(feature = "debug"))]
pub fn init_logging_from_env() -> bool {
    false
}

/// Installs a logger for a level name taken from a configuration file.
pub fn init_logging_named(level: &str) -> bool {
    #[cfg(feature = "debug")]
    {
        match parse_level(level) {
            Some(filter) => init_logging(filter),
            None => {
                let installed = init_logging_from_env();
                log::warn!("unknown log level {:?}, using RUST_LOG", level);
                installed
            }
        }
    }
    #[cfg(not(feature = "debug"))]
    {
        let _ = level;
        false
    }
}
