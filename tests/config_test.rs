use std::io::Write;

use onyx_lang::{
    config::{load_config_file, ConfigError},
    Engine, EngineError,
};
use onyx_vm::{exception::names, types::class::{ClassBuilder, FunctionalDomain}};

#[test]
fn test_engine_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"rset_max_retries": 3, "forbidden_domains": 4, "log_level": "warn"}}"#
    )
    .unwrap();

    let config = load_config_file(file.path()).unwrap();
    assert_eq!(config.runtime.rset_max_retries, 3);
    assert!(config.runtime.cycle_collection);

    let engine = Engine::from_config_file(file.path()).unwrap();
    assert_eq!(onyx_vm::config::current().rset_max_retries, 3);
    assert_eq!(onyx_vm::config::rset_max_retries(), 3);

    let sandboxed = ClassBuilder::new("Sandboxed")
        .domain(FunctionalDomain::from_bits(4))
        .build();
    let err = engine.register_class(sandboxed).unwrap_err();
    assert_eq!(err.err(), names::CLASS_DOMAIN);
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.json");
    assert!(matches!(load_config_file(&missing), Err(ConfigError::Io(_))));
    assert!(matches!(
        Engine::from_config_file(&missing),
        Err(EngineError::Config(ConfigError::Io(_)))
    ));
}
