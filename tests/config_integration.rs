//! Integration tests for building namespaces from registry config files

use std::io::Write;
use std::thread;

use serial_test::serial;
use tidi::{Namespace, RegistryConfig, StorageMode};

#[derive(Debug, PartialEq)]
struct Endpoint(String);

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("create temp config");
    writeln!(file, "{}", contents).expect("write temp config");
    file
}

#[test]
#[serial]
fn test_shared_storage_from_file() {
    std::env::remove_var("TIDI_STORAGE");
    let file = write_config("storage = \"shared\"");
    let config = RegistryConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.storage, StorageMode::Shared);

    let namespace = Namespace::from_config(&config);
    namespace
        .register(Endpoint("https://api.local".into()))
        .unwrap();

    let other = namespace.clone();
    let seen = thread::spawn(move || other.registry().find::<Endpoint>().map(|e| e.0.clone()))
        .join()
        .unwrap();
    assert_eq!(seen.as_deref(), Some("https://api.local"));
}

#[test]
#[serial]
fn test_builtin_ban_can_be_disabled() {
    std::env::remove_var("TIDI_BAN_BUILTIN_TYPES");
    let file = write_config("ban_builtin_types = false");
    let config = RegistryConfig::load(Some(file.path())).unwrap();

    let namespace = Namespace::from_config(&config);
    assert!(namespace.register("plain string".to_string()).is_ok());
    assert_eq!(
        *namespace.registry().get::<String>().unwrap(),
        "plain string"
    );
}

#[test]
#[serial]
fn test_env_selects_storage() {
    std::env::set_var("TIDI_STORAGE", "per-thread");
    let config = RegistryConfig::from_env();
    std::env::remove_var("TIDI_STORAGE");

    assert_eq!(config.unwrap().storage, StorageMode::PerThread);
}
