use super::{apply_env, apply_file, load_settings, Settings};

use std::{
    collections::HashMap,
    env, fs,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

#[test]
fn defaults_point_at_local_backend() {
    let settings = Settings::default();
    assert_eq!(settings.api_base_url, "http://localhost:8080");
    assert_eq!(settings.log_level, "info");
    assert!(settings.credential_path.ends_with("reacciona/credential.json"));
}

#[test]
fn file_values_override_defaults() {
    let mut settings = Settings::default();
    apply_file(
        &mut settings,
        r#"
api_base_url = "https://api.reacciona.test"
credential_path = "/tmp/reacciona/token.json"
"#,
    )
    .expect("parse");

    assert_eq!(settings.api_base_url, "https://api.reacciona.test");
    assert_eq!(
        settings.credential_path,
        PathBuf::from("/tmp/reacciona/token.json")
    );
    assert_eq!(settings.log_level, "info");
}

#[test]
fn malformed_file_is_rejected() {
    let mut settings = Settings::default();
    assert!(apply_file(&mut settings, "api_base_url = [").is_err());
}

#[test]
fn prefixed_env_names_win() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("REACCIONA_API_URL", "http://short.test"),
        ("APP__API_BASE_URL", "http://prefixed.test"),
        ("REACCIONA_CREDENTIAL_PATH", "/tmp/short.json"),
        ("APP__LOG_LEVEL", "debug"),
    ]);
    let mut settings = Settings::default();

    apply_env(&mut settings, |key| vars.get(key).map(|v| v.to_string()));

    assert_eq!(settings.api_base_url, "http://prefixed.test");
    assert_eq!(settings.credential_path, PathBuf::from("/tmp/short.json"));
    assert_eq!(settings.log_level, "debug");
}

#[test]
fn explicit_config_path_must_exist() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let missing = env::temp_dir().join(format!("reacciona_missing_{suffix}.toml"));
    assert!(load_settings(Some(&missing)).is_err());

    let present = env::temp_dir().join(format!("reacciona_config_{suffix}.toml"));
    fs::write(&present, "log_level = \"warn\"\n").expect("write");
    let settings = load_settings(Some(&present)).expect("load");
    fs::remove_file(&present).expect("cleanup");

    assert!(!settings.log_level.is_empty());
}
