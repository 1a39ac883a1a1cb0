use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use client_core::DEFAULT_API_BASE_URL;

pub const CONFIG_FILE: &str = "reacciona.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_base_url: String,
    pub credential_path: PathBuf,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            credential_path: default_credential_path(),
            log_level: "info".into(),
        }
    }
}

fn default_credential_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reacciona")
        .join("credential.json")
}

/// Defaults, then the config file (an explicit path must exist; the default
/// `reacciona.toml` is optional), then environment overrides.
pub fn load_settings(explicit_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let path = explicit_path.unwrap_or_else(|| Path::new(CONFIG_FILE));
    match fs::read_to_string(path) {
        Ok(raw) => apply_file(&mut settings, &raw)
            .with_context(|| format!("invalid config file '{}'", path.display()))?,
        Err(err) if explicit_path.is_none() && err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()))
        }
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

pub fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg = toml::from_str::<HashMap<String, String>>(raw)?;
    if let Some(v) = file_cfg.get("api_base_url") {
        settings.api_base_url = v.clone();
    }
    if let Some(v) = file_cfg.get("credential_path") {
        settings.credential_path = PathBuf::from(v);
    }
    if let Some(v) = file_cfg.get("log_level") {
        settings.log_level = v.clone();
    }
    Ok(())
}

/// `APP__*` names win over the short names when both are set.
pub fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("REACCIONA_API_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = var("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = var("REACCIONA_CREDENTIAL_PATH") {
        settings.credential_path = PathBuf::from(v);
    }
    if let Some(v) = var("APP__CREDENTIAL_PATH") {
        settings.credential_path = PathBuf::from(v);
    }

    if let Some(v) = var("APP__LOG_LEVEL") {
        settings.log_level = v;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
