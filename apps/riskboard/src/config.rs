use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use board_core::RetryPolicy;
use serde::Deserialize;
use shared::domain::TenantId;
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "riskboard.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_url: String,
    pub tenant_id: Option<TenantId>,
    pub write_max_attempts: u32,
    pub write_initial_backoff_ms: u64,
    pub write_max_backoff_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            database_url: "sqlite://./data/riskboard.db".into(),
            tenant_id: None,
            write_max_attempts: policy.max_attempts,
            write_initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            write_max_backoff_ms: policy.max_backoff.as_millis() as u64,
        }
    }
}

impl Settings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.write_max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.write_initial_backoff_ms),
            max_backoff: Duration::from_millis(
                self.write_max_backoff_ms.max(self.write_initial_backoff_ms),
            ),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    database_url: Option<String>,
    tenant_id: Option<String>,
    write_max_attempts: Option<u32>,
    write_initial_backoff_ms: Option<u64>,
    write_max_backoff_ms: Option<u64>,
}

pub fn load_settings(config_path: &Path) -> Settings {
    load_settings_from(config_path, |key| std::env::var(key).ok())
}

/// Defaults, then the TOML file, then environment variables.
pub fn load_settings_from(config_path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(config_path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.database_url {
                    settings.database_url = v;
                }
                if let Some(v) = file_cfg.tenant_id {
                    settings.tenant_id = parse_tenant(&v);
                }
                if let Some(v) = file_cfg.write_max_attempts {
                    settings.write_max_attempts = v;
                }
                if let Some(v) = file_cfg.write_initial_backoff_ms {
                    settings.write_initial_backoff_ms = v;
                }
                if let Some(v) = file_cfg.write_max_backoff_ms {
                    settings.write_max_backoff_ms = v;
                }
            }
            Err(error) => {
                warn!(path = %config_path.display(), %error, "ignoring malformed config file");
            }
        }
    }

    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = env("APP__TENANT_ID") {
        settings.tenant_id = parse_tenant(&v);
    }

    if let Some(v) = env("APP__WRITE_MAX_ATTEMPTS").and_then(|v| v.parse().ok()) {
        settings.write_max_attempts = v;
    }
    if let Some(v) = env("APP__WRITE_INITIAL_BACKOFF_MS").and_then(|v| v.parse().ok()) {
        settings.write_initial_backoff_ms = v;
    }
    if let Some(v) = env("APP__WRITE_MAX_BACKOFF_MS").and_then(|v| v.parse().ok()) {
        settings.write_max_backoff_ms = v;
    }

    settings
}

fn parse_tenant(raw: &str) -> Option<TenantId> {
    match raw.parse() {
        Ok(tenant_id) => Some(tenant_id),
        Err(error) => {
            warn!(%error, "ignoring invalid tenant id");
            None
        }
    }
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    let path = database_url
        .strip_prefix("sqlite://")?
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(PathBuf::from(path))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
