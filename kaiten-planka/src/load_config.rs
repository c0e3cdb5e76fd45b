/// `load_config` module: builds the run configuration from the environment and
/// an optional YAML file of tunables.
///
/// Secrets and endpoints come only from the environment (after `.env` has been
/// loaded by `main`). The YAML file holds nothing sensitive; every key in it
/// is optional and falls back to the defaults below.
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary. A
/// missing or blank variable names the variable.
use anyhow::Result;
use kaiten_planka_core::config::{Concurrency, MigrationConfig};
use kaiten_planka_core::rate_limit::{DEFAULT_SOURCE_BURST, DEFAULT_SOURCE_RATE};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::{error, info};

use crate::http::HttpSettings;

pub const REQUIRED_ENV: [&str; 6] = [
    "KAITEN_URL",
    "KAITEN_TOKEN",
    "PLANKA_URL",
    "PLANKA_TOKEN",
    "ADMIN_EMAIL",
    "ADMIN_PASSWORD",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Base URL without a trailing slash.
    pub url: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub per_second: u32,
    pub burst: u32,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            per_second: DEFAULT_SOURCE_RATE,
            burst: DEFAULT_SOURCE_BURST,
        }
    }
}

/// Optional YAML tunables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Tunables {
    pub default_user_password: String,
    pub default_user_role: String,
    pub rate_limit: RateLimitSection,
    pub concurrency: Concurrency,
    pub http: HttpSettings,
}

impl Default for Tunables {
    fn default() -> Self {
        let defaults = MigrationConfig::new("", "");
        Self {
            default_user_password: defaults.default_user_password,
            default_user_role: defaults.default_user_role,
            rate_limit: RateLimitSection::default(),
            concurrency: Concurrency::default(),
            http: HttpSettings::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub kaiten: Endpoint,
    pub planka: Endpoint,
    pub migration: MigrationConfig,
    pub rate_limit: RateLimitSection,
    pub http: HttpSettings,
}

/// Reads the environment and, when given, the YAML file of tunables.
pub fn load_config(path: Option<&Path>) -> Result<CliConfig> {
    let tunables = match path {
        Some(path) => read_tunables(path)?,
        None => {
            info!("No config file given, using default tunables");
            Tunables::default()
        }
    };

    tunables.concurrency.validate()?;
    if tunables.rate_limit.per_second == 0 || tunables.rate_limit.burst == 0 {
        error!(rate_limit = ?tunables.rate_limit, "Invalid rate limit");
        anyhow::bail!("rate_limit.per_second and rate_limit.burst must be at least 1");
    }
    if tunables.http.timeout_secs == 0 {
        anyhow::bail!("http.timeout_secs must be at least 1");
    }

    let kaiten = Endpoint {
        url: base_url(required_env("KAITEN_URL")?),
        token: required_env("KAITEN_TOKEN")?,
    };
    let planka = Endpoint {
        url: base_url(required_env("PLANKA_URL")?),
        token: required_env("PLANKA_TOKEN")?,
    };

    let mut migration =
        MigrationConfig::new(required_env("ADMIN_EMAIL")?, required_env("ADMIN_PASSWORD")?);
    migration.default_user_password = tunables.default_user_password;
    migration.default_user_role = tunables.default_user_role;
    migration.concurrency = tunables.concurrency;

    info!(kaiten_url = %kaiten.url, planka_url = %planka.url, "Configuration loaded");
    Ok(CliConfig {
        kaiten,
        planka,
        migration,
        rate_limit: tunables.rate_limit,
        http: tunables.http,
    })
}

fn read_tunables(path: &Path) -> Result<Tunables> {
    info!(config_path = ?path, "Loading configuration from file");

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path, "Failed to read config file");
            return Err(anyhow::anyhow!("Failed to read config file {:?}: {}", path, e));
        }
    };

    // an empty file is a valid, all-defaults config
    if content.trim().is_empty() {
        return Ok(Tunables::default());
    }

    match serde_yaml::from_str(&content) {
        Ok(tunables) => {
            info!(config_path = ?path, "Parsed config YAML successfully");
            Ok(tunables)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}

fn required_env(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => {
            error!(variable = name, "Required environment variable missing");
            Err(anyhow::Error::new(kaiten_planka_core::Error::Config(format!(
                "environment variable {name} is not set"
            ))))
        }
    }
}

fn base_url(raw: String) -> String {
    raw.trim_end_matches('/').to_string()
}
