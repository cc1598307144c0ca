use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_API_URL: &str = "https://api.sidegig.app/v1";

/// CLI configuration loadable from a JSON file. Flags and environment
/// variables override file values.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl CliConfig {
    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: CliConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Default location: `<config dir>/sidegig/notify.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sidegig").join("notify.json"))
    }
}

/// Fully resolved settings for one command run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url: String,
    pub token: String,
    pub user_id: String,
}

pub fn resolve(
    explicit_path: Option<&Path>,
    api_url: Option<String>,
    token: Option<String>,
    user_id: Option<String>,
) -> Result<Settings> {
    let file = match explicit_path {
        Some(path) => CliConfig::load(path)?,
        None => match CliConfig::default_path() {
            Some(path) if path.exists() => CliConfig::load(&path)?,
            _ => CliConfig::default(),
        },
    };
    // Precedence: flag, then environment, then config file.
    let api_url = api_url.or_else(|| env_var("SIDEGIG_API_URL"));
    let token = token.or_else(|| env_var("SIDEGIG_TOKEN"));
    let user_id = user_id.or_else(|| env_var("SIDEGIG_USER_ID"));
    merge(file, api_url, token, user_id)
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn merge(
    file: CliConfig,
    api_url: Option<String>,
    token: Option<String>,
    user_id: Option<String>,
) -> Result<Settings> {
    let api_url = api_url
        .or(file.api_url)
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let Some(token) = token.or(file.token) else {
        bail!("no bearer token; pass --token, set SIDEGIG_TOKEN or add \"token\" to the config file");
    };
    let Some(user_id) = user_id.or(file.user_id) else {
        bail!("no user id; pass --user-id, set SIDEGIG_USER_ID or add \"userId\" to the config file");
    };
    Ok(Settings {
        api_url,
        token,
        user_id,
    })
}
