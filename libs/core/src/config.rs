//! Widget configuration loaded from a YAML file or the environment.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use crate::ids::AccountId;

pub const DEFAULT_API_BASE: &str = "http://localhost:4000";
pub const DEFAULT_SOCKET_URL: &str = "ws://localhost:4000/socket";
pub const DEFAULT_TITLE: &str = "Welcome!";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WidgetConfig {
    pub account_id: AccountId,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_socket_url")]
    pub socket_url: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub identity_path: Option<PathBuf>,
}

impl WidgetConfig {
    pub fn new(account_id: impl Into<AccountId>) -> Self {
        Self {
            account_id: account_id.into(),
            api_base: default_api_base(),
            socket_url: default_socket_url(),
            title: default_title(),
            identity_path: None,
        }
    }

    /// Reads `config_path` when it exists, otherwise falls back to the
    /// `CWS_*` environment variables.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            if path.exists() {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("read widget config {}", path.display()))?;
                return serde_yaml_bw::from_str(&raw)
                    .with_context(|| format!("parse widget config {}", path.display()));
            }
            tracing::debug!(path = %path.display(), "widget config file missing; using environment");
        }
        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let account_id = non_empty("CWS_ACCOUNT_ID")
            .ok_or_else(|| anyhow!("CWS_ACCOUNT_ID must be set to the widget's account id"))?;

        Ok(Self {
            account_id: AccountId::from(account_id),
            api_base: non_empty("CWS_API_URL").unwrap_or_else(default_api_base),
            socket_url: non_empty("CWS_SOCKET_URL").unwrap_or_else(default_socket_url),
            title: non_empty("CWS_TITLE").unwrap_or_else(default_title),
            identity_path: non_empty("CWS_IDENTITY_PATH").map(PathBuf::from),
        })
    }
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_socket_url() -> String {
    DEFAULT_SOCKET_URL.to_string()
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_applied() {
        let config = WidgetConfig::from_lookup(lookup(&[("CWS_ACCOUNT_ID", "acct1")])).unwrap();
        assert_eq!(config.account_id.as_str(), "acct1");
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.socket_url, DEFAULT_SOCKET_URL);
        assert_eq!(config.title, "Welcome!");
        assert!(config.identity_path.is_none());
    }

    #[test]
    fn missing_account_id_is_an_error() {
        let err = WidgetConfig::from_lookup(lookup(&[("CWS_ACCOUNT_ID", "  ")])).unwrap_err();
        assert!(err.to_string().contains("CWS_ACCOUNT_ID"));
    }

    #[test]
    fn load_from_file_parses_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("widget.yaml");
        fs::write(
            &path,
            r#"
account_id: acct-yaml
api_base: "https://chat.example.com"
socket_url: "wss://chat.example.com/socket"
identity_path: "/tmp/cws/identity.json"
"#,
        )
        .unwrap();

        let config = WidgetConfig::load(Some(&path)).unwrap();
        assert_eq!(config.account_id.as_str(), "acct-yaml");
        assert_eq!(config.api_base, "https://chat.example.com");
        assert_eq!(config.socket_url, "wss://chat.example.com/socket");
        assert_eq!(config.title, DEFAULT_TITLE);
        assert_eq!(
            config.identity_path.as_deref(),
            Some(Path::new("/tmp/cws/identity.json"))
        );
    }
}
