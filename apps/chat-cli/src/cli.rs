use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use cws_core::{AccountId, WidgetConfig};

#[derive(Parser, Debug)]
#[command(name = "cws-chat", about = "Chat with an account's support agents from the terminal")]
pub struct Cli {
    /// YAML widget config; CWS_* environment variables are used when absent
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Account the widget belongs to (overrides CWS_ACCOUNT_ID)
    #[arg(long)]
    pub account_id: Option<String>,

    /// Conversation API base URL
    #[arg(long)]
    pub api_url: Option<String>,

    /// Realtime socket mount point, e.g. ws://localhost:4000/socket
    #[arg(long)]
    pub socket_url: Option<String>,

    /// File holding this device's customer id
    #[arg(long)]
    pub identity_path: Option<PathBuf>,

    /// Header printed above the conversation
    #[arg(long)]
    pub title: Option<String>,
}

impl Cli {
    pub fn resolve(&self) -> Result<WidgetConfig> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Loads the file or environment configuration, then applies flags on
    /// top of it.
    pub fn resolve_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<WidgetConfig> {
        let mut config = match self.config.as_deref().filter(|path| path.exists()) {
            Some(path) => WidgetConfig::load(Some(path))?,
            None => WidgetConfig::from_lookup(|key| match (key, &self.account_id) {
                ("CWS_ACCOUNT_ID", Some(account_id)) => Some(account_id.clone()),
                _ => lookup(key),
            })?,
        };

        if let Some(account_id) = &self.account_id {
            config.account_id = AccountId::from(account_id.as_str());
        }
        if let Some(api_url) = &self.api_url {
            config.api_base = api_url.clone();
        }
        if let Some(socket_url) = &self.socket_url {
            config.socket_url = socket_url.clone();
        }
        if let Some(identity_path) = &self.identity_path {
            config.identity_path = Some(identity_path.clone());
        }
        if let Some(title) = &self.title {
            config.title = title.clone();
        }
        Ok(config)
    }
}
