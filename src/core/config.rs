use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::core::supervisor::Credentials;

pub const DEFAULT_CONFIG_PATH: &str = "notifier.toml";
pub const CONFIG_PATH_ENV: &str = "NOTIFIER_CONFIG";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NotifierConfig {
    #[serde(default)]
    pub bot_token: Option<String>,

    #[serde(default)]
    pub allowed_chat_ids: Vec<i64>,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// When false only the first server is watched and server lines are hidden.
    #[serde(default = "default_true")]
    pub multi_server: bool,

    #[serde(default = "default_true")]
    pub persistent_preferences: bool,

    /// Alert recipients when preferences are not persistent. Defaults to the allow-list.
    #[serde(default)]
    pub notify_chat_ids: Option<Vec<i64>>,

    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_max_age_days")]
    pub max_age_days: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub endpoint: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ServerConfig {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            username: None,
            password: None,
        }
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.username.as_ref().map(|username| Credentials {
            username: username.clone(),
            password: self.password.clone().unwrap_or_default(),
        })
    }
}

fn default_page_size() -> usize {
    5
}
fn default_poll_interval() -> u64 {
    1
}
fn default_true() -> bool {
    true
}
fn default_database_path() -> PathBuf {
    PathBuf::from("notifier.db")
}
fn default_request_timeout() -> u64 {
    10
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}
fn default_max_age_days() -> u64 {
    60
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            max_age_days: default_max_age_days(),
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            allowed_chat_ids: Vec::new(),
            page_size: default_page_size(),
            poll_interval_secs: default_poll_interval(),
            multi_server: true,
            persistent_preferences: true,
            notify_chat_ids: None,
            database_path: default_database_path(),
            request_timeout_secs: default_request_timeout(),
            log: LogConfig::default(),
            servers: Vec::new(),
        }
    }
}

/// Picks the config file: explicit flag, then `NOTIFIER_CONFIG`, then the default name.
pub fn resolve_path(flag: Option<&str>) -> PathBuf {
    flag.map(PathBuf::from)
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

impl NotifierConfig {
    /// Reads the TOML file (a missing file means defaults) and layers the
    /// process environment on top.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::from_file(path.as_ref()).await?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No {} found, using defaults and environment.", path.display());
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: NotifierConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        info!(
            "Loaded config from {}: {} server(s), page_size={}",
            path.display(),
            config.servers.len(),
            config.page_size
        );
        Ok(config)
    }

    /// Environment overrides under the variable names operators already use.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN").filter(|t| !t.trim().is_empty()) {
            self.bot_token = Some(token.trim().to_string());
        }

        if let Some(urls) = lookup("SERVER_URLS") {
            let servers: Vec<ServerConfig> = urls
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(ServerConfig::new)
                .collect();
            if !servers.is_empty() {
                self.servers = servers;
            }
        }

        if let Some(ids) = lookup("ALLOWED_CHAT_IDS") {
            self.allowed_chat_ids = parse_chat_ids(&ids);
        }

        if let Some(raw) = lookup("PROCESSES_PER_PAGE") {
            match raw.trim().parse::<usize>() {
                Ok(size) => self.page_size = size,
                Err(_) => warn!("Ignoring invalid PROCESSES_PER_PAGE value {:?}", raw),
            }
        }

        if let Some(username) = lookup("SUPERVISOR_USERNAME").filter(|u| !u.is_empty()) {
            let password = lookup("SUPERVISOR_PASSWORD");
            for server in self.servers.iter_mut().filter(|s| s.username.is_none()) {
                server.username = Some(username.clone());
                server.password = password.clone();
            }
        }
    }

    /// Checks shared by every command. `require_token` is set for `run`.
    pub fn validate(&self, require_token: bool) -> Result<()> {
        if self.servers.is_empty() {
            bail!("No supervisor servers configured (set [[servers]] or SERVER_URLS)");
        }
        if let Some(server) = self.servers.iter().find(|s| s.endpoint.trim().is_empty()) {
            bail!("Server entry has an empty endpoint: {:?}", server);
        }
        if self.page_size == 0 {
            bail!("page_size must be at least 1");
        }
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be at least 1");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be at least 1");
        }
        if require_token && self.bot_token.as_deref().is_none_or(|t| t.is_empty()) {
            bail!("Telegram bot token is missing (set bot_token or TELEGRAM_BOT_TOKEN)");
        }
        if self.allowed_chat_ids.is_empty() {
            warn!("allowed_chat_ids is empty; every chat will be refused");
        }
        Ok(())
    }

    /// The servers actually watched, honouring `multi_server`.
    pub fn active_servers(&self) -> &[ServerConfig] {
        if !self.multi_server && self.servers.len() > 1 {
            warn!(
                "multi_server is off; ignoring {} server(s) after {}",
                self.servers.len() - 1,
                self.servers[0].endpoint
            );
            return &self.servers[..1];
        }
        &self.servers
    }

    pub fn alert_recipients(&self) -> Vec<i64> {
        self.notify_chat_ids
            .clone()
            .unwrap_or_else(|| self.allowed_chat_ids.clone())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Comma-separated chat ids; entries that are not integers are skipped with a warning.
pub fn parse_chat_ids(raw: &str) -> Vec<i64> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<i64>() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!("Skipping invalid chat id {:?}", s);
                None
            }
        })
        .collect()
}
