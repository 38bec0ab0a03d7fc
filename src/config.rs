use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::host::Hosts;
use crate::optimize::GIST_BUDGET_BYTES;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    En,
    Zh,
}

impl Language {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "en" => Ok(Self::En),
            "zh" => Ok(Self::Zh),
            _ => bail!("invalid language: must be en or zh"),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            Language::En => "en",
            Language::Zh => "zh",
        };
        write!(f, "{value}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Token for the gist API. Falls back to GITHUB_TOKEN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,

    /// Language for relative times (en or zh)
    #[serde(default)]
    pub language: Language,

    /// Viewer that opens #session= and #import= links
    #[serde(default = "default_viewer_url")]
    pub viewer_url: String,

    /// Size limit for gist shares, in bytes
    #[serde(default = "default_budget_bytes")]
    pub budget_bytes: usize,

    /// HTTP timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub hosts: Hosts,
}

fn default_viewer_url() -> String {
    "https://binggg.github.io/Claude-Code-Web-GUI/".to_string()
}

fn default_budget_bytes() -> usize {
    GIST_BUDGET_BYTES
}

fn default_timeout_secs() -> u64 {
    15
}

/// Keys accepted by `config set` and `config unset`.
pub const KEYS: &[&str] = &[
    "github_token",
    "language",
    "viewer_url",
    "budget_bytes",
    "timeout_secs",
    "hosts.web",
    "hosts.raw",
    "hosts.api",
];

pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("SESSIONSHARE_HOME") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home = std::env::var("HOME").context("HOME not set")?;
    Ok(PathBuf::from(home).join(".sessionshare"))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

impl Config {
    /// Load config from ~/.sessionshare/config.toml, returning defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Save config, creating the directory if needed. Last writer wins.
    pub fn save(&self) -> Result<PathBuf> {
        let path = config_path()?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let content = toml::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(&path, content).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    /// The configured token, else GITHUB_TOKEN.
    pub fn token(&self) -> Option<String> {
        self.github_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .filter(|t| !t.trim().is_empty())
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "github_token" => self.github_token = Some(value.to_string()),
            "language" => self.language = Language::parse(value)?,
            "viewer_url" => self.viewer_url = value.to_string(),
            "budget_bytes" => {
                self.budget_bytes = value
                    .parse()
                    .with_context(|| format!("invalid budget_bytes: {value}"))?;
                if self.budget_bytes == 0 {
                    bail!("budget_bytes must be greater than 0");
                }
            }
            "timeout_secs" => {
                self.timeout_secs = value
                    .parse()
                    .with_context(|| format!("invalid timeout_secs: {value}"))?;
            }
            "hosts.web" => self.hosts.web = value.to_string(),
            "hosts.raw" => self.hosts.raw = value.to_string(),
            "hosts.api" => self.hosts.api = value.to_string(),
            _ => bail!("unknown config key: {key} (expected one of: {})", KEYS.join(", ")),
        }
        Ok(())
    }

    /// Restore one key to its default.
    pub fn unset(&mut self, key: &str) -> Result<()> {
        let defaults = Config::default();
        match key {
            "github_token" => self.github_token = None,
            "language" => self.language = defaults.language,
            "viewer_url" => self.viewer_url = defaults.viewer_url,
            "budget_bytes" => self.budget_bytes = defaults.budget_bytes,
            "timeout_secs" => self.timeout_secs = defaults.timeout_secs,
            "hosts.web" => self.hosts.web = defaults.hosts.web,
            "hosts.raw" => self.hosts.raw = defaults.hosts.raw,
            "hosts.api" => self.hosts.api = defaults.hosts.api,
            _ => bail!("unknown config key: {key} (expected one of: {})", KEYS.join(", ")),
        }
        Ok(())
    }

    /// Display form with the token masked.
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        let token = match (&self.github_token, std::env::var("GITHUB_TOKEN").is_ok()) {
            (Some(t), _) if !t.trim().is_empty() => mask(t),
            (_, true) => "(from GITHUB_TOKEN)".to_string(),
            _ => "(not set)".to_string(),
        };
        vec![
            ("github_token", token),
            ("language", self.language.to_string()),
            ("viewer_url", self.viewer_url.clone()),
            ("budget_bytes", self.budget_bytes.to_string()),
            ("timeout_secs", self.timeout_secs.to_string()),
            ("hosts.web", self.hosts.web.clone()),
            ("hosts.raw", self.hosts.raw.clone()),
            ("hosts.api", self.hosts.api.clone()),
        ]
    }
}

fn mask(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    format!("{visible}…")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github_token: None,
            language: Language::default(),
            viewer_url: default_viewer_url(),
            budget_bytes: default_budget_bytes(),
            timeout_secs: default_timeout_secs(),
            hosts: Hosts::default(),
        }
    }
}
