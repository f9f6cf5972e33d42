use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub auth: AuthConfig,
    pub mirror: MirrorConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Custom path for the on-disk credential cache
    pub credentials_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MirrorConfig {
    /// Local directory the remote hierarchy is materialized under
    pub storage_path: PathBuf,
    /// Widen the folder and file queries to include trashed items
    #[serde(default)]
    pub include_trashed: bool,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Regular expressions matched anywhere within a relative path
    #[serde(default)]
    pub exclusions: Vec<String>,
    /// Abort the run on an unparsable remote timestamp instead of
    /// skipping the affected file
    #[serde(default)]
    pub strict_timestamps: bool,
    /// Export formats for Drive-native documents, keyed by mime type
    #[serde(default)]
    pub download_formats: BTreeMap<String, DownloadFormat>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadFormat {
    /// Extension appended to the local filename
    pub extension: String,
    /// Content type used to pick the export link
    pub content_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationConfig {
    pub email: Option<EmailConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub from: String,
    pub recipients: Vec<String>,
    #[serde(default = "default_subject")]
    pub subject: String,
    /// Explicit SMTP relay; localhost is used when absent
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub starttls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

fn default_page_size() -> u32 {
    100
}
fn default_subject() -> String {
    "drivemirror: sync failed".into()
}
fn default_smtp_port() -> u16 {
    25
}

pub fn default_config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(dir.join("drivemirror").join("config.toml"))
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    let content = std::fs::read_to_string(&path).with_context(|| {
        format!(
            "Failed to read config file: {}\n\
             Create it with your Drive app credentials and storage path.\n\
             See config/drivemirror.example.toml for an example.",
            path.display()
        )
    })?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    if config.auth.client_id.is_empty() {
        anyhow::bail!("auth.client_id must not be empty");
    }
    if config.auth.client_secret.is_empty() {
        anyhow::bail!("auth.client_secret must not be empty");
    }
    if config.mirror.storage_path.as_os_str().is_empty() {
        anyhow::bail!("mirror.storage_path must not be empty");
    }
    if config.mirror.page_size == 0 {
        anyhow::bail!("mirror.page_size must be at least 1");
    }
    if let Some(email) = &config.notifications.email {
        if email.recipients.is_empty() {
            anyhow::bail!("notifications.email.recipients must not be empty");
        }
    }

    Ok(config)
}
