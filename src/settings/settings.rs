use anyhow::{Result, anyhow};
use config::{Config, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub auth: Auth,
    pub chat: Chat,
    pub http: Http,
    pub log: Log,
    pub media: Media,
    pub storage: Storage,
}

#[derive(Debug, Deserialize)]
pub struct Auth {
    pub issuer: String,
    pub audience: String,
    /// "redis" or "none" — whether token jtis are checked against a denylist.
    pub revocation_backend: String,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    /// Per-connection cap on concurrently handled inbound messages.
    pub max_inflight_messages: usize,
    pub max_inflight_results: usize,
    /// Seconds before an in-flight message handler is abandoned.
    pub max_worker_timeout: u64,
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub cert_path: String,
    pub key_path: String,
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[derive(Debug, Deserialize)]
pub struct Media {
    /// Public prefix of the object store, e.g. "https://bucket.s3.amazonaws.com/".
    pub image_prefix: String,
    pub default_avatar: String,
    pub default_listing_thumb: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
    /// "mysql" or "memory"
    pub backend: String,
    pub mysql_dsn: String,
    pub redis_dsn: String,
    pub kafka_bootstrap: String,
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}
