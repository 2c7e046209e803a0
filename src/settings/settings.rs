use anyhow::{Result, anyhow};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub hasher: Hasher,
    pub http: Http,
    pub log: Log,
    pub rpc: Rpc,
    pub shutdown: Shutdown,
    pub store: Store,
}

#[derive(Debug, Deserialize)]
pub struct Hasher {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub address: String,
    pub tls: Tls,
}

#[derive(Debug, Deserialize)]
pub struct Tls {
    pub mode: String, // "off" or "on"
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[derive(Debug, Deserialize)]
pub struct Rpc {
    pub address: String,
    #[serde(default)]
    pub reflection: bool,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Shutdown {
    pub http_deadline_ms: u64,
}

#[derive(Deserialize)]
pub struct Store {
    pub backend: String, // "fake" or "postgres"
    #[serde(default)]
    pub database_url: String,
    pub max_connections: u32,
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub run_migrations: bool,
}

// database_url usually embeds a password.
impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("backend", &self.backend)
            .field("database_url", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("run_migrations", &self.run_migrations)
            .finish()
    }
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

const ENV_PREFIX: &str = "WARDEN";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}
