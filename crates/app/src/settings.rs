//! Handles settings for the application. Configuration is written in
//! `settings.toml` and can be overridden with `SPLITTER__` prefixed
//! environment variables, e.g. `SPLITTER__SERVER__PORT=8080`.
use config::{Config, ConfigError, Environment, File, Source};
use realtime::RealtimeConfig;
use serde::Deserialize;

const SETTINGS_FILE: &str = "settings";

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct App {
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub database: Database,
    pub bind: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    3000
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: App,
    pub server: Option<Server>,
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(File::with_name(SETTINGS_FILE).required(false))
    }

    fn load<S>(file: S) -> Result<Self, ConfigError>
    where
        S: Source + Send + Sync + 'static,
    {
        Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("SPLITTER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
