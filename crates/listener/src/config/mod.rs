use clap::Parser;
use serde::Deserialize;

use crate::{
    client::ReconnectPolicy,
    error::{AppError, Result},
};

const DEFAULT_CONFIG_PATH: &str = "config/listen.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    pub group: String,
    pub level: String,
    pub reconnect: ReconnectPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            group: String::new(),
            level: "info".to_string(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "splitter_listen", disable_version_flag = true)]
struct Args {
    /// Optional config file path (TOML).
    #[arg(long)]
    config: Option<String>,
    /// Override base URL (e.g. http://127.0.0.1:3000).
    #[arg(long)]
    base_url: Option<String>,
    /// Group to follow.
    #[arg(long)]
    group: Option<String>,
}

pub fn load() -> Result<AppConfig> {
    resolve(Args::parse())
}

fn resolve(args: Args) -> Result<AppConfig> {
    let config_path = args.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
    let mut builder = config::Config::builder();
    builder = builder.add_source(config::File::with_name(config_path).required(false));
    builder = builder.add_source(
        config::Environment::with_prefix("SPLITTER_LISTEN")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );
    let mut settings: AppConfig = builder.build()?.try_deserialize()?;

    if let Some(base_url) = args.base_url {
        settings.base_url = base_url;
    }
    if let Some(group) = args.group {
        settings.group = group;
    }

    settings.group = settings.group.trim().to_string();
    if settings.group.is_empty() {
        return Err(AppError::Invalid(
            "a group is required (--group or SPLITTER_LISTEN_GROUP)".to_string(),
        ));
    }

    Ok(settings)
}
