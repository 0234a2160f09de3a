use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Required environment variable is not set.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
}

pub(crate) const DEFAULT_DATA_PATH: &str = "./gman.data";
pub(crate) const DEFAULT_PREFIX: &str = "?";

#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub token: String,
    pub data_path: PathBuf,
    pub prefix: String,
}

impl Config {
    /// Reads the configuration from the environment (and `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token = lookup("DISCORD_TOKEN")
            .ok_or_else(|| ConfigError::MissingEnvVar("DISCORD_TOKEN".to_owned()))?;
        let data_path = lookup("GMAN_DATA_PATH")
            .unwrap_or_else(|| DEFAULT_DATA_PATH.to_owned())
            .into();
        let prefix = lookup("GMAN_PREFIX").unwrap_or_else(|| DEFAULT_PREFIX.to_owned());

        Ok(Self {
            token,
            data_path,
            prefix,
        })
    }
}
