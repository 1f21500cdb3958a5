use kambafy_api::config::{ConfigError as PaymentsConfigError, PaymentsConfig};
use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub payments: PaymentsConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Config {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
            payments: PaymentsConfig::from_env()?,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for: {0}")]
    InvalidValue(String),
    #[error(transparent)]
    Payments(#[from] PaymentsConfigError),
}
