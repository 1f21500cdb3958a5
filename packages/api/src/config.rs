//! Environment configuration for the payment reconciler.

use std::env;

use crate::{
    mail::{MailConfig, MailProviderType, SendgridSettings, SmtpSettings},
    reconcile::pricing::ExchangeRates,
    store::StoreBackend,
};

pub const DEFAULT_FRONTEND_URL: &str = "https://kambafy.com";
pub const DEFAULT_RATES_VERSION: &str = "builtin-v1";

#[derive(Clone, Debug)]
pub struct PaymentsConfig {
    /// Checked per request, not at startup
    pub webhook_secret: Option<String>,
    pub secret_key: Option<String>,
    pub allow_unverified_succeeded: bool,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub exchange_rates: ExchangeRates,
    pub fanout_url: Option<String>,
    pub fanout_token: Option<String>,
    pub frontend_url: String,
    pub mail: Option<MailConfig>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue(name, other.to_string())),
    }
}

impl PaymentsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Same as [`PaymentsConfig::from_env`] with an injectable variable lookup.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // empty values count as unset
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let allow_unverified_succeeded = match var("STRIPE_ALLOW_UNVERIFIED_SUCCEEDED") {
            Some(v) => parse_bool("STRIPE_ALLOW_UNVERIFIED_SUCCEEDED", &v)?,
            None => true,
        };

        let store_backend = match var("PAYMENTS_STORE_BACKEND") {
            Some(v) => StoreBackend::parse(&v)
                .ok_or(ConfigError::InvalidValue("PAYMENTS_STORE_BACKEND", v))?,
            None => StoreBackend::default(),
        };
        let database_url = var("DATABASE_URL");
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingVar("DATABASE_URL"));
        }

        let rates_version =
            var("EXCHANGE_RATES_VERSION").unwrap_or_else(|| DEFAULT_RATES_VERSION.to_string());
        let exchange_rates = match var("EXCHANGE_RATES") {
            Some(json) => ExchangeRates::from_json(rates_version, &json)
                .map_err(|e| ConfigError::InvalidValue("EXCHANGE_RATES", e.to_string()))?,
            None => ExchangeRates::default().with_version(rates_version),
        };

        Ok(Self {
            webhook_secret: var("STRIPE_WEBHOOK_SECRET"),
            secret_key: var("STRIPE_SECRET_KEY"),
            allow_unverified_succeeded,
            store_backend,
            database_url,
            exchange_rates,
            fanout_url: var("WEBHOOK_FANOUT_URL"),
            fanout_token: var("WEBHOOK_FANOUT_TOKEN"),
            frontend_url: var("FRONTEND_URL").unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string()),
            mail: mail_config(&var)?,
        })
    }
}

fn mail_config(var: &impl Fn(&str) -> Option<String>) -> Result<Option<MailConfig>, ConfigError> {
    let Some(provider) = var("MAIL_PROVIDER") else {
        return Ok(None);
    };

    let provider = match provider.to_lowercase().as_str() {
        "smtp" => MailProviderType::Smtp,
        "sendgrid" => MailProviderType::Sendgrid,
        other => return Err(ConfigError::InvalidValue("MAIL_PROVIDER", other.to_string())),
    };

    let smtp = if provider == MailProviderType::Smtp {
        let port = match var("SMTP_PORT") {
            Some(p) => p
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidValue("SMTP_PORT", p))?,
            None => 587,
        };
        Some(SmtpSettings {
            host: var("SMTP_HOST").ok_or(ConfigError::MissingVar("SMTP_HOST"))?,
            port,
            username: var("SMTP_USERNAME").ok_or(ConfigError::MissingVar("SMTP_USERNAME"))?,
            password: var("SMTP_PASSWORD").ok_or(ConfigError::MissingVar("SMTP_PASSWORD"))?,
        })
    } else {
        None
    };

    let sendgrid = if provider == MailProviderType::Sendgrid {
        Some(SendgridSettings {
            api_key: var("SENDGRID_API_KEY").ok_or(ConfigError::MissingVar("SENDGRID_API_KEY"))?,
        })
    } else {
        None
    };

    Ok(Some(MailConfig {
        provider,
        from_email: var("MAIL_FROM_EMAIL").unwrap_or_else(|| "noreply@kambafy.com".to_string()),
        from_name: var("MAIL_FROM_NAME").unwrap_or_else(|| "Kambafy".to_string()),
        smtp,
        sendgrid,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<PaymentsConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PaymentsConfig::from_vars(move |name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults_with_memory_backend() {
        let cfg = config(&[("PAYMENTS_STORE_BACKEND", "memory")]).unwrap();
        assert_eq!(cfg.store_backend, StoreBackend::Memory);
        assert!(cfg.webhook_secret.is_none());
        assert!(cfg.allow_unverified_succeeded);
        assert_eq!(cfg.frontend_url, DEFAULT_FRONTEND_URL);
        assert_eq!(cfg.exchange_rates.version, "builtin-v1");
        assert_eq!(cfg.exchange_rates.rate("EUR"), Some(1100.0));
        assert!(cfg.mail.is_none());
    }

    #[test]
    fn test_postgres_requires_database_url() {
        assert_eq!(
            config(&[]).unwrap_err(),
            ConfigError::MissingVar("DATABASE_URL")
        );
        let cfg = config(&[("DATABASE_URL", "postgres://localhost/kambafy")]).unwrap();
        assert_eq!(cfg.store_backend, StoreBackend::Postgres);
    }

    #[test]
    fn test_rate_override_and_bypass_toggle() {
        let cfg = config(&[
            ("PAYMENTS_STORE_BACKEND", "memory"),
            ("EXCHANGE_RATES", r#"{"EUR": 1200}"#),
            ("EXCHANGE_RATES_VERSION", "2026-10"),
            ("STRIPE_ALLOW_UNVERIFIED_SUCCEEDED", "false"),
        ])
        .unwrap();
        assert_eq!(cfg.exchange_rates.rate("EUR"), Some(1200.0));
        assert_eq!(cfg.exchange_rates.rate("USD"), None);
        assert_eq!(cfg.exchange_rates.version, "2026-10");
        assert!(!cfg.allow_unverified_succeeded);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config(&[("PAYMENTS_STORE_BACKEND", "memory"), ("EXCHANGE_RATES", r#"{"EUR": -1}"#)]),
            Err(ConfigError::InvalidValue("EXCHANGE_RATES", _))
        ));
        assert_eq!(
            config(&[("PAYMENTS_STORE_BACKEND", "mysql")]).unwrap_err(),
            ConfigError::InvalidValue("PAYMENTS_STORE_BACKEND", "mysql".to_string())
        );
        assert!(matches!(
            config(&[
                ("PAYMENTS_STORE_BACKEND", "memory"),
                ("STRIPE_ALLOW_UNVERIFIED_SUCCEEDED", "maybe")
            ]),
            Err(ConfigError::InvalidValue("STRIPE_ALLOW_UNVERIFIED_SUCCEEDED", _))
        ));
    }

    #[test]
    fn test_mail_provider_settings() {
        let cfg = config(&[
            ("PAYMENTS_STORE_BACKEND", "memory"),
            ("MAIL_PROVIDER", "sendgrid"),
            ("SENDGRID_API_KEY", "SG.key"),
        ])
        .unwrap();
        let mail = cfg.mail.unwrap();
        assert_eq!(mail.provider, MailProviderType::Sendgrid);
        assert_eq!(mail.from_email, "noreply@kambafy.com");
        assert_eq!(mail.sendgrid.unwrap().api_key, "SG.key");

        assert_eq!(
            config(&[("PAYMENTS_STORE_BACKEND", "memory"), ("MAIL_PROVIDER", "smtp")]).unwrap_err(),
            ConfigError::MissingVar("SMTP_HOST")
        );
    }
}
