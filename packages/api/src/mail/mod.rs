use std::sync::Arc;

use anyhow::Result;

#[cfg(feature = "sendgrid")]
mod sendgrid;
#[cfg(feature = "smtp")]
mod smtp;
pub mod templates;

#[cfg(feature = "sendgrid")]
pub use sendgrid::SendgridMailClient;
#[cfg(feature = "smtp")]
pub use smtp::SmtpMailClient;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MailProviderType {
    Smtp,
    Sendgrid,
}

#[derive(Clone, Debug)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct SendgridSettings {
    pub api_key: String,
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub provider: MailProviderType,
    pub from_email: String,
    pub from_name: String,
    pub smtp: Option<SmtpSettings>,
    pub sendgrid: Option<SendgridSettings>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body_html: Option<String>,
    pub body_text: Option<String>,
}

#[async_trait::async_trait]
pub trait MailClient: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<()>;
    fn from_email(&self) -> &str;
    fn from_name(&self) -> &str;
}

pub type DynMailClient = Arc<dyn MailClient>;

pub fn create_mail_client(config: &MailConfig) -> Result<DynMailClient> {
    match config.provider {
        MailProviderType::Smtp => {
            #[cfg(feature = "smtp")]
            {
                let smtp_settings = config
                    .smtp
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("SMTP settings required for SMTP provider"))?;
                let client = SmtpMailClient::new(config, smtp_settings)?;
                Ok(Arc::new(client))
            }
            #[cfg(not(feature = "smtp"))]
            {
                Err(anyhow::anyhow!("SMTP feature not enabled"))
            }
        }
        MailProviderType::Sendgrid => {
            #[cfg(feature = "sendgrid")]
            {
                let sendgrid_settings = config.sendgrid.as_ref().ok_or_else(|| {
                    anyhow::anyhow!("Sendgrid settings required for Sendgrid provider")
                })?;
                let client = SendgridMailClient::new(config, sendgrid_settings);
                Ok(Arc::new(client))
            }
            #[cfg(not(feature = "sendgrid"))]
            {
                Err(anyhow::anyhow!("Sendgrid feature not enabled"))
            }
        }
    }
}
