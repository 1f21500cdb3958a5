use anyhow::{Result, anyhow};
use reqwest::Client;
use serde::Serialize;

use super::{EmailMessage, MailClient, MailConfig, SendgridSettings};

const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

pub struct SendgridMailClient {
    client: Client,
    api_key: String,
    from_email: String,
    from_name: String,
}

#[derive(Serialize)]
struct SendgridEmail<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: EmailAddress<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Personalization<'a> {
    to: Vec<EmailAddress<'a>>,
}

#[derive(Serialize)]
struct EmailAddress<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'static str,
    value: &'a str,
}

impl SendgridMailClient {
    pub fn new(config: &MailConfig, sendgrid: &SendgridSettings) -> Self {
        Self {
            client: Client::new(),
            api_key: sendgrid.api_key.clone(),
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
        }
    }
}

#[async_trait::async_trait]
impl MailClient for SendgridMailClient {
    async fn send(&self, message: EmailMessage) -> Result<()> {
        // text/plain must come first per the Sendgrid API
        let mut content = Vec::new();
        if let Some(text) = &message.body_text {
            content.push(Content {
                content_type: "text/plain",
                value: text,
            });
        }
        if let Some(html) = &message.body_html {
            content.push(Content {
                content_type: "text/html",
                value: html,
            });
        }
        if content.is_empty() {
            return Err(anyhow!("Email must have either HTML or text body"));
        }

        let email = SendgridEmail {
            personalizations: vec![Personalization {
                to: vec![EmailAddress {
                    email: &message.to,
                    name: None,
                }],
            }],
            from: EmailAddress {
                email: &self.from_email,
                name: Some(&self.from_name),
            },
            subject: &message.subject,
            content,
        };

        let response = self
            .client
            .post(SENDGRID_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&email)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to send email via Sendgrid: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Sendgrid API error: {} - {}", status, body));
        }

        Ok(())
    }

    fn from_email(&self) -> &str {
        &self.from_email
    }

    fn from_name(&self) -> &str {
        &self.from_name
    }
}
