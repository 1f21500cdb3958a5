//! Best-effort downstream effects of a reconciled payment: emails and seller webhooks.

mod credential;
mod fanout;

pub use credential::{generate_temporary_password, hash_credential};
pub use fanout::{
    DisabledWebhookFanout, DynWebhookFanout, HttpWebhookFanout, OutboundEvent, WebhookDelivery,
    WebhookFanout,
};

use anyhow::Result;

use crate::mail::{DynMailClient, EmailMessage, templates};

pub fn format_amount(amount: f64, currency: &str) -> String {
    if amount.fract() == 0.0 {
        format!("{:.0} {}", amount, currency)
    } else {
        format!("{:.2} {}", amount, currency)
    }
}

#[derive(Clone, Debug)]
pub struct PurchaseConfirmation {
    pub order_id: String,
    pub customer_email: String,
    pub customer_name: String,
    pub product_name: String,
    /// Amount the buyer saw, before settlement conversion
    pub amount: f64,
    pub currency: String,
    pub seller_email: Option<String>,
    pub seller_name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AccessGrant {
    pub student_email: String,
    pub student_name: String,
    pub area_name: String,
    pub area_url: String,
    pub seller_name: String,
    pub temporary_password: String,
}

#[derive(Clone, Debug)]
pub struct PaymentInstructions {
    pub customer_email: String,
    pub customer_name: String,
    pub product_name: String,
    pub entity: String,
    pub reference: String,
    pub amount: f64,
    pub currency: String,
    pub voucher_url: Option<String>,
}

/// Renders and sends transactional emails. Without a mail client every send is skipped.
#[derive(Clone)]
pub struct Notifier {
    mail: Option<DynMailClient>,
}

impl Notifier {
    pub fn new(mail: Option<DynMailClient>) -> Self {
        Self { mail }
    }

    async fn deliver(&self, message: EmailMessage) -> Result<()> {
        let Some(mail) = &self.mail else {
            tracing::debug!(to = %message.to, subject = %message.subject, "Mail not configured, skipping");
            return Ok(());
        };
        mail.send(message).await
    }

    /// Customer receipt, plus a sale notice to the seller when their address is known.
    pub async fn purchase_confirmation(&self, confirmation: &PurchaseConfirmation) -> Result<()> {
        let amount_display = format_amount(confirmation.amount, &confirmation.currency);

        let (html, text) = templates::purchase_confirmation(
            &confirmation.customer_name,
            &confirmation.product_name,
            &confirmation.order_id,
            &amount_display,
        );
        self.deliver(EmailMessage {
            to: confirmation.customer_email.clone(),
            subject: format!("Compra confirmada: {}", confirmation.product_name),
            body_html: Some(html),
            body_text: Some(text),
        })
        .await?;

        if let Some(seller_email) = &confirmation.seller_email {
            let seller_name = confirmation.seller_name.as_deref().unwrap_or("Vendedor");
            let (html, text) = templates::seller_sale_notification(
                seller_name,
                &confirmation.product_name,
                &confirmation.customer_name,
                &confirmation.order_id,
                &amount_display,
            );
            self.deliver(EmailMessage {
                to: seller_email.clone(),
                subject: format!("Nova venda: {}", confirmation.product_name),
                body_html: Some(html),
                body_text: Some(text),
            })
            .await?;
        }

        Ok(())
    }

    pub async fn access_granted(&self, grant: &AccessGrant) -> Result<()> {
        let (html, text) = templates::access_granted(
            &grant.student_name,
            &grant.area_name,
            &grant.area_url,
            &grant.student_email,
            &grant.temporary_password,
            &grant.seller_name,
        );
        self.deliver(EmailMessage {
            to: grant.student_email.clone(),
            subject: format!("Acesso liberado: {}", grant.area_name),
            body_html: Some(html),
            body_text: Some(text),
        })
        .await
    }

    pub async fn payment_instructions(&self, instructions: &PaymentInstructions) -> Result<()> {
        let (html, text) = templates::payment_instructions(
            &instructions.customer_name,
            &instructions.product_name,
            &instructions.entity,
            &instructions.reference,
            &format_amount(instructions.amount, &instructions.currency),
            instructions.voucher_url.as_deref(),
        );
        self.deliver(EmailMessage {
            to: instructions.customer_email.clone(),
            subject: format!("Instruções de pagamento: {}", instructions.product_name),
            body_html: Some(html),
            body_text: Some(text),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingMailClient;
    use std::sync::Arc;

    fn confirmation(seller_email: Option<&str>) -> PurchaseConfirmation {
        PurchaseConfirmation {
            order_id: "O1".into(),
            customer_email: "buyer@example.com".into(),
            customer_name: "Buyer".into(),
            product_name: "Curso".into(),
            amount: 50.0,
            currency: "EUR".into(),
            seller_email: seller_email.map(str::to_string),
            seller_name: Some("Seller".into()),
        }
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(5000.0, "KZ"), "5000 KZ");
        assert_eq!(format_amount(25.5, "EUR"), "25.50 EUR");
    }

    #[tokio::test]
    async fn test_confirmation_reaches_customer_and_seller() {
        let mail = Arc::new(RecordingMailClient::default());
        let notifier = Notifier::new(Some(mail.clone()));

        notifier
            .purchase_confirmation(&confirmation(Some("seller@example.com")))
            .await
            .unwrap();

        let sent = mail.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "buyer@example.com");
        assert!(sent[0].body_text.as_deref().unwrap().contains("50 EUR"));
        assert_eq!(sent[1].to, "seller@example.com");
    }

    #[tokio::test]
    async fn test_confirmation_without_seller_email() {
        let mail = Arc::new(RecordingMailClient::default());
        let notifier = Notifier::new(Some(mail.clone()));

        notifier.purchase_confirmation(&confirmation(None)).await.unwrap();
        assert_eq!(mail.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_mail_client_is_a_noop() {
        let notifier = Notifier::new(None);
        assert!(notifier.purchase_confirmation(&confirmation(None)).await.is_ok());
    }
}
