use lettre::message::MultiPart;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::Config;
use crate::error::Error;

/// What the SMTP server said when it accepted the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub server_response: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Mailer: Send + Sync + 'static {
    /// Sends the report as a multipart message: plain-text fallback first,
    /// HTML alternative second.
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        html_body: &str,
        text_fallback: &str,
    ) -> Result<DeliveryReceipt, Error>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?.port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(SmtpMailer {
            transport: builder.build(),
            from: config.sender.clone(),
        })
    }
}

#[async_trait::async_trait]
impl Mailer for SmtpMailer {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        html_body: &str,
        text_fallback: &str,
    ) -> Result<DeliveryReceipt, Error> {
        let email = Message::builder()
            .from(self.from.parse()?)
            .to(recipient.parse()?)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(
                text_fallback.to_string(),
                html_body.to_string(),
            ))?;

        let response = self.transport.send(email).await?;
        Ok(DeliveryReceipt {
            server_response: response.message().collect::<Vec<_>>().join(" "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_accepts_config_without_credentials() {
        // The transport must be built and dropped inside a runtime.
        let config = Config::for_tests();
        assert!(SmtpMailer::new(&config).is_ok());
    }

    #[tokio::test]
    async fn test_send_rejects_invalid_recipient() {
        let config = Config::for_tests();
        let mailer = SmtpMailer::new(&config).unwrap();
        let result = mailer.send("not-an-address", "subject", "<p>hi</p>", "hi").await;
        assert!(matches!(result.unwrap_err(), Error::Address(_)));
    }
}
