//! SMTP email transport

use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    address::AddressError,
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::SmtpConfig;
use crate::template::RenderedMessage;

use super::{
    guarded_send, Channel, ChannelTransport, TransportError,
};

/// Email channel transport sending plain-text mail over SMTP
pub struct EmailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    /// Used when the rendered template has no subject
    default_subject: String,
    timeout: Duration,
}

impl EmailTransport {
    pub fn new(
        config: &SmtpConfig,
        app_name: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let builder = if config.tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| TransportError::Build(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let mut builder = builder.port(config.port).timeout(Some(timeout));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let address = config
            .sender_address
            .parse()
            .map_err(|e: AddressError| TransportError::Build(format!("sender address: {}", e)))?;
        let sender = Mailbox::new(config.sender_name.clone(), address);

        Ok(Self {
            mailer: builder.build(),
            sender,
            default_subject: format!("{} OTP", app_name),
            timeout,
        })
    }

    /// Build the outgoing message for `destination`
    pub fn build_message(
        &self,
        destination: &str,
        message: &RenderedMessage,
    ) -> Result<Message, TransportError> {
        let to: Mailbox = destination
            .trim()
            .parse()
            .map_err(|e: AddressError| TransportError::InvalidDestination(e.to_string()))?;

        let subject = message
            .subject
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.default_subject);

        Message::builder()
            .from(self.sender.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| TransportError::Build(e.to_string()))
    }

    async fn deliver(&self, email: Message) -> Result<(), TransportError> {
        let response = self
            .mailer
            .send(email)
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        if !response.is_positive() {
            return Err(TransportError::Rejected {
                status: response.code().to_string().parse().unwrap_or_default(),
                body: response.message().collect::<Vec<_>>().join(" "),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl ChannelTransport for EmailTransport {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, destination: &str, message: &RenderedMessage) -> Result<(), TransportError> {
        if destination.trim().is_empty() {
            return Err(TransportError::MissingDestination);
        }
        let email = self.build_message(destination, message)?;

        guarded_send(Channel::Email, self.timeout, destination, || {
            self.deliver(email)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smtp_config() -> SmtpConfig {
        SmtpConfig {
            host: "localhost".to_string(),
            port: 2525,
            username: None,
            password: None,
            sender_address: "noreply@example.com".to_string(),
            sender_name: Some("Acme".to_string()),
            tls: false,
        }
    }

    fn transport() -> EmailTransport {
        EmailTransport::new(&smtp_config(), "Acme", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_build_message_uses_rendered_subject() {
        let transport = transport();
        let message = RenderedMessage {
            subject: Some("Your login code".to_string()),
            body: "Code: 123456".to_string(),
        };

        let email = transport.build_message("user@example.com", &message).unwrap();
        let raw = String::from_utf8(email.formatted()).unwrap();
        assert!(raw.contains("Subject: Your login code"));
        assert!(raw.contains("To: user@example.com"));
        assert!(raw.contains("Code: 123456"));
    }

    #[tokio::test]
    async fn test_build_message_falls_back_to_default_subject() {
        let transport = transport();
        let email = transport
            .build_message("user@example.com", &RenderedMessage::text("Code: 1"))
            .unwrap();
        let raw = String::from_utf8(email.formatted()).unwrap();
        assert!(raw.contains("Subject: Acme OTP"));
    }

    #[tokio::test]
    async fn test_invalid_destination() {
        let transport = transport();
        let result = transport
            .send("not-an-address", &RenderedMessage::text("Code: 1"))
            .await;
        assert!(matches!(result, Err(TransportError::InvalidDestination(_))));
    }

    #[tokio::test]
    async fn test_missing_destination() {
        let transport = transport();
        let result = transport.send("  ", &RenderedMessage::text("Code: 1")).await;
        assert!(matches!(result, Err(TransportError::MissingDestination)));
    }

    #[test]
    fn test_invalid_sender_is_build_error() {
        let mut config = smtp_config();
        config.sender_address = "broken".to_string();
        assert!(matches!(
            EmailTransport::new(&config, "Acme", Duration::from_secs(1)),
            Err(TransportError::Build(_))
        ));
    }
}
