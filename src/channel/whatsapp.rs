//! WhatsApp Business Cloud API transport.
//!
//! Sends plain text messages:
//!
//! ```text
//! POST {api_url}/{phone_number_id}/messages
//! Authorization: Bearer {access_token}
//!
//! {"messaging_product":"whatsapp","to":"+15551234567","type":"text","text":{"body":"..."}}
//! ```
//!
//! Only HTTP 200 counts as accepted.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::WhatsAppConfig;
use crate::template::RenderedMessage;

use super::{
    guarded_send, Channel, ChannelTransport, TransportError,
};

const MESSAGING_PRODUCT: &str = "whatsapp";

/// Longest provider response body kept in a diagnostic
const MAX_ERROR_BODY: usize = 512;

/// Text message request body
#[derive(Debug, Serialize)]
pub struct WhatsAppMessage<'a> {
    pub messaging_product: &'a str,
    pub to: &'a str,
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub text: WhatsAppText<'a>,
}

#[derive(Debug, Serialize)]
pub struct WhatsAppText<'a> {
    pub body: &'a str,
}

impl<'a> WhatsAppMessage<'a> {
    pub fn text(to: &'a str, body: &'a str) -> Self {
        Self {
            messaging_product: MESSAGING_PRODUCT,
            to,
            kind: "text",
            text: WhatsAppText { body },
        }
    }
}

/// Accepted-message response, only read for logging
#[derive(Debug, Default, Deserialize)]
struct WhatsAppResponse {
    #[serde(default)]
    messages: Vec<WhatsAppMessageId>,
}

#[derive(Debug, Deserialize)]
struct WhatsAppMessageId {
    id: String,
}

/// Chat channel transport backed by the WhatsApp Business Cloud API
pub struct WhatsAppTransport {
    client: Client,
    config: WhatsAppConfig,
    timeout: Duration,
}

impl WhatsAppTransport {
    pub fn new(
        config: WhatsAppConfig,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        if config.access_token.is_empty() || config.phone_number_id.is_empty() {
            return Err(TransportError::Build(
                "access_token and phone_number_id are required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;

        Ok(Self {
            client,
            config,
            timeout,
        })
    }

    /// Messages endpoint for the configured sender number
    pub fn messages_url(&self) -> String {
        format!(
            "{}/{}/messages",
            self.config.api_url.trim_end_matches('/'),
            self.config.phone_number_id
        )
    }

    async fn post_message(&self, to: &str, body: &str) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.messages_url())
            .bearer_auth(&self.config.access_token)
            .json(&WhatsAppMessage::text(to, body))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(self.timeout)
                } else {
                    TransportError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let accepted: WhatsAppResponse = response.json().await.unwrap_or_default();
        tracing::debug!(
            message_ids = ?accepted.messages.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            "WhatsApp message accepted"
        );

        Ok(())
    }
}

#[async_trait]
impl ChannelTransport for WhatsAppTransport {
    fn channel(&self) -> Channel {
        Channel::Chat
    }

    async fn send(&self, destination: &str, message: &RenderedMessage) -> Result<(), TransportError> {
        guarded_send(Channel::Chat, self.timeout, destination, || {
            self.post_message(destination, &message.body)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transport(api_url: &str) -> WhatsAppTransport {
        let mut config = WhatsAppConfig::new("token", "1234567890");
        config.api_url = api_url.to_string();
        WhatsAppTransport::new(config, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_payload_shape() {
        let payload = serde_json::to_value(WhatsAppMessage::text("+15551234567", "Code: 123456")).unwrap();
        assert_eq!(
            payload,
            json!({
                "messaging_product": "whatsapp",
                "to": "+15551234567",
                "type": "text",
                "text": { "body": "Code: 123456" }
            })
        );
    }

    #[test]
    fn test_messages_url() {
        assert_eq!(
            transport("https://graph.facebook.com/v18.0/").messages_url(),
            "https://graph.facebook.com/v18.0/1234567890/messages"
        );
    }

    #[test]
    fn test_requires_credentials() {
        let config = WhatsAppConfig::new("", "123");
        assert!(matches!(
            WhatsAppTransport::new(config, Duration::from_secs(1)),
            Err(TransportError::Build(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_destination_fails_before_network() {
        // Unroutable URL: any network attempt would surface as a request error
        let transport = transport("http://127.0.0.1:9");
        let result = transport.send("", &RenderedMessage::text("hi")).await;
        assert!(matches!(result, Err(TransportError::MissingDestination)));
    }
}
