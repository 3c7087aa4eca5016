//! Delivery channels and their transports.
//!
//! # Transport Architecture
//!
//! Every channel is delivered through an implementation of `ChannelTransport`:
//!
//! - `EmailTransport`: SMTP delivery through `lettre`
//! - `WhatsAppTransport`: WhatsApp Business Cloud API text messages
//!
//! Network transports share `guarded_send`, which rejects empty destinations
//! before any network activity and bounds the provider call with a timeout.
//! Transports keep no state between calls.
//!
//! Use `create_transports()` to build the configured set from settings.

pub mod email;
mod factory;
pub mod whatsapp;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metrics::TransportMetrics;
use crate::template::RenderedMessage;

pub use email::EmailTransport;
pub use factory::create_transports;
pub use whatsapp::WhatsAppTransport;

/// Default upper bound for a single provider call
pub const DEFAULT_TRANSPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivery medium
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    /// Chat messaging (WhatsApp)
    #[serde(alias = "whatsapp")]
    Chat,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Email, Channel::Chat];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Chat => "chat",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which channels a dispatch attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelPolicy {
    #[default]
    #[serde(rename = "email", alias = "email_only")]
    EmailOnly,
    #[serde(rename = "chat", alias = "whatsapp", alias = "chat_only")]
    ChatOnly,
    #[serde(rename = "both")]
    Both,
}

impl ChannelPolicy {
    /// Channels to attempt, in order.
    ///
    /// `order` only matters for `Both`. Channels it leaves out are appended in
    /// their default order so both are always attempted.
    pub fn channels(&self, order: &[Channel]) -> Vec<Channel> {
        match self {
            ChannelPolicy::EmailOnly => vec![Channel::Email],
            ChannelPolicy::ChatOnly => vec![Channel::Chat],
            ChannelPolicy::Both => {
                let mut channels = Vec::with_capacity(Channel::ALL.len());
                for channel in order.iter().chain(Channel::ALL.iter()) {
                    if !channels.contains(channel) {
                        channels.push(*channel);
                    }
                }
                channels
            }
        }
    }
}

/// Errors reported by a channel transport.
///
/// Every variant maps to a `Failed` attempt except `MissingDestination`,
/// which the orchestrator never lets reach a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("No destination address")]
    MissingDestination,

    #[error("Invalid destination address: {0}")]
    InvalidDestination(String),

    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Provider returned status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Transport misconfigured: {0}")]
    Build(String),
}

impl TransportError {
    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::MissingDestination => "missing_destination",
            TransportError::InvalidDestination(_) => "invalid_destination",
            TransportError::Timeout(_) => "timeout",
            TransportError::Request(_) => "request",
            TransportError::Rejected { .. } => "rejected",
            TransportError::Build(_) => "build",
        }
    }
}

/// Capability shared by all channel transports.
///
/// Implementations must be stateless between calls and safe to use
/// concurrently for different destinations.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// The channel this transport delivers on
    fn channel(&self) -> Channel;

    /// Deliver `message` to `destination`.
    ///
    /// `Ok(())` means the provider accepted the message.
    async fn send(&self, destination: &str, message: &RenderedMessage) -> Result<(), TransportError>;
}

/// Run a provider call with the checks every network transport needs
pub(crate) async fn guarded_send<F, Fut>(
    channel: Channel,
    timeout: Duration,
    destination: &str,
    call: F,
) -> Result<(), TransportError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), TransportError>>,
{
    if destination.trim().is_empty() {
        return Err(TransportError::MissingDestination);
    }

    let started = Instant::now();
    let result = match tokio::time::timeout(timeout, call()).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(timeout)),
    };
    TransportMetrics::record_latency(channel.as_str(), started.elapsed());
    if let Err(e) = &result {
        TransportMetrics::record_error(channel.as_str(), e.kind());
    }

    result
}

/// Transports registered per channel
#[derive(Clone, Default)]
pub struct TransportSet {
    transports: HashMap<Channel, Arc<dyn ChannelTransport>>,
}

impl TransportSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport under its own channel, replacing any previous one
    pub fn register(&mut self, transport: Arc<dyn ChannelTransport>) {
        self.transports.insert(transport.channel(), transport);
    }

    /// Builder-style `register`
    pub fn with(mut self, transport: Arc<dyn ChannelTransport>) -> Self {
        self.register(transport);
        self
    }

    pub fn get(&self, channel: Channel) -> Option<Arc<dyn ChannelTransport>> {
        self.transports.get(&channel).cloned()
    }

    pub fn contains(&self, channel: Channel) -> bool {
        self.transports.contains_key(&channel)
    }

    pub fn channels(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|c| self.transports.contains_key(c))
            .collect()
    }
}

impl fmt::Debug for TransportSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSet")
            .field("channels", &self.channels())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_channels() {
        let order = [Channel::Email, Channel::Chat];
        assert_eq!(ChannelPolicy::EmailOnly.channels(&order), vec![Channel::Email]);
        assert_eq!(ChannelPolicy::ChatOnly.channels(&order), vec![Channel::Chat]);
        assert_eq!(
            ChannelPolicy::Both.channels(&order),
            vec![Channel::Email, Channel::Chat]
        );
    }

    #[test]
    fn test_both_respects_configured_order() {
        assert_eq!(
            ChannelPolicy::Both.channels(&[Channel::Chat, Channel::Email]),
            vec![Channel::Chat, Channel::Email]
        );
        // Missing or duplicated entries still yield each channel once
        assert_eq!(
            ChannelPolicy::Both.channels(&[Channel::Chat, Channel::Chat]),
            vec![Channel::Chat, Channel::Email]
        );
        assert_eq!(
            ChannelPolicy::Both.channels(&[]),
            vec![Channel::Email, Channel::Chat]
        );
    }

    #[test]
    fn test_policy_deserialize_aliases() {
        let policy: ChannelPolicy = serde_json::from_str("\"whatsapp\"").unwrap();
        assert_eq!(policy, ChannelPolicy::ChatOnly);
        let policy: ChannelPolicy = serde_json::from_str("\"both\"").unwrap();
        assert_eq!(policy, ChannelPolicy::Both);
        let policy: ChannelPolicy = serde_json::from_str("\"email\"").unwrap();
        assert_eq!(policy, ChannelPolicy::EmailOnly);
    }

    #[test]
    fn test_channel_serde() {
        assert_eq!(serde_json::to_string(&Channel::Chat).unwrap(), "\"chat\"");
        let channel: Channel = serde_json::from_str("\"whatsapp\"").unwrap();
        assert_eq!(channel, Channel::Chat);
    }

    #[tokio::test]
    async fn test_guarded_send_rejects_empty_destination_without_calling() {
        let result = guarded_send(Channel::Chat, DEFAULT_TRANSPORT_TIMEOUT, " ", || async {
            Err(TransportError::Request("provider must not be called".to_string()))
        })
        .await;

        assert!(matches!(result, Err(TransportError::MissingDestination)));
    }

    #[tokio::test]
    async fn test_guarded_send_times_out() {
        let result = guarded_send(
            Channel::Chat,
            Duration::from_millis(20),
            "+15551234567",
            || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;

        assert!(matches!(result, Err(TransportError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_guarded_send_keeps_no_state_between_calls() {
        let calls = std::sync::atomic::AtomicUsize::new(0);

        for _ in 0..10 {
            let result = guarded_send(Channel::Chat, DEFAULT_TRANSPORT_TIMEOUT, "+15551234567", || async {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Err(TransportError::Rejected {
                    status: 500,
                    body: "unavailable".to_string(),
                })
            })
            .await;
            assert!(matches!(result, Err(TransportError::Rejected { status: 500, .. })));
        }

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 10);
    }
}
