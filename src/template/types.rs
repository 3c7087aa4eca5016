//! Template types and error definitions

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::Channel;

use super::substitution::{record_attribute_names, resolve};

/// Placeholder token -> value mapping used for rendering
pub type Placeholders = serde_json::Map<String, serde_json::Value>;

/// The plaintext one-time code
pub const PLACEHOLDER_OTP: &str = "{OTP}";
/// Identifier of the OTP record
pub const PLACEHOLDER_OTP_ID: &str = "{OTP_ID}";
pub const PLACEHOLDER_APP_NAME: &str = "{APP_NAME}";
pub const PLACEHOLDER_APP_URL: &str = "{APP_URL}";
pub const PLACEHOLDER_RECORD_ID: &str = "{RECORD_ID}";
pub const PLACEHOLDER_RECORD_EMAIL: &str = "{RECORD_EMAIL}";
/// Only injected for the chat channel
pub const PLACEHOLDER_RECORD_PHONE: &str = "{RECORD_PHONE}";
/// Prefix of `{RECORD:<attribute>}` tokens
pub const RECORD_ATTRIBUTE_PREFIX: &str = "{RECORD:";

/// Template-specific error type
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("No template configured for channel {0}")]
    Missing(Channel),

    #[error("Invalid template for channel {channel}: {reason}")]
    Invalid { channel: Channel, reason: String },
}

/// Result type for template operations
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Operator-authored message template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate {
    /// Subject line, only used by channels that have one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Message body with placeholder tokens
    pub body: String,
}

impl MessageTemplate {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            subject: None,
            body: body.into(),
        }
    }

    pub fn with_subject(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            body: body.into(),
        }
    }

    /// Validate the template for use on `channel`
    pub fn validate(&self, channel: Channel) -> TemplateResult<()> {
        if self.body.trim().is_empty() {
            return Err(TemplateError::Invalid {
                channel,
                reason: "body must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Attribute names referenced via `{RECORD:<name>}` in subject or body
    pub fn record_attributes(&self) -> Vec<String> {
        let mut names = record_attribute_names(&self.body);
        if let Some(subject) = &self.subject {
            for name in record_attribute_names(subject) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Render subject and body with the same placeholder mapping
    pub fn render(&self, placeholders: &Placeholders) -> RenderedMessage {
        RenderedMessage {
            subject: self.subject.as_deref().map(|s| resolve(s, placeholders)),
            body: resolve(&self.body, placeholders),
        }
    }
}

/// A template after placeholder substitution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: Option<String>,
    pub body: String,
}

impl RenderedMessage {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            subject: None,
            body: body.into(),
        }
    }
}

/// Templates keyed by the channel they render for
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelTemplates {
    templates: HashMap<Channel, MessageTemplate>,
}

impl ChannelTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, channel: Channel, template: MessageTemplate) -> Self {
        self.templates.insert(channel, template);
        self
    }

    pub fn insert(&mut self, channel: Channel, template: MessageTemplate) {
        self.templates.insert(channel, template);
    }

    pub fn get(&self, channel: Channel) -> TemplateResult<&MessageTemplate> {
        self.templates
            .get(&channel)
            .ok_or(TemplateError::Missing(channel))
    }

    /// Get and validate the template for a channel
    pub fn validated(&self, channel: Channel) -> TemplateResult<&MessageTemplate> {
        let template = self.get(channel)?;
        template.validate(channel)?;
        Ok(template)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
