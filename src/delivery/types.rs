use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::channel::{Channel, ChannelPolicy};
use crate::error::BookkeepingFailure;
use crate::otp::TargetRecord;
use crate::template::ChannelTemplates;

/// Skip reason for a channel whose destination attribute is empty
pub const SKIP_NO_DESTINATION: &str = "no destination attribute";
/// Skip reason for channels not started before cancellation
pub const SKIP_CANCELLED: &str = "dispatch cancelled";

/// Everything a single dispatch needs, built fresh by the caller
#[derive(Clone)]
pub struct OtpContext {
    /// Identifier of a previously created OTP record
    pub otp_id: String,
    /// Plaintext code embedded in the message, never persisted
    pub secret: String,
    /// Identity record the OTP belongs to
    pub target: Arc<dyn TargetRecord>,
    pub policy: ChannelPolicy,
    pub templates: ChannelTemplates,
}

impl OtpContext {
    pub fn new(
        otp_id: impl Into<String>,
        secret: impl Into<String>,
        target: impl TargetRecord + 'static,
        policy: ChannelPolicy,
        templates: ChannelTemplates,
    ) -> Self {
        Self {
            otp_id: otp_id.into(),
            secret: secret.into(),
            target: Arc::new(target),
            policy,
            templates,
        }
    }
}

impl fmt::Debug for OtpContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtpContext")
            .field("otp_id", &self.otp_id)
            .field("secret", &"<redacted>")
            .field("target", &self.target.identifier())
            .field("policy", &self.policy)
            .field("templates", &self.templates.len())
            .finish()
    }
}

/// Result of a single channel attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    /// Provider accepted the message
    Sent,
    /// Provider rejected the message, or the call failed or timed out
    Failed,
    /// Channel not attempted
    Skipped,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Sent => "sent",
            AttemptOutcome::Failed => "failed",
            AttemptOutcome::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelAttempt {
    pub channel: Channel,
    /// Empty when the channel was skipped for lack of a destination
    pub destination: String,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// Set when the send succeeded but recording it did not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookkeeping: Option<BookkeepingFailure>,
}

impl ChannelAttempt {
    pub fn sent(channel: Channel, destination: impl Into<String>) -> Self {
        Self {
            channel,
            destination: destination.into(),
            outcome: AttemptOutcome::Sent,
            error_detail: None,
            bookkeeping: None,
        }
    }

    pub fn failed(channel: Channel, destination: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            channel,
            destination: destination.into(),
            outcome: AttemptOutcome::Failed,
            error_detail: Some(detail.into()),
            bookkeeping: None,
        }
    }

    pub fn skipped(channel: Channel, destination: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            channel,
            destination: destination.into(),
            outcome: AttemptOutcome::Skipped,
            error_detail: Some(reason.into()),
            bookkeeping: None,
        }
    }

    pub fn is_sent(&self) -> bool {
        self.outcome == AttemptOutcome::Sent
    }
}

/// Result of a dispatch
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryOutcome {
    /// Correlates the log lines of one dispatch
    pub dispatch_id: Uuid,
    pub otp_id: String,
    /// Per-channel results in attempt order
    pub attempts: Vec<ChannelAttempt>,
    /// Destination persisted as `sent_to`, empty if none was recorded
    pub recorded_sent_to: String,
    pub completed_at: DateTime<Utc>,
}

impl DeliveryOutcome {
    pub fn new(dispatch_id: Uuid, otp_id: impl Into<String>) -> Self {
        Self {
            dispatch_id,
            otp_id: otp_id.into(),
            attempts: Vec::new(),
            recorded_sent_to: String::new(),
            completed_at: Utc::now(),
        }
    }

    /// At least one channel was accepted by its provider
    pub fn is_delivered(&self) -> bool {
        self.attempts.iter().any(ChannelAttempt::is_sent)
    }

    pub fn attempt(&self, channel: Channel) -> Option<&ChannelAttempt> {
        self.attempts.iter().find(|a| a.channel == channel)
    }

    pub fn outcomes(&self) -> Vec<(Channel, AttemptOutcome)> {
        self.attempts.iter().map(|a| (a.channel, a.outcome)).collect()
    }
}
