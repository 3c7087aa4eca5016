//! Delivery error taxonomy.
//!
//! Only `DeliveryError` reaches the caller. Per-channel problems
//! (`TransportError`, a skipped channel) and `BookkeepingFailure` are recorded
//! in the `DeliveryOutcome` attempts and logged instead.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::delivery::{AttemptOutcome, ChannelAttempt, SKIP_CANCELLED, SKIP_NO_DESTINATION};
use crate::template::TemplateError;

#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Reported before any network activity
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Every attempted channel was skipped or failed
    #[error(transparent)]
    Aggregate(#[from] AggregateFailure),
}

impl From<TemplateError> for DeliveryError {
    fn from(e: TemplateError) -> Self {
        DeliveryError::Configuration(e.to_string())
    }
}

impl DeliveryError {
    /// Stable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            DeliveryError::Configuration(_) => "CONFIG_ERROR",
            DeliveryError::Aggregate(failure) if failure.no_destination() => "NO_DESTINATION",
            DeliveryError::Aggregate(failure) if failure.cancelled() => "DISPATCH_CANCELLED",
            DeliveryError::Aggregate(_) => "DELIVERY_FAILED",
        }
    }
}

/// Failure to record `sent_to` after a successful send.
///
/// Never downgrades the delivery itself.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum BookkeepingFailure {
    /// Record deleted or expired between issuing and sending
    #[error("OTP record {0} not found")]
    RecordNotFound(String),

    #[error("Failed to load OTP record: {0}")]
    Lookup(String),

    #[error("Failed to save OTP record: {0}")]
    Save(String),
}

impl BookkeepingFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            BookkeepingFailure::RecordNotFound(_) => "not_found",
            BookkeepingFailure::Lookup(_) => "lookup",
            BookkeepingFailure::Save(_) => "save",
        }
    }
}

/// Every channel of a dispatch ended skipped or failed
#[derive(Debug, Clone)]
pub struct AggregateFailure {
    pub otp_id: String,
    pub attempts: Vec<ChannelAttempt>,
}

impl AggregateFailure {
    pub fn new(otp_id: impl Into<String>, attempts: Vec<ChannelAttempt>) -> Self {
        Self {
            otp_id: otp_id.into(),
            attempts,
        }
    }

    /// Channels not attempted, e.g. for lack of a destination
    pub fn skipped(&self) -> impl Iterator<Item = &ChannelAttempt> {
        self.attempts
            .iter()
            .filter(|a| a.outcome == AttemptOutcome::Skipped)
    }

    /// Channels whose provider call failed
    pub fn failed(&self) -> impl Iterator<Item = &ChannelAttempt> {
        self.attempts
            .iter()
            .filter(|a| a.outcome == AttemptOutcome::Failed)
    }

    pub fn all_skipped(&self) -> bool {
        self.attempts
            .iter()
            .all(|a| a.outcome == AttemptOutcome::Skipped)
    }

    /// Every channel was skipped because the record has no destination for it
    pub fn no_destination(&self) -> bool {
        self.attempts.iter().all(|a| {
            a.outcome == AttemptOutcome::Skipped
                && a.error_detail.as_deref() == Some(SKIP_NO_DESTINATION)
        })
    }

    /// At least one channel was left unattempted because the dispatch was cancelled
    pub fn cancelled(&self) -> bool {
        self.skipped()
            .any(|a| a.error_detail.as_deref() == Some(SKIP_CANCELLED))
    }
}

impl fmt::Display for AggregateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OTP {} was not delivered", self.otp_id)?;

        let describe = |attempts: Vec<&ChannelAttempt>| {
            attempts
                .iter()
                .map(|a| format!("{}: {}", a.channel, a.error_detail.as_deref().unwrap_or("unknown")))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let skipped: Vec<_> = self.skipped().collect();
        if !skipped.is_empty() {
            write!(f, "; skipped [{}]", describe(skipped))?;
        }
        let failed: Vec<_> = self.failed().collect();
        if !failed.is_empty() {
            write!(f, "; failed [{}]", describe(failed))?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateFailure {}

pub type Result<T> = std::result::Result<T, DeliveryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;

    #[test]
    fn test_aggregate_distinguishes_skipped_and_failed() {
        let failure = AggregateFailure::new(
            "otp1",
            vec![
                ChannelAttempt::skipped(Channel::Email, "", "no destination attribute"),
                ChannelAttempt::failed(Channel::Chat, "+15551234567", "Provider returned status 401: denied"),
            ],
        );

        assert!(!failure.all_skipped());
        assert_eq!(failure.skipped().count(), 1);
        assert_eq!(failure.failed().count(), 1);
        assert_eq!(
            failure.to_string(),
            "OTP otp1 was not delivered; skipped [email: no destination attribute]; failed [chat: Provider returned status 401: denied]"
        );
        assert_eq!(DeliveryError::from(failure).code(), "DELIVERY_FAILED");
    }

    #[test]
    fn test_all_skipped_code() {
        let failure = AggregateFailure::new(
            "otp1",
            vec![ChannelAttempt::skipped(Channel::Email, "", "no destination attribute")],
        );
        assert!(failure.all_skipped());
        assert!(failure.no_destination());
        assert_eq!(DeliveryError::Aggregate(failure).code(), "NO_DESTINATION");
    }

    #[test]
    fn test_cancelled_is_not_reported_as_no_destination() {
        let failure = AggregateFailure::new(
            "otp1",
            vec![
                ChannelAttempt::skipped(Channel::Email, "", SKIP_CANCELLED),
                ChannelAttempt::skipped(Channel::Chat, "", SKIP_CANCELLED),
            ],
        );
        assert!(failure.all_skipped());
        assert!(!failure.no_destination());
        assert!(failure.cancelled());
        assert_eq!(DeliveryError::Aggregate(failure).code(), "DISPATCH_CANCELLED");
    }

    #[test]
    fn test_mixed_skips_with_cancellation() {
        let failure = AggregateFailure::new(
            "otp1",
            vec![
                ChannelAttempt::skipped(Channel::Email, "", SKIP_NO_DESTINATION),
                ChannelAttempt::skipped(Channel::Chat, "", SKIP_CANCELLED),
            ],
        );
        assert!(!failure.no_destination());
        assert_eq!(DeliveryError::Aggregate(failure).code(), "DISPATCH_CANCELLED");
    }

    #[test]
    fn test_template_error_is_configuration() {
        let err: DeliveryError = TemplateError::Missing(Channel::Chat).into();
        assert!(matches!(err, DeliveryError::Configuration(_)));
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_bookkeeping_kind() {
        assert_eq!(BookkeepingFailure::Save("boom".into()).kind(), "save");
        let value = serde_json::to_value(BookkeepingFailure::RecordNotFound("otp1".into())).unwrap();
        assert_eq!(value["kind"], "record_not_found");
        assert_eq!(value["detail"], "otp1");
    }
}
