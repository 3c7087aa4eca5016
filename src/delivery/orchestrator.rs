use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::channel::{Channel, ChannelTransport, TransportError, TransportSet};
use crate::config::{AppConfig, DeliveryConfig};
use crate::error::{AggregateFailure, BookkeepingFailure, DeliveryError, Result as DeliveryResult};
use crate::metrics::{BookkeepingMetrics, DeliveryMetrics};
use crate::otp::{OtpRecordStore, StoreError, TargetRecord};
use crate::template::{
    MessageTemplate, Placeholders, RenderedMessage, PLACEHOLDER_APP_NAME, PLACEHOLDER_APP_URL,
    PLACEHOLDER_OTP, PLACEHOLDER_OTP_ID, PLACEHOLDER_RECORD_EMAIL, PLACEHOLDER_RECORD_ID,
    PLACEHOLDER_RECORD_PHONE, RECORD_ATTRIBUTE_PREFIX,
};

use super::{
    AttemptOutcome, ChannelAttempt, DeliveryOutcome, OtpContext, SKIP_CANCELLED,
    SKIP_NO_DESTINATION,
};

/// Statistics for the delivery orchestrator
#[derive(Debug, Default)]
pub struct DeliveryStats {
    /// Total dispatch calls
    pub total_dispatches: AtomicU64,
    /// Dispatches that delivered on at least one channel
    pub total_delivered: AtomicU64,
    /// Dispatches where every channel was skipped or failed
    pub total_failed: AtomicU64,
    /// Dispatches rejected before any send
    pub configuration_errors: AtomicU64,
    pub attempts_sent: AtomicU64,
    pub attempts_failed: AtomicU64,
    pub attempts_skipped: AtomicU64,
    /// `sent_to` writes that could not be completed
    pub bookkeeping_failures: AtomicU64,
}

impl DeliveryStats {
    pub fn snapshot(&self) -> DeliveryStatsSnapshot {
        DeliveryStatsSnapshot {
            total_dispatches: self.total_dispatches.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            configuration_errors: self.configuration_errors.load(Ordering::Relaxed),
            attempts_sent: self.attempts_sent.load(Ordering::Relaxed),
            attempts_failed: self.attempts_failed.load(Ordering::Relaxed),
            attempts_skipped: self.attempts_skipped.load(Ordering::Relaxed),
            bookkeeping_failures: self.bookkeeping_failures.load(Ordering::Relaxed),
        }
    }

    fn record_attempt(&self, outcome: AttemptOutcome) {
        let counter = match outcome {
            AttemptOutcome::Sent => &self.attempts_sent,
            AttemptOutcome::Failed => &self.attempts_failed,
            AttemptOutcome::Skipped => &self.attempts_skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of delivery statistics
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryStatsSnapshot {
    pub total_dispatches: u64,
    pub total_delivered: u64,
    pub total_failed: u64,
    pub configuration_errors: u64,
    pub attempts_sent: u64,
    pub attempts_failed: u64,
    pub attempts_skipped: u64,
    pub bookkeeping_failures: u64,
}

/// A channel that passed validation, ready to be attempted
struct PlannedChannel<'a> {
    channel: Channel,
    template: &'a MessageTemplate,
    transport: Arc<dyn ChannelTransport>,
}

/// Delivers OTP codes over the configured channels and records where they went.
///
/// Shared across requests; every `dispatch` call is independent apart from the
/// per-OTP lock around `sent_to` bookkeeping.
pub struct DeliveryOrchestrator {
    app: AppConfig,
    delivery: DeliveryConfig,
    transports: TransportSet,
    store: Arc<dyn OtpRecordStore>,
    /// Serializes find, check, set and save for one OTP id
    record_locks: DashMap<String, Arc<Mutex<()>>>,
    stats: DeliveryStats,
}

impl DeliveryOrchestrator {
    pub fn new(
        app: AppConfig,
        delivery: DeliveryConfig,
        transports: TransportSet,
        store: Arc<dyn OtpRecordStore>,
    ) -> Self {
        tracing::info!(
            app_name = %app.name,
            channels = ?transports.channels(),
            store = store.backend_type(),
            "Delivery orchestrator created"
        );

        Self {
            app,
            delivery,
            transports,
            store,
            record_locks: DashMap::new(),
            stats: DeliveryStats::default(),
        }
    }

    /// Get delivery statistics
    pub fn stats(&self) -> DeliveryStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn store(&self) -> &Arc<dyn OtpRecordStore> {
        &self.store
    }

    /// Deliver an OTP over the channels selected by `ctx.policy`.
    ///
    /// Returns the per-channel outcome when at least one channel was accepted
    /// by its provider. Otherwise returns `DeliveryError::Aggregate`, or
    /// `DeliveryError::Configuration` if a selected channel has no valid
    /// template or transport (checked before anything is sent).
    pub async fn dispatch(&self, ctx: OtpContext) -> DeliveryResult<DeliveryOutcome> {
        self.dispatch_with_cancel(ctx, &CancellationToken::new()).await
    }

    /// `dispatch`, stopping before the next channel once `cancel` fires.
    ///
    /// Channels not started by then are recorded as skipped. A send already in
    /// flight runs to completion (or to its timeout) and is still recorded.
    #[tracing::instrument(
        name = "delivery.dispatch",
        skip(self, ctx, cancel),
        fields(
            otp_id = %ctx.otp_id,
            policy = ?ctx.policy,
            target = %ctx.target.identifier(),
            dispatch_id = tracing::field::Empty
        )
    )]
    pub async fn dispatch_with_cancel(
        &self,
        ctx: OtpContext,
        cancel: &CancellationToken,
    ) -> DeliveryResult<DeliveryOutcome> {
        let dispatch_id = Uuid::new_v4();
        tracing::Span::current().record("dispatch_id", tracing::field::display(dispatch_id));
        self.stats.total_dispatches.fetch_add(1, Ordering::Relaxed);

        let plan = match self.plan(&ctx) {
            Ok(plan) => plan,
            Err(e) => {
                self.stats.configuration_errors.fetch_add(1, Ordering::Relaxed);
                DeliveryMetrics::record_config_error();
                tracing::warn!(error = %e, "OTP dispatch rejected before sending");
                return Err(e);
            }
        };

        let mut outcome = DeliveryOutcome::new(dispatch_id, ctx.otp_id.clone());

        for planned in plan {
            let channel = planned.channel;

            if cancel.is_cancelled() {
                tracing::debug!(channel = %channel, "Dispatch cancelled, channel not attempted");
                self.push_attempt(
                    &mut outcome,
                    ChannelAttempt::skipped(channel, "", SKIP_CANCELLED),
                );
                continue;
            }

            let destination = self.destination(channel, ctx.target.as_ref());
            if destination.is_empty() {
                tracing::warn!(channel = %channel, "No destination attribute, channel skipped");
                self.push_attempt(
                    &mut outcome,
                    ChannelAttempt::skipped(channel, "", SKIP_NO_DESTINATION),
                );
                continue;
            }

            let placeholders = self.placeholders(&ctx, channel, planned.template, &destination);
            let message = planned.template.render(&placeholders);

            if let Err(e) = self.send(planned.transport, &destination, message).await {
                tracing::warn!(
                    channel = %channel,
                    error = %e,
                    "OTP send failed"
                );
                self.push_attempt(
                    &mut outcome,
                    ChannelAttempt::failed(channel, destination, e.to_string()),
                );
                continue;
            }

            tracing::debug!(channel = %channel, "OTP sent");
            let mut attempt = ChannelAttempt::sent(channel, destination.clone());

            match self.record_sent_to(&ctx.otp_id, &destination).await {
                Ok(recorded) => outcome.recorded_sent_to = recorded,
                Err(failure) => {
                    self.stats.bookkeeping_failures.fetch_add(1, Ordering::Relaxed);
                    BookkeepingMetrics::record_failure(failure.kind());
                    match &failure {
                        BookkeepingFailure::Save(_) => tracing::error!(
                            channel = %channel,
                            error = %failure,
                            "Failed to record OTP sent_to"
                        ),
                        _ => tracing::warn!(
                            channel = %channel,
                            error = %failure,
                            "Unable to find OTP to update its sent_to field"
                        ),
                    }
                    attempt.bookkeeping = Some(failure);
                }
            }

            self.push_attempt(&mut outcome, attempt);
        }

        outcome.completed_at = Utc::now();
        self.finish(outcome)
    }

    /// Select channels and check templates and transports up front
    fn plan<'a>(&self, ctx: &'a OtpContext) -> DeliveryResult<Vec<PlannedChannel<'a>>> {
        ctx.policy
            .channels(&self.delivery.channel_order)
            .into_iter()
            .map(|channel| -> DeliveryResult<PlannedChannel<'a>> {
                let template = ctx.templates.validated(channel)?;
                let transport = self.transports.get(channel).ok_or_else(|| {
                    DeliveryError::Configuration(format!(
                        "No transport configured for channel {}",
                        channel
                    ))
                })?;
                Ok(PlannedChannel {
                    channel,
                    template,
                    transport,
                })
            })
            .collect()
    }

    fn destination(&self, channel: Channel, target: &dyn TargetRecord) -> String {
        let attribute = match channel {
            Channel::Email => &self.delivery.email_attribute,
            Channel::Chat => &self.delivery.phone_attribute,
        };
        target.attribute(attribute).trim().to_string()
    }

    /// Reserved tokens always win over same-named record attributes
    fn placeholders(
        &self,
        ctx: &OtpContext,
        channel: Channel,
        template: &MessageTemplate,
        destination: &str,
    ) -> Placeholders {
        let mut placeholders = Placeholders::new();

        for name in template.record_attributes() {
            let value = ctx.target.attribute(&name);
            placeholders.insert(
                format!("{}{}}}", RECORD_ATTRIBUTE_PREFIX, name),
                Value::String(value),
            );
        }

        let email = ctx.target.attribute(&self.delivery.email_attribute);
        let reserved = [
            (PLACEHOLDER_OTP, ctx.secret.clone()),
            (PLACEHOLDER_OTP_ID, ctx.otp_id.clone()),
            (PLACEHOLDER_APP_NAME, self.app.name.clone()),
            (PLACEHOLDER_APP_URL, self.app.url.clone()),
            (PLACEHOLDER_RECORD_ID, ctx.target.identifier()),
            (PLACEHOLDER_RECORD_EMAIL, email),
        ];
        for (token, value) in reserved {
            placeholders.insert(token.to_string(), Value::String(value));
        }

        if channel == Channel::Chat {
            placeholders.insert(
                PLACEHOLDER_RECORD_PHONE.to_string(),
                Value::String(destination.to_string()),
            );
        }

        placeholders
    }

    /// Run the provider call on its own task so dropping the dispatch does not
    /// abort a send halfway.
    async fn send(
        &self,
        transport: Arc<dyn ChannelTransport>,
        destination: &str,
        message: RenderedMessage,
    ) -> Result<(), TransportError> {
        let timeout = Duration::from_secs(self.delivery.transport_timeout_seconds);
        let destination = destination.to_string();
        let handle = tokio::spawn(async move { transport.send(&destination, &message).await });

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(TransportError::Request(format!("send task failed: {}", e))),
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }

    /// Record `destination` as the OTP's `sent_to` unless one is already set.
    ///
    /// Returns the value persisted after the call.
    async fn record_sent_to(
        &self,
        otp_id: &str,
        destination: &str,
    ) -> Result<String, BookkeepingFailure> {
        let lock = self
            .record_locks
            .entry(otp_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.commit_sent_to(otp_id, destination).await
        };

        drop(lock);
        self.record_locks
            .remove_if(otp_id, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    async fn commit_sent_to(
        &self,
        otp_id: &str,
        destination: &str,
    ) -> Result<String, BookkeepingFailure> {
        let mut record = match self.store.find_by_id(otp_id).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => {
                return Err(BookkeepingFailure::RecordNotFound(otp_id.to_string()))
            }
            Err(e) => return Err(BookkeepingFailure::Lookup(e.to_string())),
        };

        if record.is_sent() {
            tracing::debug!(sent_to = %record.sent_to(), "OTP sent_to already recorded");
            return Ok(record.sent_to().to_string());
        }

        record.set_sent_to(destination);
        match self.store.save(&record).await {
            Ok(()) => Ok(destination.to_string()),
            Err(StoreError::SentToConflict { existing, .. }) => {
                tracing::debug!(sent_to = %existing, "Another writer recorded sent_to first");
                Ok(existing)
            }
            Err(StoreError::NotFound(_)) => Err(BookkeepingFailure::RecordNotFound(otp_id.to_string())),
            Err(e) => Err(BookkeepingFailure::Save(e.to_string())),
        }
    }

    fn push_attempt(&self, outcome: &mut DeliveryOutcome, attempt: ChannelAttempt) {
        self.stats.record_attempt(attempt.outcome);
        DeliveryMetrics::record_attempt(attempt.channel.as_str(), attempt.outcome.as_str());
        outcome.attempts.push(attempt);
    }

    fn finish(&self, outcome: DeliveryOutcome) -> DeliveryResult<DeliveryOutcome> {
        if outcome.is_delivered() {
            self.stats.total_delivered.fetch_add(1, Ordering::Relaxed);
            DeliveryMetrics::record_delivered();
            tracing::info!(
                outcomes = ?outcome.outcomes(),
                recorded = !outcome.recorded_sent_to.is_empty(),
                "OTP delivered"
            );
            return Ok(outcome);
        }

        self.stats.total_failed.fetch_add(1, Ordering::Relaxed);
        DeliveryMetrics::record_failed();
        let failure = AggregateFailure::new(outcome.otp_id, outcome.attempts);
        tracing::warn!(
            no_destination = failure.no_destination(),
            cancelled = failure.cancelled(),
            error = %failure,
            "OTP not delivered on any channel"
        );
        Err(DeliveryError::Aggregate(failure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelPolicy;
    use crate::otp::{AuthRecord, MemoryOtpStore, OtpRecord};
    use crate::template::ChannelTemplates;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// Records every message it is asked to send
    struct RecordingTransport {
        channel: Channel,
        sent: StdMutex<Vec<(String, RenderedMessage)>>,
    }

    impl RecordingTransport {
        fn new(channel: Channel) -> Arc<Self> {
            Arc::new(Self {
                channel,
                sent: StdMutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<(String, RenderedMessage)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChannelTransport for RecordingTransport {
        fn channel(&self) -> Channel {
            self.channel
        }

        async fn send(&self, destination: &str, message: &RenderedMessage) -> Result<(), TransportError> {
            self.sent
                .lock()
                .unwrap()
                .push((destination.to_string(), message.clone()));
            Ok(())
        }
    }

    fn orchestrator(
        transports: TransportSet,
        store: Arc<MemoryOtpStore>,
    ) -> DeliveryOrchestrator {
        let app = AppConfig {
            name: "Acme".to_string(),
            url: "https://acme.test".to_string(),
        };
        DeliveryOrchestrator::new(app, DeliveryConfig::default(), transports, store)
    }

    #[tokio::test]
    async fn test_chat_message_placeholders() {
        let chat = RecordingTransport::new(Channel::Chat);
        let store = Arc::new(MemoryOtpStore::new());
        store.insert(OtpRecord::new("otp1", "users", "user1"));
        let orchestrator = orchestrator(TransportSet::new().with(chat.clone()), store);

        let target = AuthRecord::new("user1")
            .with_attribute("email", "user@example.com")
            .with_attribute("phone", "+15551234567")
            .with_attribute("name", "Ana");
        let templates = ChannelTemplates::new().with(
            Channel::Chat,
            MessageTemplate::new(
                "{RECORD:name}, your {APP_NAME} code is {OTP} ({OTP_ID}) for {RECORD_EMAIL} on {RECORD_PHONE}",
            ),
        );
        let ctx = OtpContext::new("otp1", "123456", target, ChannelPolicy::ChatOnly, templates);

        let outcome = orchestrator.dispatch(ctx).await.unwrap();
        assert_eq!(outcome.recorded_sent_to, "+15551234567");

        let sent = chat.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "+15551234567");
        assert_eq!(
            sent[0].1.body,
            "Ana, your Acme code is 123456 (otp1) for user@example.com on +15551234567"
        );
    }

    #[tokio::test]
    async fn test_record_attribute_cannot_shadow_reserved_token() {
        let email = RecordingTransport::new(Channel::Email);
        let store = Arc::new(MemoryOtpStore::new());
        store.insert(OtpRecord::new("otp1", "users", "user1"));
        let orchestrator = orchestrator(TransportSet::new().with(email.clone()), store);

        let target = AuthRecord::new("user1").with_attribute("email", "user@example.com");
        let templates = ChannelTemplates::new().with(
            Channel::Email,
            MessageTemplate::with_subject("{APP_NAME} code", "Code {OTP} for {RECORD_ID}"),
        );
        let ctx = OtpContext::new("otp1", "987654", target, ChannelPolicy::EmailOnly, templates);

        orchestrator.dispatch(ctx).await.unwrap();

        let sent = email.sent();
        assert_eq!(sent[0].1.subject.as_deref(), Some("Acme code"));
        assert_eq!(sent[0].1.body, "Code 987654 for user1");
    }

    #[tokio::test]
    async fn test_record_locks_are_released() {
        let email = RecordingTransport::new(Channel::Email);
        let store = Arc::new(MemoryOtpStore::new());
        store.insert(OtpRecord::new("otp1", "users", "user1"));
        let orchestrator = orchestrator(TransportSet::new().with(email), store);

        let target = AuthRecord::new("user1").with_attribute("email", "user@example.com");
        let templates =
            ChannelTemplates::new().with(Channel::Email, MessageTemplate::new("Code {OTP}"));
        let ctx = OtpContext::new("otp1", "123456", target, ChannelPolicy::EmailOnly, templates);

        orchestrator.dispatch(ctx).await.unwrap();
        assert!(orchestrator.record_locks.is_empty());
    }

    #[tokio::test]
    async fn test_stats_count_attempts() {
        let email = RecordingTransport::new(Channel::Email);
        let chat = RecordingTransport::new(Channel::Chat);
        let store = Arc::new(MemoryOtpStore::new());
        store.insert(OtpRecord::new("otp1", "users", "user1"));
        let orchestrator =
            orchestrator(TransportSet::new().with(email).with(chat), store);

        let target = AuthRecord::new("user1").with_attribute("phone", "+15551234567");
        let templates = ChannelTemplates::new()
            .with(Channel::Email, MessageTemplate::new("Code {OTP}"))
            .with(Channel::Chat, MessageTemplate::new("Code {OTP}"));
        let ctx = OtpContext::new("otp1", "123456", target, ChannelPolicy::Both, templates);

        orchestrator.dispatch(ctx).await.unwrap();

        let stats = orchestrator.stats();
        assert_eq!(stats.total_dispatches, 1);
        assert_eq!(stats.total_delivered, 1);
        assert_eq!(stats.attempts_sent, 1);
        assert_eq!(stats.attempts_skipped, 1);
        assert_eq!(stats.attempts_failed, 0);
    }
}
