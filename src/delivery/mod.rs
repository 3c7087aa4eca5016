//! OTP delivery orchestration.
//!
//! A dispatch walks the channels selected by the policy in order:
//!
//! 1. Templates and transports for every selected channel are checked first
//! 2. A channel without a destination attribute is skipped
//! 3. The rendered message is handed to the channel transport
//! 4. After a successful send the destination is recorded as the OTP's
//!    `sent_to`, unless another channel or dispatch recorded one first
//!
//! Bookkeeping problems never turn a successful send into a failure.

mod orchestrator;
mod types;

pub use orchestrator::{DeliveryOrchestrator, DeliveryStats, DeliveryStatsSnapshot};
pub use types::{
    AttemptOutcome, ChannelAttempt, DeliveryOutcome, OtpContext, SKIP_CANCELLED,
    SKIP_NO_DESTINATION,
};
