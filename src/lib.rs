// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Domain
pub mod channel;
pub mod otp;
pub mod template;

// Application
pub mod delivery;

pub use channel::{Channel, ChannelPolicy, ChannelTransport, TransportError, TransportSet};
pub use delivery::{DeliveryOrchestrator, DeliveryOutcome, OtpContext};
pub use error::{AggregateFailure, BookkeepingFailure, DeliveryError};
