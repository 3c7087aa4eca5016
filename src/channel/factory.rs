//! Transport factory

use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;

use super::email::EmailTransport;
use super::whatsapp::WhatsAppTransport;
use super::{TransportError, TransportSet};

/// Create the transports configured in settings.
///
/// - `smtp` section present: registers an `EmailTransport`
/// - `whatsapp` section present: registers a `WhatsAppTransport`
///
/// A channel without credentials is left unregistered; dispatching on it is
/// then reported as a configuration error by the orchestrator.
///
/// # Example
///
/// ```rust,ignore
/// let transports = create_transports(&settings)?;
/// let orchestrator = DeliveryOrchestrator::new(settings.app.clone(), settings.delivery.clone(), transports, store);
/// ```
pub fn create_transports(settings: &Settings) -> Result<TransportSet, TransportError> {
    let timeout = Duration::from_secs(settings.delivery.transport_timeout_seconds.max(1));
    let mut transports = TransportSet::new();

    match &settings.smtp {
        Some(smtp) => {
            tracing::info!(
                channel = "email",
                host = %smtp.host,
                port = smtp.port,
                "Creating SMTP email transport"
            );
            transports.register(Arc::new(EmailTransport::new(
                smtp,
                &settings.app.name,
                timeout,
            )?));
        }
        None => tracing::warn!(channel = "email", "No SMTP settings, email channel disabled"),
    }

    match &settings.whatsapp {
        Some(whatsapp) => {
            tracing::info!(
                channel = "chat",
                api_url = %whatsapp.api_url,
                "Creating WhatsApp transport"
            );
            transports.register(Arc::new(WhatsAppTransport::new(whatsapp.clone(), timeout)?));
        }
        None => tracing::warn!(channel = "chat", "No WhatsApp settings, chat channel disabled"),
    }

    Ok(transports)
}
