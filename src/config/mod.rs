mod settings;

pub use settings::{
    AppConfig, DatabaseConfig, DeliveryConfig, LoggingConfig, Settings,
    SmtpConfig, WhatsAppConfig,
};
