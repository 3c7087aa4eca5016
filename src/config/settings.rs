use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::fmt;

use crate::channel::{Channel, ChannelPolicy};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub whatsapp: Option<WhatsAppConfig>,
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Application identity injected into every rendered message
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_app_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Channel policy used when the caller does not pick one
    #[serde(default)]
    pub policy: ChannelPolicy,
    /// Attempt order for the `both` policy
    #[serde(default = "default_channel_order")]
    pub channel_order: Vec<Channel>,
    /// Record attribute holding the email destination
    #[serde(default = "default_email_attribute")]
    pub email_attribute: String,
    /// Record attribute holding the phone destination
    #[serde(default = "default_phone_attribute")]
    pub phone_attribute: String,
    /// Upper bound for a single provider call in seconds
    #[serde(default = "default_transport_timeout")]
    pub transport_timeout_seconds: u64,
}

/// WhatsApp Business Cloud API credentials
#[derive(Clone, Deserialize)]
pub struct WhatsAppConfig {
    pub access_token: String,
    pub phone_number_id: String,
    #[serde(default = "default_whatsapp_api_url")]
    pub api_url: String,
}

#[derive(Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub sender_address: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default = "default_true")]
    pub tls: bool,
}

#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

fn default_app_name() -> String {
    "Acme".to_string()
}

fn default_app_url() -> String {
    "http://localhost:8090".to_string()
}

fn default_channel_order() -> Vec<Channel> {
    vec![Channel::Email, Channel::Chat]
}

fn default_email_attribute() -> String {
    "email".to_string()
}

fn default_phone_attribute() -> String {
    "phone".to_string()
}

fn default_transport_timeout() -> u64 {
    30 // 30 seconds
}

fn default_whatsapp_api_url() -> String {
    "https://graph.facebook.com/v18.0".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

fn default_pool_size() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("app.name", default_app_name())?
            .set_default("app.url", default_app_url())?
            .set_default("delivery.transport_timeout_seconds", 30)?
            .set_default("logging.level", "info")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // APP__NAME, DELIVERY__POLICY, WHATSAPP__ACCESS_TOKEN, SMTP__HOST, ...
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("delivery.channel_order"),
            );

        builder.build()?.try_deserialize()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            url: default_app_url(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            policy: ChannelPolicy::default(),
            channel_order: default_channel_order(),
            email_attribute: default_email_attribute(),
            phone_attribute: default_phone_attribute(),
            transport_timeout_seconds: default_transport_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl WhatsAppConfig {
    pub fn new(access_token: impl Into<String>, phone_number_id: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            phone_number_id: phone_number_id.into(),
            api_url: default_whatsapp_api_url(),
        }
    }
}

// Credentials never reach the logs.

impl fmt::Debug for WhatsAppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WhatsAppConfig")
            .field("access_token", &"<redacted>")
            .field("phone_number_id", &self.phone_number_id)
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("sender_address", &self.sender_address)
            .field("sender_name", &self.sender_name)
            .field("tls", &self.tls)
            .finish()
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"<redacted>")
            .field("pool_size", &self.pool_size)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .finish()
    }
}
