//! Message templates for OTP delivery.
//!
//! This module provides:
//! - `MessageTemplate` with an optional subject and a body containing placeholder tokens
//! - `ChannelTemplates`, the per-channel template set carried by a dispatch
//! - The substitution engine used to render templates
//!
//! # Example
//!
//! ```ignore
//! let template = MessageTemplate::with_subject("{APP_NAME} login", "Your code is {OTP}");
//!
//! let mut placeholders = Placeholders::new();
//! placeholders.insert(PLACEHOLDER_APP_NAME.to_string(), json!("Acme"));
//! placeholders.insert(PLACEHOLDER_OTP.to_string(), json!("123456"));
//!
//! let rendered = template.render(&placeholders);
//! assert_eq!(rendered.body, "Your code is 123456");
//! ```

mod substitution;
mod types;

pub use substitution::{record_attribute_names, resolve, value_to_string};
pub use types::{
    ChannelTemplates, MessageTemplate, Placeholders, RenderedMessage, TemplateError,
    TemplateResult, PLACEHOLDER_APP_NAME, PLACEHOLDER_APP_URL, PLACEHOLDER_OTP,
    PLACEHOLDER_OTP_ID, PLACEHOLDER_RECORD_EMAIL, PLACEHOLDER_RECORD_ID,
    PLACEHOLDER_RECORD_PHONE, RECORD_ATTRIBUTE_PREFIX,
};
