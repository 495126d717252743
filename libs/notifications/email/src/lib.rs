//! Email delivery library
//!
//! This library provides the outgoing-email surface used by the domain
//! crates: a provider abstraction over concrete transports plus a template
//! engine for rendering message bodies.
//!
//! ## Features
//!
//! - `smtp` (default) - Enable SMTP provider via lettre
//!
//! ## Components
//!
//! - **Email Model**: `Email` for message data
//! - **Providers**: SMTP (feature-gated) and Mock (always available)
//! - **Templates**: Handlebars-based `TemplateEngine` for email templating
//!
//! ## Usage
//!
//! ```ignore
//! use email::{Email, EmailProvider, TemplateEngine};
//!
//! let engine = TemplateEngine::new()?;
//! let rendered = engine.render("verify-email", &data)?;
//!
//! let mail = Email::new("user@example.com", rendered.subject)
//!     .with_text(rendered.body_text.unwrap_or_default());
//! provider.send(&mail).await?;
//! ```

pub mod models;
pub mod provider;
pub mod templates;

// Re-export main types
pub use models::Email;
pub use provider::{EmailProvider, MockProvider, SendResult};
pub use templates::{EmailTemplate, RenderedTemplate, TemplateEngine};

#[cfg(feature = "smtp")]
pub use provider::{SmtpConfig, SmtpProvider};
