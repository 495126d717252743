use serde::{Deserialize, Serialize};

/// Email message to be sent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    /// Unique identifier for the email
    pub id: String,
    /// Recipient email address
    pub to: String,
    /// Email subject
    pub subject: String,
    /// Plain text body
    pub body_text: Option<String>,
    /// HTML body
    pub body_html: Option<String>,
}

impl Email {
    /// Create a new email with required fields
    pub fn new(to: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            to: to.into(),
            subject: subject.into(),
            body_text: None,
            body_html: None,
        }
    }

    /// Set plain text body
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.body_text = Some(text.into());
        self
    }

    /// Set HTML body
    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.body_html = Some(html.into());
        self
    }

    /// True when the message has any body at all
    pub fn has_body(&self) -> bool {
        self.body_text.is_some() || self.body_html.is_some()
    }
}
