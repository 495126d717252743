//! Email template management with Handlebars

use eyre::{eyre, Result};
use handlebars::Handlebars;
use serde_json::Value;
use std::collections::HashMap;

/// Rendered template result
#[derive(Debug, Clone)]
pub struct RenderedTemplate {
    pub subject: String,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
}

/// Email template definition
#[derive(Clone, Debug)]
pub struct EmailTemplate {
    pub name: String,
    pub subject: String,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
}

/// Handlebars-based template engine
///
/// Supports:
/// - Variables: `{{name}}`
/// - Conditionals: `{{#if condition}}...{{/if}}`
/// - HTML escaping: `{{{unescaped}}}` for raw HTML
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
    templates: HashMap<String, EmailTemplate>,
}

impl TemplateEngine {
    /// Create a new TemplateEngine with default templates
    pub fn new() -> Result<Self> {
        let mut engine = Self {
            handlebars: Handlebars::new(),
            templates: HashMap::new(),
        };

        engine.register_defaults()?;

        Ok(engine)
    }

    /// Register a template
    pub fn register(&mut self, template: EmailTemplate) -> Result<()> {
        self.handlebars
            .register_template_string(&format!("{}_subject", template.name), &template.subject)
            .map_err(|e| eyre!("Failed to register subject template: {}", e))?;

        if let Some(text) = &template.body_text {
            self.handlebars
                .register_template_string(&format!("{}_text", template.name), text)
                .map_err(|e| eyre!("Failed to register text template: {}", e))?;
        }

        if let Some(html) = &template.body_html {
            self.handlebars
                .register_template_string(&format!("{}_html", template.name), html)
                .map_err(|e| eyre!("Failed to register HTML template: {}", e))?;
        }

        self.templates.insert(template.name.clone(), template);
        Ok(())
    }

    /// Render a template by name
    pub fn render(&self, name: &str, data: &Value) -> Result<RenderedTemplate> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| eyre!("Template not found: {}", name))?;

        let subject = self
            .handlebars
            .render(&format!("{}_subject", name), data)
            .map_err(|e| eyre!("Failed to render subject: {}", e))?;

        let body_text = if template.body_text.is_some() {
            Some(
                self.handlebars
                    .render(&format!("{}_text", name), data)
                    .map_err(|e| eyre!("Failed to render text: {}", e))?,
            )
        } else {
            None
        };

        let body_html = if template.body_html.is_some() {
            Some(
                self.handlebars
                    .render(&format!("{}_html", name), data)
                    .map_err(|e| eyre!("Failed to render HTML: {}", e))?,
            )
        } else {
            None
        };

        Ok(RenderedTemplate {
            subject,
            body_text,
            body_html,
        })
    }

    /// Check if a template exists
    pub fn has_template(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// List all registered templates
    pub fn list_templates(&self) -> Vec<&str> {
        self.templates.keys().map(|s| s.as_str()).collect()
    }

    /// Register default email templates
    fn register_defaults(&mut self) -> Result<()> {
        // Email-ownership verification
        self.register(EmailTemplate {
            name: "verify-email".to_string(),
            subject: "Verify your email address".to_string(),
            body_text: Some(
                r#"Hello {{username}},

A request was made to attach {{email}} to your account.

Please confirm that this address belongs to you by clicking the link below:

{{confirm_link}}

If you did not request this, you can safely ignore this email.
"#
                .to_string(),
            ),
            body_html: Some(
                r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <h1 style="color: #2563eb;">Verify Your Email</h1>
    <p>Hello {{username}},</p>
    <p>A request was made to attach <strong>{{email}}</strong> to your account.</p>
    <p style="text-align: center; margin: 30px 0;">
        <a href="{{confirm_link}}"
           style="background-color: #2563eb; color: white; padding: 12px 24px; text-decoration: none; border-radius: 6px; display: inline-block;">
            Confirm Email
        </a>
    </p>
    <p style="color: #666; font-size: 14px;">If you did not request this, you can safely ignore this email.</p>
</body>
</html>"#
                    .to_string(),
            ),
        })?;

        Ok(())
    }
}
