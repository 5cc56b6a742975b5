//! Email composition and the outbound transport seam.
//!
//! The notification consumer turns each queue payload into an `EmailTemplate` and hands
//! it to an `EmailSender`. HTML rendering and SMTP delivery live behind that trait.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The structured content of one outgoing email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub subject: String,
    pub heading: String,
    pub greeting: String,
    pub main_message: String,
    pub button_text: String,
    pub button_url: String,
    pub footer_note: String,
    pub expiry_note: String,
}

/// Joins the frontend base URL, the link path and the token.
pub fn action_url(frontend_url: &str, path: &str, token: &str) -> String {
    format!("{}{}{}", frontend_url, path, token)
}

impl EmailTemplate {
    pub fn magic_link(button_url: String) -> Self {
        Self {
            subject: "Your Magic Link to Sign In".into(),
            heading: "Sign in to TaskFlow".into(),
            greeting: "Hello,".into(),
            main_message: "Click the button below to sign in to your account. \
                           This link will expire in 15 minutes for security reasons."
                .into(),
            button_text: "Sign In Now".into(),
            button_url,
            footer_note: "If you didn't request this email, you can safely ignore it.".into(),
            expiry_note: "This link will expire in 15 minutes.".into(),
        }
    }

    pub fn invitation(workspace_name: &str, role: &str, button_url: String) -> Self {
        Self {
            subject: format!("You've been invited to join {}", workspace_name),
            heading: format!("Join {} on TaskFlow", workspace_name),
            greeting: "Hello,".into(),
            main_message: format!(
                "You have been invited to join the {} workspace as a {}. \
                 Click the button below to accept the invitation and get started.",
                workspace_name, role
            ),
            button_text: "Accept Invitation".into(),
            button_url,
            footer_note: "If you don't want to accept this invitation, \
                          you can safely ignore this email."
                .into(),
            expiry_note: "This invitation will expire in 24 hours.".into(),
        }
    }

    pub fn password_reset(button_url: String) -> Self {
        Self {
            subject: "Reset Your Password".into(),
            heading: "Password Reset Request".into(),
            greeting: "Hello,".into(),
            main_message: "We received a request to reset your password. \
                           Click the button below to create a new password."
                .into(),
            button_text: "Reset Password".into(),
            button_url,
            footer_note: "If you didn't request a password reset, you can safely ignore this email. \
                          Your password will remain unchanged."
                .into(),
            expiry_note: "This link will expire in 1 hour.".into(),
        }
    }
}

/// Failure reported by an `EmailSender`. Always treated as transient by the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendError(pub String);

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "email send failed: {}", self.0)
    }
}

impl std::error::Error for SendError {}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, template: &EmailTemplate) -> Result<(), SendError>;
}

/// Writes each email to the log instead of delivering it.
#[derive(Debug, Default, Clone)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, to: &str, template: &EmailTemplate) -> Result<(), SendError> {
        log::info!(
            "email to {}: subject={:?} button_url={}",
            to,
            template.subject,
            template.button_url
        );
        Ok(())
    }
}
