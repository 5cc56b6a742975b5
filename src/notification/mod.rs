//! Queue messages that ask for an email to be sent.
//!
//! On the wire each message is `{"type": "email.<kind>", "payload": {...}}`. Producers
//! publish through a `NotificationChannel`; `consumer::NotificationConsumer` turns
//! deliveries back into emails.

pub mod amqp;
pub mod consumer;
pub mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::email::EmailTemplate;
use crate::error::AppError;

pub use consumer::{HandleOutcome, NotificationConsumer};
pub use memory::MemoryChannel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagicLinkPayload {
    pub to_email: String,
    pub token: String,
    pub verify_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationPayload {
    pub to_email: String,
    pub workspace_name: String,
    pub role: String,
    pub token: String,
    pub invitation_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordResetPayload {
    pub to_email: String,
    pub token: String,
    pub reset_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomEmailPayload {
    pub to_email: String,
    pub template: EmailTemplate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum NotificationMessage {
    #[serde(rename = "email.magic_link")]
    MagicLink(MagicLinkPayload),
    #[serde(rename = "email.invitation")]
    Invitation(InvitationPayload),
    #[serde(rename = "email.password_reset")]
    PasswordReset(PasswordResetPayload),
    #[serde(rename = "email.custom")]
    Custom(CustomEmailPayload),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    payload: serde_json::Value,
}

/// Why a delivery could not be turned into a `NotificationMessage`.
/// None of these get better on retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not JSON, or missing `type`/`payload`.
    Envelope(String),
    UnknownType(String),
    Payload { kind: String, reason: String },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeError::Envelope(reason) => write!(f, "bad envelope: {}", reason),
            DecodeError::UnknownType(kind) => write!(f, "unknown message type {:?}", kind),
            DecodeError::Payload { kind, reason } => {
                write!(f, "bad {} payload: {}", kind, reason)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

fn payload<T: serde::de::DeserializeOwned>(
    kind: &str,
    value: serde_json::Value,
) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|e| DecodeError::Payload {
        kind: kind.to_string(),
        reason: e.to_string(),
    })
}

impl NotificationMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationMessage::MagicLink(_) => "email.magic_link",
            NotificationMessage::Invitation(_) => "email.invitation",
            NotificationMessage::PasswordReset(_) => "email.password_reset",
            NotificationMessage::Custom(_) => "email.custom",
        }
    }

    pub fn to_email(&self) -> &str {
        match self {
            NotificationMessage::MagicLink(p) => &p.to_email,
            NotificationMessage::Invitation(p) => &p.to_email,
            NotificationMessage::PasswordReset(p) => &p.to_email,
            NotificationMessage::Custom(p) => &p.to_email,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, NotificationError> {
        serde_json::to_vec(self).map_err(|e| NotificationError::Encode(e.to_string()))
    }

    /// Reads the envelope first, then the payload for its declared type.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let envelope: Envelope =
            serde_json::from_slice(bytes).map_err(|e| DecodeError::Envelope(e.to_string()))?;
        let kind = envelope.kind.as_str();
        match kind {
            "email.magic_link" => Ok(Self::MagicLink(payload(kind, envelope.payload)?)),
            "email.invitation" => Ok(Self::Invitation(payload(kind, envelope.payload)?)),
            "email.password_reset" => Ok(Self::PasswordReset(payload(kind, envelope.payload)?)),
            "email.custom" => Ok(Self::Custom(payload(kind, envelope.payload)?)),
            _ => Err(DecodeError::UnknownType(envelope.kind)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    Encode(String),
    Broker(String),
}

impl fmt::Display for NotificationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NotificationError::Encode(reason) => write!(f, "encode notification: {}", reason),
            NotificationError::Broker(reason) => write!(f, "broker: {}", reason),
        }
    }
}

impl std::error::Error for NotificationError {}

impl From<NotificationError> for AppError {
    fn from(error: NotificationError) -> AppError {
        AppError::Internal(error.to_string())
    }
}

/// Outbound side of the email queue.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Resolves once the broker has accepted the message.
    async fn publish(&self, message: &NotificationMessage) -> Result<(), NotificationError>;
}
