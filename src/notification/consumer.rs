//! Turns queue deliveries into sent emails.
//!
//! Every delivery ends with an explicit settlement: a message is acknowledged only after
//! the email went out, transient send failures are requeued once, and anything that
//! cannot succeed is dead-lettered instead of being dropped.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};

use super::{NotificationError, NotificationMessage};
use crate::email::{action_url, EmailSender, EmailTemplate};

/// How a delivery is settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    Ack,
    Nack { requeue: bool },
    /// Rejected without requeue so the broker routes it to the dead-letter queue.
    DeadLetter,
}

/// One message pulled off the queue.
#[async_trait]
pub trait InboundDelivery: Send {
    fn body(&self) -> &[u8];

    fn redelivered(&self) -> bool;

    async fn settle(&self, outcome: HandleOutcome) -> Result<(), NotificationError>;
}

pub struct NotificationConsumer {
    sender: Arc<dyn EmailSender>,
    frontend_url: String,
}

impl NotificationConsumer {
    pub fn new(sender: Arc<dyn EmailSender>, frontend_url: impl Into<String>) -> Self {
        Self {
            sender,
            frontend_url: frontend_url.into(),
        }
    }

    /// Builds the recipient and email content for a message.
    pub fn compose(&self, message: &NotificationMessage) -> (String, EmailTemplate) {
        let template = match message {
            NotificationMessage::MagicLink(p) => EmailTemplate::magic_link(action_url(
                &self.frontend_url,
                &p.verify_url,
                &p.token,
            )),
            NotificationMessage::Invitation(p) => EmailTemplate::invitation(
                &p.workspace_name,
                &p.role,
                action_url(&self.frontend_url, &p.invitation_url, &p.token),
            ),
            NotificationMessage::PasswordReset(p) => EmailTemplate::password_reset(action_url(
                &self.frontend_url,
                &p.reset_url,
                &p.token,
            )),
            NotificationMessage::Custom(p) => p.template.clone(),
        };
        (message.to_email().to_string(), template)
    }

    pub async fn handle(&self, body: &[u8], redelivered: bool) -> HandleOutcome {
        let message = match NotificationMessage::decode(body) {
            Ok(message) => message,
            Err(e) => {
                log::error!("dead-lettering undecodable notification: {}", e);
                return HandleOutcome::DeadLetter;
            }
        };

        let (to, template) = self.compose(&message);
        match self.sender.send(&to, &template).await {
            Ok(()) => {
                log::info!("sent {} email to {}", message.kind(), to);
                HandleOutcome::Ack
            }
            Err(e) if redelivered => {
                log::error!("{} email to {} failed again, dead-lettering: {}", message.kind(), to, e);
                HandleOutcome::DeadLetter
            }
            Err(e) => {
                log::warn!("{} email to {} failed, requeueing: {}", message.kind(), to, e);
                HandleOutcome::Nack { requeue: true }
            }
        }
    }

    /// Processes deliveries one at a time until the stream ends or errors.
    ///
    /// A stream error is final for this stream: `run` returns and nothing is consumed
    /// until the caller opens a new one.
    pub async fn run<S, D, E>(&self, deliveries: S)
    where
        S: Stream<Item = Result<D, E>>,
        D: InboundDelivery,
        E: fmt::Display,
    {
        let mut deliveries = Box::pin(deliveries);
        log::info!("notification consumer started");

        while let Some(next) = deliveries.next().await {
            let delivery = match next {
                Ok(delivery) => delivery,
                Err(e) => {
                    log::error!("notification stream failed: {}", e);
                    break;
                }
            };

            let outcome = self.handle(delivery.body(), delivery.redelivered()).await;
            if let Err(e) = delivery.settle(outcome).await {
                log::error!("failed to settle delivery as {:?}: {}", outcome, e);
            }
        }

        log::info!("notification consumer stopped");
    }
}
