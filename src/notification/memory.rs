use std::sync::Mutex;

use async_trait::async_trait;

use super::{NotificationChannel, NotificationError, NotificationMessage};

/// Keeps published messages in memory. Can be switched into a failing mode.
#[derive(Default)]
pub struct MemoryChannel {
    published: Mutex<Vec<NotificationMessage>>,
    failing: Mutex<bool>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent publish fail with a broker error.
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut flag) = self.failing.lock() {
            *flag = failing;
        }
    }

    pub fn published(&self) -> Vec<NotificationMessage> {
        self.published
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<NotificationMessage> {
        self.published().pop()
    }
}

#[async_trait]
impl NotificationChannel for MemoryChannel {
    async fn publish(&self, message: &NotificationMessage) -> Result<(), NotificationError> {
        let failing = self
            .failing
            .lock()
            .map_err(|_| NotificationError::Broker("channel lock poisoned".into()))?;
        if *failing {
            return Err(NotificationError::Broker("channel unavailable".into()));
        }
        drop(failing);

        self.published
            .lock()
            .map_err(|_| NotificationError::Broker("channel lock poisoned".into()))?
            .push(message.clone());
        Ok(())
    }
}
