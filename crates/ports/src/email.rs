use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use authgrant_core_types::NotificationId;

use crate::errors::{PortError, PortResult};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestOutcome {
    Approved,
    Rejected,
}

/// Tells a consumer how the provider answered their access requests.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    pub sender: String,
    pub to: String,
    pub outcome: RequestOutcome,
    pub request_ids: Vec<NotificationId>,
    pub catalogue_ids: Vec<String>,
}

#[async_trait]
pub trait EmailClient: Send + Sync {
    async fn send(&self, message: EmailMessage) -> PortResult<()>;
}

pub struct NoopEmailClient;

#[async_trait]
impl EmailClient for NoopEmailClient {
    async fn send(&self, _message: EmailMessage) -> PortResult<()> {
        Ok(())
    }
}

/// Keeps sent messages in memory; can be switched to fail every send.
#[derive(Default)]
pub struct RecordingEmailClient {
    sent: Mutex<Vec<EmailMessage>>,
    failing: Mutex<bool>,
}

impl RecordingEmailClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl EmailClient for RecordingEmailClient {
    async fn send(&self, message: EmailMessage) -> PortResult<()> {
        if *self.failing.lock() {
            return Err(PortError::Unavailable {
                service: "email",
                message: "smtp relay refused the connection".into(),
            });
        }
        self.sent.lock().push(message);
        Ok(())
    }
}
