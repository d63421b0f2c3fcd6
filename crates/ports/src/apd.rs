use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use authgrant_core_types::{ItemId, ItemType, UserId};

use crate::errors::{PortError, PortResult};

/// Everything handed to an Access Policy Decision point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApdRequest {
    pub apd_url: String,
    pub item_id: ItemId,
    pub item_type: ItemType,
    pub owner_id: UserId,
    pub resource_server_url: String,
    pub user_id: UserId,
    #[serde(default)]
    pub context: Value,
}

#[async_trait]
pub trait ApdService: Send + Sync {
    /// Returns the APD's payload untouched.
    async fn call_apd(&self, request: ApdRequest) -> PortResult<Value>;
}

pub struct NoopApd;

#[async_trait]
impl ApdService for NoopApd {
    async fn call_apd(&self, _request: ApdRequest) -> PortResult<Value> {
        Err(PortError::NotImplemented("apd"))
    }
}

/// Answers every call with a fixed result and remembers what it was asked.
pub struct StaticApd {
    answer: Mutex<PortResult<Value>>,
    calls: Mutex<Vec<ApdRequest>>,
}

impl StaticApd {
    pub fn allowing(payload: Value) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(Ok(payload)),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(error: PortError) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(Err(error)),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_answer(&self, answer: PortResult<Value>) {
        *self.answer.lock() = answer;
    }

    pub fn calls(&self) -> Vec<ApdRequest> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ApdService for StaticApd {
    async fn call_apd(&self, request: ApdRequest) -> PortResult<Value> {
        self.calls.lock().push(request);
        self.answer.lock().clone()
    }
}
