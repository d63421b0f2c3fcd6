use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use authgrant_core_types::{ErrorCode, ItemId, ItemType, Role, UserId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    /// Internal item handle; must parse as a UUID.
    pub item_id: String,
    pub item_type: ItemType,
    pub role: Role,
    /// Passed through to the APD for consumer access.
    #[serde(default)]
    pub context: Value,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GrantStatus {
    Success,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrant {
    pub status: GrantStatus,
    pub catalogue_id: String,
    pub resource_group_id: Option<ItemId>,
    pub resource_server_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegator_user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegated_role: Option<Role>,
    /// APD answer, untouched; only present when an APD was consulted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apd: Option<Value>,
}

/// One access decision, as published to audit subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessAuditEvent {
    pub caller: UserId,
    /// Whom access was decided for; differs from `caller` under delegation.
    pub principal: Option<UserId>,
    pub item_id: String,
    pub role: Role,
    pub allowed: bool,
    pub code: Option<ErrorCode>,
    pub at: DateTime<Utc>,
}
