use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use authgrant_core_types::{
    Constraints, IsoDuration, ItemId, ItemType, NotificationId, NotificationStatus,
};
use authgrant_entity_store::Policy;
use authgrant_ports::Party;

/// A consumer asking the item's provider for access.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotificationRequest {
    /// Catalogue id of the item.
    pub item_id: String,
    pub item_type: ItemType,
    pub expiry_duration: IsoDuration,
    #[serde(default)]
    pub constraints: Constraints,
}

/// A provider's answer to one pending request. Approvals may override the
/// requested duration and constraints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNotificationRequest {
    pub request_id: NotificationId,
    pub status: NotificationStatus,
    #[serde(default)]
    pub expiry_duration: Option<IsoDuration>,
    #[serde(default)]
    pub constraints: Option<Constraints>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub request_id: NotificationId,
    pub item_id: ItemId,
    pub catalogue_id: Option<String>,
    pub item_type: ItemType,
    pub owner: Party,
    pub user: Party,
    pub status: NotificationStatus,
    pub expiry_duration: IsoDuration,
    pub constraints: Constraints,
    pub created_at: DateTime<Utc>,
}

/// Result of one update call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSummary {
    pub approved: Vec<NotificationId>,
    pub rejected: Vec<NotificationId>,
    /// Policies created by the approvals, in request order.
    pub policies: Vec<Policy>,
}
