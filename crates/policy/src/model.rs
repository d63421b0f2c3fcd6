use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use authgrant_core_types::{
    Constraints, ItemId, ItemType, PolicyId, PolicyStatus, ResourceServerId, UserId,
};
use authgrant_entity_store::{Policy, WriteBatch};
use authgrant_ports::Party;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePolicyRequest {
    /// Grantee.
    pub user_id: UserId,
    /// Catalogue id of the item.
    pub item_id: String,
    pub item_type: ItemType,
    #[serde(default)]
    pub expiry_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub constraints: Constraints,
}

/// A grant whose item is already resolved against the catalogue.
#[derive(Clone, Debug, PartialEq)]
pub struct Grant {
    pub grantee: UserId,
    pub item_id: ItemId,
    pub item_type: ItemType,
    pub owner_id: UserId,
    pub resource_server_id: ResourceServerId,
    pub expiry_time: Option<DateTime<Utc>>,
    pub constraints: Constraints,
}

/// Validated policy rows together with the writes that insert them. Callers
/// may add their own ops to `batch` before committing.
#[derive(Clone, Debug)]
pub struct PolicyPlan {
    pub policies: Vec<Policy>,
    pub batch: WriteBatch,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyView {
    pub policy_id: PolicyId,
    pub item_id: ItemId,
    /// Missing when the catalogue no longer knows the item.
    pub catalogue_id: Option<String>,
    pub item_type: ItemType,
    pub owner: Party,
    pub user: Party,
    pub status: PolicyStatus,
    pub expiry_time: Option<DateTime<Utc>>,
    pub expired: bool,
    pub constraints: Constraints,
}
