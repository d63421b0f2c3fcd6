use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use authgrant_core_types::{
    Constraints, DelegationId, DelegationStatus, IsoDuration, ItemId, ItemType, NotificationId,
    NotificationStatus, PolicyId, PolicyStatus, ResourceServerId, Role, UserId,
};

/// A direct, durable access grant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub id: PolicyId,
    pub owner_id: UserId,
    pub user_id: UserId,
    pub item_id: ItemId,
    pub item_type: ItemType,
    pub resource_server_id: ResourceServerId,
    pub status: PolicyStatus,
    pub expiry_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub constraints: Constraints,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Policy {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry_time.map(|expiry| expiry <= now).unwrap_or(false)
    }
}

/// Authority to act as `owner_id` for a (resource server, role) pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delegation {
    pub id: DelegationId,
    pub owner_id: UserId,
    pub user_id: UserId,
    pub resource_server_id: ResourceServerId,
    pub role: Role,
    pub status: DelegationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A consumer's request for access to an item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyNotification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub item_id: ItemId,
    pub item_type: ItemType,
    pub owner_id: UserId,
    pub resource_server_id: ResourceServerId,
    pub status: NotificationStatus,
    pub expiry_duration: IsoDuration,
    #[serde(default)]
    pub constraints: Constraints,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceServer {
    pub id: ResourceServerId,
    pub url: String,
    pub owner_id: UserId,
    pub name: String,
}

/// Row selection for [`Policy`] reads. Unset fields match everything.
#[derive(Clone, Debug, Default)]
pub struct PolicyFilter {
    pub ids: Option<Vec<PolicyId>>,
    pub owner_id: Option<UserId>,
    pub user_id: Option<UserId>,
    /// Matches rows where the user is either owner or grantee.
    pub party: Option<UserId>,
    pub item_ids: Option<Vec<ItemId>>,
    pub status: Option<PolicyStatus>,
}

impl PolicyFilter {
    pub fn matches(&self, row: &Policy) -> bool {
        self.ids.as_ref().map_or(true, |ids| ids.contains(&row.id))
            && self.owner_id.map_or(true, |id| row.owner_id == id)
            && self.user_id.map_or(true, |id| row.user_id == id)
            && self
                .party
                .map_or(true, |id| row.owner_id == id || row.user_id == id)
            && self
                .item_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&row.item_id))
            && self.status.map_or(true, |status| row.status == status)
    }
}

#[derive(Clone, Debug, Default)]
pub struct DelegationFilter {
    pub ids: Option<Vec<DelegationId>>,
    pub owner_id: Option<UserId>,
    pub user_id: Option<UserId>,
    /// Matches rows where the user is either delegator or delegate.
    pub party: Option<UserId>,
    pub resource_server_id: Option<ResourceServerId>,
    pub role: Option<Role>,
    pub status: Option<DelegationStatus>,
}

impl DelegationFilter {
    pub fn matches(&self, row: &Delegation) -> bool {
        self.ids.as_ref().map_or(true, |ids| ids.contains(&row.id))
            && self.owner_id.map_or(true, |id| row.owner_id == id)
            && self.user_id.map_or(true, |id| row.user_id == id)
            && self
                .party
                .map_or(true, |id| row.owner_id == id || row.user_id == id)
            && self
                .resource_server_id
                .map_or(true, |id| row.resource_server_id == id)
            && self.role.map_or(true, |role| row.role == role)
            && self.status.map_or(true, |status| row.status == status)
    }
}

#[derive(Clone, Debug, Default)]
pub struct NotificationFilter {
    pub ids: Option<Vec<NotificationId>>,
    pub user_id: Option<UserId>,
    pub owner_ids: Option<Vec<UserId>>,
    pub item_ids: Option<Vec<ItemId>>,
    pub status: Option<NotificationStatus>,
}

impl NotificationFilter {
    pub fn matches(&self, row: &PolicyNotification) -> bool {
        self.ids.as_ref().map_or(true, |ids| ids.contains(&row.id))
            && self.user_id.map_or(true, |id| row.user_id == id)
            && self
                .owner_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&row.owner_id))
            && self
                .item_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&row.item_id))
            && self.status.map_or(true, |status| row.status == status)
    }
}
