use std::fmt;

use serde::{Deserialize, Serialize};

/// Roles a user can hold on the platform.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Consumer,
    Provider,
    Delegate,
    Admin,
    CosAdmin,
    Trustee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Consumer => "CONSUMER",
            Role::Provider => "PROVIDER",
            Role::Delegate => "DELEGATE",
            Role::Admin => "ADMIN",
            Role::CosAdmin => "COS_ADMIN",
            Role::Trustee => "TRUSTEE",
        }
    }

    /// Roles that may be handed to someone else through a delegation.
    pub fn is_delegable(&self) -> bool {
        matches!(self, Role::Provider | Role::Consumer)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of catalogue entry an access grant refers to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    Resource,
    ResourceGroup,
    ResourceServer,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Resource => "RESOURCE",
            ItemType::ResourceGroup => "RESOURCE_GROUP",
            ItemType::ResourceServer => "RESOURCE_SERVER",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a catalogue item.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessPolicy {
    Open,
    Secure,
    Pii,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyStatus {
    Active,
    Deleted,
}

impl PolicyStatus {
    pub fn can_transition_to(&self, next: PolicyStatus) -> bool {
        matches!((self, next), (PolicyStatus::Active, PolicyStatus::Deleted))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DelegationStatus {
    Active,
    Deleted,
}

impl DelegationStatus {
    pub fn can_transition_to(&self, next: DelegationStatus) -> bool {
        matches!(
            (self, next),
            (DelegationStatus::Active, DelegationStatus::Deleted)
        )
    }
}

/// Lifecycle of a consumer's access request.
///
/// `Pending` is the only non-terminal state; every other state is final.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Pending,
    Approved,
    Rejected,
    Withdrawn,
}

impl NotificationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, NotificationStatus::Pending)
    }

    pub fn can_transition_to(&self, next: NotificationStatus) -> bool {
        matches!(self, NotificationStatus::Pending) && next.is_terminal()
    }
}
