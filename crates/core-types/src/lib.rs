//! Shared primitives for the authgrant crates: identifiers, roles, the caller
//! identity handed over by the API layer, and the error taxonomy every
//! manager reports through.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod batch;
pub mod caller;
pub mod duration;
pub mod errors;
pub mod role;
pub mod settings;

pub use caller::{ActingUser, DelegationInformation, User, UserName};
pub use duration::IsoDuration;
pub use errors::{AuthError, AuthResult, ErrorCode, ErrorKind};
pub use role::{
    AccessPolicy, DelegationStatus, ItemType, NotificationStatus, PolicyStatus, Role,
};
pub use settings::{AuthSettings, NotificationSettings};

/// Opaque key/value constraints attached to policies and requests.
pub type Constraints = serde_json::Map<String, serde_json::Value>;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(raw.trim()).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }
    };
}

uuid_id!(
    /// Identity of a registered user.
    UserId
);
uuid_id!(
    /// Primary key of a policy row.
    PolicyId
);
uuid_id!(
    /// Primary key of a delegation row.
    DelegationId
);
uuid_id!(
    /// Primary key of a policy notification (access request) row.
    NotificationId
);
uuid_id!(
    /// Primary key of a registered resource server.
    ResourceServerId
);
uuid_id!(
    /// Catalogue-internal item handle.
    ItemId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_parse_and_display_round_trip() {
        let id = PolicyId::new();
        let parsed: PolicyId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn ids_reject_malformed_handles() {
        assert!("not-a-uuid".parse::<ItemId>().is_err());
        assert!("".parse::<ItemId>().is_err());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = UserId::new();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::Value::String(id.to_string()));
    }
}
