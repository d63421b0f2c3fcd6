use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{AuthError, AuthResult, ErrorCode};
use crate::role::Role;
use crate::settings::AuthSettings;
use crate::{DelegationId, UserId};

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserName {
    pub first_name: String,
    pub last_name: String,
}

impl UserName {
    pub fn new(first: impl Into<String>, last: impl Into<String>) -> Self {
        Self {
            first_name: first.into(),
            last_name: last.into(),
        }
    }
}

/// Authenticated caller as resolved by the API layer.
///
/// `rs_mapping` lists, per role, the resource-server URLs the role is held
/// for. A role may be present in `roles` with no servers attached (e.g.
/// `TRUSTEE`).
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: UserId,
    pub email: String,
    pub name: UserName,
    pub roles: Vec<Role>,
    pub rs_mapping: BTreeMap<Role, Vec<String>>,
}

impl User {
    pub fn new(user_id: UserId, email: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: UserName) -> Self {
        self.name = name;
        self
    }

    /// Grants `role`, scoped to the given resource servers.
    pub fn with_role<I, S>(mut self, role: Role, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if !self.roles.contains(&role) {
            self.roles.push(role);
        }
        let entry = self.rs_mapping.entry(role).or_default();
        for server in servers {
            let server = server.into();
            if !entry.contains(&server) {
                entry.push(server);
            }
        }
        self
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.iter().any(|role| self.has_role(*role))
    }

    /// Role gate for manager operations: 401 unless one of `roles` is held.
    pub fn require_any_role(&self, roles: &[Role]) -> AuthResult<()> {
        if self.has_any_role(roles) {
            return Ok(());
        }
        let wanted: Vec<&str> = roles.iter().map(Role::as_str).collect();
        Err(AuthError::unauthorized(
            ErrorCode::InvalidRole,
            format!("caller needs one of the roles {}", wanted.join(", ")),
        ))
    }

    /// True when `role` is held for the resource server at `url`.
    pub fn has_role_for(&self, role: Role, url: &str) -> bool {
        self.has_role(role)
            && self
                .rs_mapping
                .get(&role)
                .map(|servers| servers.iter().any(|server| server == url))
                .unwrap_or(false)
    }

    pub fn servers_for(&self, role: Role) -> &[String] {
        self.rs_mapping
            .get(&role)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Resolves whom an operation is performed for.
    ///
    /// Without a delegation context the caller acts as themselves. With one,
    /// the caller must be a `DELEGATE` holding an auth-delegate delegation and
    /// then acts as the delegating provider.
    pub fn acting_as(
        &self,
        auth_delegate: Option<&DelegationInformation>,
        settings: &AuthSettings,
    ) -> AuthResult<ActingUser> {
        let Some(info) = auth_delegate else {
            return Ok(ActingUser {
                user_id: self.user_id,
                delegate_id: None,
            });
        };
        if !self.has_role(Role::Delegate) || !info.is_auth_delegate(settings) {
            return Err(AuthError::forbidden_role(
                ErrorCode::InvalidAuthDelegate,
                "delegation context does not make the caller an auth delegate",
            )
            .with_id(info.delegation_id));
        }
        Ok(ActingUser {
            user_id: info.delegator_user_id,
            delegate_id: Some(self.user_id),
        })
    }
}

/// The identity an operation's ownership checks run against.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ActingUser {
    pub user_id: UserId,
    /// Set when an auth delegate acts on behalf of `user_id`.
    pub delegate_id: Option<UserId>,
}

impl ActingUser {
    pub fn is_auth_delegate(&self) -> bool {
        self.delegate_id.is_some()
    }
}

/// Delegation the caller is acting under, already checked upstream to belong
/// to the caller.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationInformation {
    pub delegation_id: DelegationId,
    pub delegator_user_id: UserId,
    pub delegated_role: Role,
    pub resource_server_url: String,
}

impl DelegationInformation {
    /// An auth delegate holds a PROVIDER delegation on the platform's own
    /// administrative server.
    pub fn is_auth_delegate(&self, settings: &AuthSettings) -> bool {
        self.delegated_role == Role::Provider
            && self.resource_server_url == settings.auth_server_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_mapping_is_scoped_per_server() {
        let user = User::new(UserId::new(), "c@example.com")
            .with_role(Role::Consumer, ["alpha.com"])
            .with_role(Role::Provider, ["bravo.com"]);

        assert!(user.has_role_for(Role::Consumer, "alpha.com"));
        assert!(!user.has_role_for(Role::Consumer, "bravo.com"));
        assert!(user.has_role_for(Role::Provider, "bravo.com"));
        assert!(!user.has_role_for(Role::Delegate, "alpha.com"));
    }

    #[test]
    fn with_role_does_not_duplicate_entries() {
        let user = User::new(UserId::new(), "p@example.com")
            .with_role(Role::Provider, ["alpha.com"])
            .with_role(Role::Provider, ["alpha.com", "bravo.com"]);
        assert_eq!(user.roles, vec![Role::Provider]);
        assert_eq!(user.servers_for(Role::Provider), ["alpha.com", "bravo.com"]);
    }

    #[test]
    fn auth_delegate_requires_provider_role_on_auth_server() {
        let settings = AuthSettings::new("authvertx.example.com");
        let mut info = DelegationInformation {
            delegation_id: DelegationId::new(),
            delegator_user_id: UserId::new(),
            delegated_role: Role::Provider,
            resource_server_url: "authvertx.example.com".into(),
        };
        assert!(info.is_auth_delegate(&settings));

        info.delegated_role = Role::Consumer;
        assert!(!info.is_auth_delegate(&settings));

        info.delegated_role = Role::Provider;
        info.resource_server_url = "alpha.com".into();
        assert!(!info.is_auth_delegate(&settings));
    }

    #[test]
    fn auth_delegate_acts_as_the_delegating_provider() {
        let settings = AuthSettings::new("authvertx.example.com");
        let provider = UserId::new();
        let delegate = User::new(UserId::new(), "d@example.com")
            .with_role(Role::Delegate, ["authvertx.example.com"]);
        let info = DelegationInformation {
            delegation_id: DelegationId::new(),
            delegator_user_id: provider,
            delegated_role: Role::Provider,
            resource_server_url: "authvertx.example.com".into(),
        };

        let acting = delegate.acting_as(Some(&info), &settings).unwrap();
        assert_eq!(acting.user_id, provider);
        assert_eq!(acting.delegate_id, Some(delegate.user_id));

        let plain = delegate.acting_as(None, &settings).unwrap();
        assert_eq!(plain.user_id, delegate.user_id);
        assert!(!plain.is_auth_delegate());
    }

    #[test]
    fn non_auth_delegation_context_is_rejected() {
        let settings = AuthSettings::new("authvertx.example.com");
        let delegate =
            User::new(UserId::new(), "d@example.com").with_role(Role::Delegate, ["alpha.com"]);
        let info = DelegationInformation {
            delegation_id: DelegationId::new(),
            delegator_user_id: UserId::new(),
            delegated_role: Role::Provider,
            resource_server_url: "alpha.com".into(),
        };
        let err = delegate.acting_as(Some(&info), &settings).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidAuthDelegate);
        assert_eq!(err.status, 403);
    }
}
