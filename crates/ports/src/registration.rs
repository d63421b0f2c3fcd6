use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use authgrant_core_types::{Role, User, UserId, UserName};

use crate::errors::{PortError, PortResult};

const SERVICE: &str = "registration";

/// Result of an email lookup.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: UserId,
    pub name: UserName,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetails {
    pub email: String,
    pub name: UserName,
}

/// One side of a policy, delegation or request, as shown in listings.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<UserName>,
}

impl Party {
    /// Enriches `id` from a directory lookup; ids the directory did not
    /// return are shown bare.
    pub fn resolve(id: UserId, details: &HashMap<UserId, UserDetails>) -> Self {
        match details.get(&id) {
            Some(found) => Self {
                id,
                email: Some(found.email.clone()),
                name: Some(found.name.clone()),
            },
            None => Self {
                id,
                email: None,
                name: None,
            },
        }
    }
}

#[async_trait]
pub trait RegistrationService: Send + Sync {
    /// Keys of the returned map are the lower-cased emails. Fails naming
    /// every email that did not resolve.
    async fn find_user_by_email(
        &self,
        emails: &BTreeSet<String>,
    ) -> PortResult<HashMap<String, Identity>>;

    /// Unknown ids are left out of the map.
    async fn get_user_details(&self, ids: &[UserId]) -> PortResult<HashMap<UserId, UserDetails>>;

    async fn get_role_mapping(&self, id: UserId) -> PortResult<BTreeMap<Role, Vec<String>>>;
}

/// Directory backed by a set of [`User`] records.
#[derive(Default)]
pub struct InMemoryRegistry {
    users: DashMap<UserId, User>,
    by_email: DashMap<String, UserId>,
}

impl InMemoryRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, user: User) {
        self.by_email
            .insert(user.email.to_lowercase(), user.user_id);
        self.users.insert(user.user_id, user);
    }
}

#[async_trait]
impl RegistrationService for InMemoryRegistry {
    async fn find_user_by_email(
        &self,
        emails: &BTreeSet<String>,
    ) -> PortResult<HashMap<String, Identity>> {
        let mut found = HashMap::new();
        let mut missing = Vec::new();
        for email in emails {
            let key = email.to_lowercase();
            let identity = self.by_email.get(&key).and_then(|id| {
                self.users.get(id.value()).map(|user| Identity {
                    user_id: user.user_id,
                    name: user.name.clone(),
                })
            });
            match identity {
                Some(identity) => {
                    found.insert(key, identity);
                }
                None => missing.push(email.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(PortError::not_found(SERVICE, missing));
        }
        Ok(found)
    }

    async fn get_user_details(&self, ids: &[UserId]) -> PortResult<HashMap<UserId, UserDetails>> {
        Ok(ids
            .iter()
            .filter_map(|id| {
                self.users.get(id).map(|user| {
                    (
                        *id,
                        UserDetails {
                            email: user.email.clone(),
                            name: user.name.clone(),
                        },
                    )
                })
            })
            .collect())
    }

    async fn get_role_mapping(&self, id: UserId) -> PortResult<BTreeMap<Role, Vec<String>>> {
        self.users
            .get(&id)
            .map(|user| user.rs_mapping.clone())
            .ok_or_else(|| PortError::not_found(SERVICE, [id]))
    }
}
