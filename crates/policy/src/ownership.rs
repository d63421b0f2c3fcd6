use std::collections::HashSet;
use std::sync::Arc;

use authgrant_core_types::{AuthResult, DelegationStatus, ResourceServerId, Role, UserId};
use authgrant_entity_store::{DelegationFilter, EntityStore};

/// Items a user may act on as owner: their own, plus those of every provider
/// who delegated PROVIDER authority to them for the item's resource server.
/// Delegations are followed one hop only.
#[derive(Clone, Debug)]
pub struct OwnershipScope {
    user_id: UserId,
    delegated: HashSet<(UserId, ResourceServerId)>,
}

impl OwnershipScope {
    pub fn direct(user_id: UserId) -> Self {
        Self {
            user_id,
            delegated: HashSet::new(),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn owns(&self, owner_id: UserId, resource_server_id: ResourceServerId) -> bool {
        owner_id == self.user_id || self.delegated.contains(&(owner_id, resource_server_id))
    }

    /// Providers whose items are reachable through a delegation.
    pub fn delegators(&self) -> Vec<UserId> {
        let mut owners: Vec<UserId> = self.delegated.iter().map(|(owner, _)| *owner).collect();
        owners.sort();
        owners.dedup();
        owners
    }
}

#[derive(Clone)]
pub struct OwnershipResolver {
    store: Arc<dyn EntityStore>,
}

impl OwnershipResolver {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Snapshot of what `user_id` owns, read once per operation.
    pub async fn scope_for(&self, user_id: UserId) -> AuthResult<OwnershipScope> {
        let filter = DelegationFilter {
            user_id: Some(user_id),
            role: Some(Role::Provider),
            status: Some(DelegationStatus::Active),
            ..Default::default()
        };
        let delegated = self
            .store
            .delegations(&filter)
            .await?
            .into_iter()
            .map(|row| (row.owner_id, row.resource_server_id))
            .collect();
        Ok(OwnershipScope { user_id, delegated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use authgrant_core_types::DelegationId;
    use authgrant_entity_store::{Delegation, InMemoryEntityStore, WriteBatch, WriteOp};
    use chrono::Utc;

    fn row(owner: UserId, user: UserId, rs: ResourceServerId, role: Role) -> Delegation {
        Delegation {
            id: DelegationId::new(),
            owner_id: owner,
            user_id: user,
            resource_server_id: rs,
            role,
            status: DelegationStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn delegation_reaches_one_hop_on_one_server() {
        let store = InMemoryEntityStore::new();
        let (provider, delegate, second) = (UserId::new(), UserId::new(), UserId::new());
        let (alpha, bravo) = (ResourceServerId::new(), ResourceServerId::new());
        let batch: WriteBatch = vec![
            WriteOp::InsertDelegation(row(provider, delegate, alpha, Role::Provider)),
            WriteOp::InsertDelegation(row(delegate, second, alpha, Role::Provider)),
            WriteOp::InsertDelegation(row(provider, second, bravo, Role::Consumer)),
        ]
        .into_iter()
        .collect();
        store.commit(batch).await.unwrap();

        let resolver = OwnershipResolver::new(store);
        let scope = resolver.scope_for(delegate).await.unwrap();
        assert!(scope.owns(delegate, bravo));
        assert!(scope.owns(provider, alpha));
        assert!(!scope.owns(provider, bravo));

        // second -> delegate -> provider is two hops
        let scope = resolver.scope_for(second).await.unwrap();
        assert!(scope.owns(delegate, alpha));
        assert!(!scope.owns(provider, alpha));
        assert!(!scope.owns(provider, bravo));
        assert_eq!(scope.delegators(), vec![delegate]);
    }
}
