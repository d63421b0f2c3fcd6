use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use authgrant_core_types::batch::{ensure_non_empty, ensure_unique};
use authgrant_core_types::{
    ActingUser, AuthError, AuthResult, AuthSettings, DelegationInformation, ErrorCode, ItemId,
    ItemType, PolicyId, PolicyStatus, Role, User, UserId,
};
use authgrant_entity_store::{EntityStore, Policy, PolicyFilter, WriteBatch, WriteOp};
use authgrant_ports::{CatalogueClient, Party, RegistrationService};

use crate::model::{CreatePolicyRequest, Grant, PolicyPlan, PolicyView};
use crate::ownership::{OwnershipResolver, OwnershipScope};

/// Creates, deletes and lists direct grants.
#[derive(Clone)]
pub struct PolicyManager {
    store: Arc<dyn EntityStore>,
    catalogue: Arc<dyn CatalogueClient>,
    registry: Arc<dyn RegistrationService>,
    ownership: OwnershipResolver,
    settings: Arc<AuthSettings>,
}

impl PolicyManager {
    pub fn new(
        store: Arc<dyn EntityStore>,
        catalogue: Arc<dyn CatalogueClient>,
        registry: Arc<dyn RegistrationService>,
        settings: Arc<AuthSettings>,
    ) -> Self {
        Self {
            ownership: OwnershipResolver::new(store.clone()),
            store,
            catalogue,
            registry,
            settings,
        }
    }

    pub fn ownership(&self) -> &OwnershipResolver {
        &self.ownership
    }

    pub async fn create_policy(
        &self,
        requests: Vec<CreatePolicyRequest>,
        user: &User,
        auth_delegate: Option<&DelegationInformation>,
    ) -> AuthResult<Vec<Policy>> {
        let acting = user.acting_as(auth_delegate, &self.settings)?;
        ensure_non_empty(&requests)?;
        for request in &requests {
            check_grant_role(user, &acting, request.item_type)?;
        }
        ensure_unique(&requests, |r| r.item_id.clone())?;

        let grants = self.resolve_items(&requests).await?;
        let plan = self.prepare(&acting, grants, Utc::now()).await?;
        self.store.commit(plan.batch).await?;

        info!(
            acting = %acting.user_id,
            delegate = ?acting.delegate_id,
            count = plan.policies.len(),
            "policies created"
        );
        Ok(plan.policies)
    }

    /// Runs the ownership, grantee, expiry and uniqueness checks on resolved
    /// grants and builds the rows. Each check runs over the whole batch, in
    /// request order, before the next one starts.
    pub async fn prepare(
        &self,
        acting: &ActingUser,
        grants: Vec<Grant>,
        now: DateTime<Utc>,
    ) -> AuthResult<PolicyPlan> {
        let scope = self.ownership.scope_for(acting.user_id).await?;
        for grant in &grants {
            if !scope.owns(grant.owner_id, grant.resource_server_id) {
                debug!(acting = %acting.user_id, item = %grant.item_id, "grant denied, not owner");
                return Err(AuthError::access_denied(
                    ErrorCode::NotResOwner,
                    "caller does not own the item",
                )
                .with_id(grant.item_id));
            }
        }

        let mut grantees: Vec<UserId> = grants.iter().map(|g| g.grantee).collect();
        grantees.sort();
        grantees.dedup();
        let known = self
            .registry
            .get_user_details(&grantees)
            .await
            .map_err(|err| err.into_auth(ErrorCode::UserNotFound))?;
        if let Some(grant) = grants.iter().find(|g| !known.contains_key(&g.grantee)) {
            return Err(AuthError::invalid_input(
                ErrorCode::UserNotFound,
                "grantee is not a registered user",
            )
            .with_id(grant.grantee));
        }

        for grant in &grants {
            if matches!(grant.expiry_time, Some(expiry) if expiry <= now) {
                return Err(AuthError::invalid_input(
                    ErrorCode::InvalidExpiry,
                    "expiry time must be in the future",
                )
                .with_id(grant.item_id));
            }
        }

        let item_ids: Vec<ItemId> = grants.iter().map(|g| g.item_id).collect();
        let active = self
            .store
            .policies(&PolicyFilter {
                item_ids: Some(item_ids),
                status: Some(PolicyStatus::Active),
                ..Default::default()
            })
            .await?;
        for grant in &grants {
            let conflicts: Vec<PolicyId> = active
                .iter()
                .filter(|p| p.user_id == grant.grantee && p.item_id == grant.item_id)
                .map(|p| p.id)
                .collect();
            if !conflicts.is_empty() {
                return Err(AuthError::already_exists(
                    ErrorCode::PolicyAlreadyExists,
                    "an active policy already exists for this user and item",
                )
                .with_ids(conflicts));
            }
        }

        let policies: Vec<Policy> = grants
            .into_iter()
            .map(|grant| Policy {
                id: PolicyId::new(),
                owner_id: grant.owner_id,
                user_id: grant.grantee,
                item_id: grant.item_id,
                item_type: grant.item_type,
                resource_server_id: grant.resource_server_id,
                status: PolicyStatus::Active,
                expiry_time: grant.expiry_time,
                constraints: grant.constraints,
                created_at: now,
                updated_at: now,
            })
            .collect();
        let batch: WriteBatch = policies
            .iter()
            .cloned()
            .map(WriteOp::InsertPolicy)
            .collect();
        Ok(PolicyPlan { policies, batch })
    }

    pub async fn delete_policy(
        &self,
        ids: Vec<PolicyId>,
        user: &User,
        auth_delegate: Option<&DelegationInformation>,
    ) -> AuthResult<Vec<PolicyId>> {
        let acting = user.acting_as(auth_delegate, &self.settings)?;
        if !acting.is_auth_delegate() {
            user.require_any_role(&[Role::Provider, Role::Delegate, Role::Admin])?;
        }
        ensure_non_empty(&ids)?;
        ensure_unique(&ids, |id| *id)?;

        let rows: HashMap<PolicyId, Policy> = self
            .store
            .policies(&PolicyFilter {
                ids: Some(ids.clone()),
                ..Default::default()
            })
            .await?
            .into_iter()
            .map(|row| (row.id, row))
            .collect();
        let scope = self.ownership.scope_for(acting.user_id).await?;

        let mut batch = WriteBatch::new();
        for id in &ids {
            match rows.get(id) {
                Some(row)
                    if row.status == PolicyStatus::Active
                        && scope.owns(row.owner_id, row.resource_server_id) =>
                {
                    batch.push(WriteOp::SetPolicyStatus {
                        id: *id,
                        from: PolicyStatus::Active,
                        to: PolicyStatus::Deleted,
                    });
                }
                _ => {
                    return Err(AuthError::not_found(
                        ErrorCode::InvalidPolicyId,
                        "policy does not exist or is not active",
                    )
                    .with_id(id))
                }
            }
        }
        self.store.commit(batch).await?;

        info!(acting = %acting.user_id, count = ids.len(), "policies deleted");
        Ok(ids)
    }

    /// Active policies the caller granted (directly or as a delegate) or
    /// received.
    pub async fn list_policy(
        &self,
        user: &User,
        auth_delegate: Option<&DelegationInformation>,
    ) -> AuthResult<Vec<PolicyView>> {
        let acting = user.acting_as(auth_delegate, &self.settings)?;
        if !acting.is_auth_delegate() {
            user.require_any_role(&[Role::Consumer, Role::Provider, Role::Delegate, Role::Admin])?;
        }

        let scope = self.ownership.scope_for(acting.user_id).await?;
        let rows = self.visible_policies(&scope).await?;

        let item_ids: Vec<ItemId> = rows.iter().map(|p| p.item_id).collect();
        let cat_ids = self.catalogue.get_cat_ids(&item_ids).await?;
        let mut parties: Vec<UserId> = rows.iter().flat_map(|p| [p.owner_id, p.user_id]).collect();
        parties.sort();
        parties.dedup();
        let details = self
            .registry
            .get_user_details(&parties)
            .await
            .map_err(|err| err.into_auth(ErrorCode::UserNotFound))?;

        let now = Utc::now();
        Ok(rows
            .into_iter()
            .map(|p| PolicyView {
                policy_id: p.id,
                catalogue_id: cat_ids.get(&p.item_id).cloned(),
                item_id: p.item_id,
                item_type: p.item_type,
                owner: Party::resolve(p.owner_id, &details),
                user: Party::resolve(p.user_id, &details),
                status: p.status,
                expired: p.is_expired_at(now),
                expiry_time: p.expiry_time,
                constraints: p.constraints,
            })
            .collect())
    }

    async fn visible_policies(&self, scope: &OwnershipScope) -> AuthResult<Vec<Policy>> {
        let mut rows = self
            .store
            .policies(&PolicyFilter {
                party: Some(scope.user_id()),
                status: Some(PolicyStatus::Active),
                ..Default::default()
            })
            .await?;
        let mut seen: HashSet<PolicyId> = rows.iter().map(|p| p.id).collect();
        for owner in scope.delegators() {
            let delegated = self
                .store
                .policies(&PolicyFilter {
                    owner_id: Some(owner),
                    status: Some(PolicyStatus::Active),
                    ..Default::default()
                })
                .await?;
            rows.extend(delegated.into_iter().filter(|p| {
                scope.owns(p.owner_id, p.resource_server_id) && seen.insert(p.id)
            }));
        }
        Ok(rows)
    }

    /// Catalogue lookup grouped by claimed type, then the type check.
    async fn resolve_items(&self, requests: &[CreatePolicyRequest]) -> AuthResult<Vec<Grant>> {
        let mut grouped: BTreeMap<ItemType, Vec<String>> = BTreeMap::new();
        for request in requests {
            grouped
                .entry(request.item_type)
                .or_default()
                .push(request.item_id.clone());
        }
        let found = self
            .catalogue
            .check_req_items(&grouped)
            .await
            .map_err(|err| err.into_auth(ErrorCode::ItemNotFound))?;

        requests
            .iter()
            .map(|request| {
                let item = found.get(&request.item_id).ok_or_else(|| {
                    AuthError::invalid_input(ErrorCode::ItemNotFound, "item not in catalogue")
                        .with_id(&request.item_id)
                })?;
                if item.item_type != request.item_type {
                    return Err(AuthError::invalid_input(
                        ErrorCode::ItemTypeMismatch,
                        format!(
                            "item is a {}, not a {}",
                            item.item_type, request.item_type
                        ),
                    )
                    .with_id(&request.item_id));
                }
                Ok(Grant {
                    grantee: request.user_id,
                    item_id: item.internal_id,
                    item_type: item.item_type,
                    owner_id: item.owner_id,
                    resource_server_id: item.resource_server_id,
                    expiry_time: request.expiry_time,
                    constraints: request.constraints.clone(),
                })
            })
            .collect()
    }
}

/// ADMIN grants on resource servers; providers, their delegates and auth
/// delegates grant on resources and resource groups.
fn check_grant_role(user: &User, acting: &ActingUser, item_type: ItemType) -> AuthResult<()> {
    let allowed = match item_type {
        ItemType::ResourceServer => !acting.is_auth_delegate() && user.has_role(Role::Admin),
        ItemType::Resource | ItemType::ResourceGroup => {
            acting.is_auth_delegate() || user.has_any_role(&[Role::Provider, Role::Delegate])
        }
    };
    if allowed {
        return Ok(());
    }
    if user.roles.is_empty() {
        return Err(AuthError::unauthorized(
            ErrorCode::InvalidRole,
            "caller holds no role",
        ));
    }
    Err(AuthError::forbidden_role(
        ErrorCode::InvalidRole,
        format!("caller may not grant {item_type} policies"),
    ))
}
