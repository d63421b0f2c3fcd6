//! Delegations let a provider or consumer hand their authority on one
//! resource server to another user, who then acts as them.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use authgrant_core_types::batch::{ensure_non_empty, ensure_unique};
use authgrant_core_types::{
    ActingUser, AuthError, AuthResult, AuthSettings, DelegationId, DelegationInformation,
    DelegationStatus, ErrorCode, ResourceServerId, Role, User, UserId,
};
use authgrant_entity_store::{
    Delegation, DelegationFilter, EntityStore, ResourceServer, WriteBatch, WriteOp,
};
use authgrant_ports::{Party, RegistrationService};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDelegationRequest {
    pub delegate_email: String,
    pub resource_server_url: String,
    pub role: Role,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationView {
    pub id: DelegationId,
    pub owner: Party,
    pub user: Party,
    pub url: Option<String>,
    pub role: Role,
}

#[derive(Clone)]
pub struct DelegationManager {
    store: Arc<dyn EntityStore>,
    registry: Arc<dyn RegistrationService>,
    settings: Arc<AuthSettings>,
}

impl DelegationManager {
    pub fn new(
        store: Arc<dyn EntityStore>,
        registry: Arc<dyn RegistrationService>,
        settings: Arc<AuthSettings>,
    ) -> Self {
        Self {
            store,
            registry,
            settings,
        }
    }

    pub async fn create_delegation(
        &self,
        requests: Vec<CreateDelegationRequest>,
        user: &User,
        auth_delegate: Option<&DelegationInformation>,
    ) -> AuthResult<Vec<Delegation>> {
        let acting = user.acting_as(auth_delegate, &self.settings)?;
        if !acting.is_auth_delegate() {
            user.require_any_role(&[Role::Provider, Role::Consumer])?;
        }
        ensure_non_empty(&requests)?;
        if let Some(bad) = requests.iter().find(|r| !r.role.is_delegable()) {
            return Err(AuthError::invalid_input(
                ErrorCode::InvalidRole,
                format!("{} authority cannot be delegated", bad.role),
            )
            .with_id(&bad.delegate_email));
        }
        ensure_unique(&requests, |r| {
            format!(
                "{}/{}/{}",
                r.delegate_email.to_lowercase(),
                r.resource_server_url,
                r.role
            )
        })?;

        let emails: BTreeSet<String> = requests
            .iter()
            .map(|r| r.delegate_email.to_lowercase())
            .collect();
        let identities = self
            .registry
            .find_user_by_email(&emails)
            .await
            .map_err(|err| err.into_auth(ErrorCode::EmailsNotFound))?;
        let servers = self.resolve_servers(&requests).await?;
        let role_mapping = self.role_mapping(user, &acting).await?;

        let mut targets = Vec::with_capacity(requests.len());
        for request in &requests {
            let url = request.resource_server_url.as_str();
            let server = servers.get(url).ok_or_else(|| {
                AuthError::invalid_input(
                    ErrorCode::InvalidResourceServer,
                    "resource server is not registered",
                )
                .with_id(url)
            })?;
            let is_auth_server = url == self.settings.auth_server_url;
            if is_auth_server && acting.is_auth_delegate() {
                return Err(AuthError::forbidden_role(
                    ErrorCode::AuthDelegateCannotCreateAuthDelegate,
                    "an auth delegate cannot appoint another auth delegate",
                )
                .with_id(&request.delegate_email));
            }
            if !holds_role_for(&role_mapping, request.role, url, is_auth_server) {
                return Err(AuthError::invalid_input(
                    ErrorCode::MissingRoleForRs,
                    format!("caller does not hold the {} role on {url}", request.role),
                )
                .with_id(url));
            }
            let delegate = identities
                .get(&request.delegate_email.to_lowercase())
                .ok_or_else(|| {
                    AuthError::invalid_input(ErrorCode::EmailsNotFound, "email not registered")
                        .with_id(&request.delegate_email)
                })?;
            if delegate.user_id == acting.user_id {
                return Err(AuthError::invalid_input(
                    ErrorCode::SelfDelegation,
                    "a user cannot delegate to themselves",
                )
                .with_id(&request.delegate_email));
            }
            targets.push((delegate.user_id, server.id, request.role));
        }

        let active = self
            .store
            .delegations(&DelegationFilter {
                owner_id: Some(acting.user_id),
                status: Some(DelegationStatus::Active),
                ..Default::default()
            })
            .await?;
        let conflicts: Vec<DelegationId> = active
            .iter()
            .filter(|row| {
                targets.iter().any(|(user_id, rs, role)| {
                    row.user_id == *user_id && row.resource_server_id == *rs && row.role == *role
                })
            })
            .map(|row| row.id)
            .collect();
        if !conflicts.is_empty() {
            return Err(AuthError::already_exists(
                ErrorCode::DelegationAlreadyExists,
                "delegation already exists",
            )
            .with_ids(conflicts));
        }

        let now = Utc::now();
        let rows: Vec<Delegation> = targets
            .into_iter()
            .map(|(user_id, resource_server_id, role)| Delegation {
                id: DelegationId::new(),
                owner_id: acting.user_id,
                user_id,
                resource_server_id,
                role,
                status: DelegationStatus::Active,
                created_at: now,
                updated_at: now,
            })
            .collect();
        let batch: WriteBatch = rows.iter().cloned().map(WriteOp::InsertDelegation).collect();
        self.store.commit(batch).await?;

        info!(
            owner = %acting.user_id,
            delegate = ?acting.delegate_id,
            count = rows.len(),
            "delegations created"
        );
        Ok(rows)
    }

    /// Active delegations where the caller is either side.
    pub async fn list_delegation(
        &self,
        user: &User,
        auth_delegate: Option<&DelegationInformation>,
    ) -> AuthResult<Vec<DelegationView>> {
        let acting = user.acting_as(auth_delegate, &self.settings)?;
        if !acting.is_auth_delegate() {
            user.require_any_role(&[Role::Consumer, Role::Provider, Role::Delegate])?;
        }

        let rows = self
            .store
            .delegations(&DelegationFilter {
                party: Some(acting.user_id),
                status: Some(DelegationStatus::Active),
                ..Default::default()
            })
            .await?;

        let mut server_ids: Vec<ResourceServerId> =
            rows.iter().map(|row| row.resource_server_id).collect();
        server_ids.sort();
        server_ids.dedup();
        let urls: HashMap<ResourceServerId, String> = self
            .store
            .resource_servers(&server_ids)
            .await?
            .into_iter()
            .map(|server| (server.id, server.url))
            .collect();

        let mut parties: Vec<UserId> = rows
            .iter()
            .flat_map(|row| [row.owner_id, row.user_id])
            .collect();
        parties.sort();
        parties.dedup();
        let details = self
            .registry
            .get_user_details(&parties)
            .await
            .map_err(|err| err.into_auth(ErrorCode::UserNotFound))?;

        Ok(rows
            .into_iter()
            .map(|row| DelegationView {
                id: row.id,
                owner: Party::resolve(row.owner_id, &details),
                user: Party::resolve(row.user_id, &details),
                url: urls.get(&row.resource_server_id).cloned(),
                role: row.role,
            })
            .collect())
    }

    pub async fn delete_delegation(
        &self,
        ids: Vec<DelegationId>,
        user: &User,
        auth_delegate: Option<&DelegationInformation>,
    ) -> AuthResult<Vec<DelegationId>> {
        let acting = user.acting_as(auth_delegate, &self.settings)?;
        if !acting.is_auth_delegate() {
            user.require_any_role(&[Role::Provider, Role::Consumer])?;
        }
        ensure_non_empty(&ids)?;
        ensure_unique(&ids, |id| *id)?;

        let rows: HashMap<DelegationId, Delegation> = self
            .store
            .delegations(&DelegationFilter {
                ids: Some(ids.clone()),
                ..Default::default()
            })
            .await?
            .into_iter()
            .map(|row| (row.id, row))
            .collect();

        let mut batch = WriteBatch::new();
        for id in &ids {
            let owned_and_active = rows.get(id).is_some_and(|row| {
                row.owner_id == acting.user_id && row.status == DelegationStatus::Active
            });
            if !owned_and_active {
                debug!(id = %id, owner = %acting.user_id, "delegation delete refused");
                return Err(AuthError::not_found(
                    ErrorCode::InvalidDelegationId,
                    "delegation does not exist or is not active",
                )
                .with_id(id));
            }
            batch.push(WriteOp::SetDelegationStatus {
                id: *id,
                from: DelegationStatus::Active,
                to: DelegationStatus::Deleted,
            });
        }
        self.store.commit(batch).await?;

        info!(owner = %acting.user_id, count = ids.len(), "delegations deleted");
        Ok(ids)
    }

    /// Emails of the users `owner_id` has actively delegated `role` to on
    /// the given server. Unknown owners or servers yield an empty list.
    pub async fn get_delegate_emails(
        &self,
        trustee: &User,
        owner_id: UserId,
        role: Role,
        resource_server_url: &str,
    ) -> AuthResult<Vec<String>> {
        trustee.require_any_role(&[Role::Trustee])?;

        let Some(server) = self
            .store
            .resource_server_by_url(resource_server_url)
            .await?
        else {
            return Ok(Vec::new());
        };
        let delegates: Vec<UserId> = self
            .store
            .delegations(&DelegationFilter {
                owner_id: Some(owner_id),
                resource_server_id: Some(server.id),
                role: Some(role),
                status: Some(DelegationStatus::Active),
                ..Default::default()
            })
            .await?
            .into_iter()
            .map(|row| row.user_id)
            .collect();
        if delegates.is_empty() {
            return Ok(Vec::new());
        }

        let details = self
            .registry
            .get_user_details(&delegates)
            .await
            .map_err(|err| err.into_auth(ErrorCode::UserNotFound))?;
        Ok(delegates
            .iter()
            .filter_map(|id| details.get(id).map(|d| d.email.clone()))
            .collect())
    }

    async fn resolve_servers(
        &self,
        requests: &[CreateDelegationRequest],
    ) -> AuthResult<HashMap<String, ResourceServer>> {
        let urls: BTreeSet<&str> = requests
            .iter()
            .map(|r| r.resource_server_url.as_str())
            .collect();
        let mut servers = HashMap::with_capacity(urls.len());
        for url in urls {
            if let Some(server) = self.store.resource_server_by_url(url).await? {
                servers.insert(url.to_string(), server);
            }
        }
        Ok(servers)
    }

    /// Roles per server for whoever the delegations will be issued by. An
    /// auth delegate borrows the mapping of the provider it acts for.
    async fn role_mapping(
        &self,
        user: &User,
        acting: &ActingUser,
    ) -> AuthResult<BTreeMap<Role, Vec<String>>> {
        if !acting.is_auth_delegate() {
            return Ok(user.rs_mapping.clone());
        }
        self.registry
            .get_role_mapping(acting.user_id)
            .await
            .map_err(|err| err.into_auth(ErrorCode::UserNotFound))
    }
}

/// Holding PROVIDER on any server is enough to appoint an auth delegate.
fn holds_role_for(
    mapping: &BTreeMap<Role, Vec<String>>,
    role: Role,
    url: &str,
    is_auth_server: bool,
) -> bool {
    let servers = mapping.get(&role).map(Vec::as_slice).unwrap_or_default();
    if is_auth_server {
        return role == Role::Provider && !servers.is_empty();
    }
    servers.iter().any(|server| server == url)
}
