use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{info, warn};

use authgrant_core_types::{
    AccessPolicy, AuthError, AuthResult, DelegationInformation, ErrorCode, ItemId, Role, User,
    UserId,
};
use authgrant_ports::{ApdRequest, ApdService, CatalogueClient, PortError, ResourceDetails};

use crate::model::{AccessAuditEvent, AccessGrant, GrantStatus, TokenRequest};

const AUDIT_CAPACITY: usize = 128;

/// Whom the decision is made for, after unwrapping a delegation.
struct Principal {
    user_id: UserId,
    role: Role,
    delegated: bool,
}

/// Decides whether a caller may obtain a token for one item.
///
/// Decisions are never cached: every call reads the catalogue and, for
/// consumers, asks the item's APD afresh.
pub struct AccessVerifier {
    catalogue: Arc<dyn CatalogueClient>,
    apd: Arc<dyn ApdService>,
    events: broadcast::Sender<AccessAuditEvent>,
}

impl AccessVerifier {
    pub fn new(catalogue: Arc<dyn CatalogueClient>, apd: Arc<dyn ApdService>) -> Self {
        let (events, _rx) = broadcast::channel(AUDIT_CAPACITY);
        Self {
            catalogue,
            apd,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AccessAuditEvent> {
        self.events.subscribe()
    }

    pub async fn verify_resource_access(
        &self,
        request: &TokenRequest,
        delegation: Option<&DelegationInformation>,
        user: &User,
    ) -> AuthResult<AccessGrant> {
        let principal = effective_principal(request, delegation, user);
        let outcome = self.decide(request, delegation, user).await;
        self.publish_event(user, principal, request, &outcome);
        outcome
    }

    async fn decide(
        &self,
        request: &TokenRequest,
        delegation: Option<&DelegationInformation>,
        user: &User,
    ) -> AuthResult<AccessGrant> {
        check_token_role(request.role, user)?;
        let delegation = match (request.role, delegation) {
            (Role::Delegate, None) => {
                return Err(AuthError::invalid_input(
                    ErrorCode::MissingDelegationInfo,
                    "delegate token requests need a delegation",
                ))
            }
            (Role::Delegate, Some(info)) => Some(info),
            _ => None,
        };

        let item_id: ItemId = request.item_id.parse().map_err(|_| {
            AuthError::invalid_input(ErrorCode::IncorrectItemId, "item id is not a valid handle")
                .with_id(&request.item_id)
        })?;
        let details = self.catalogue.get_resource_details(item_id).await?;

        let principal = match delegation {
            None => {
                check_rs_role(user, request.role, &details.resource_server_url)?;
                Principal {
                    user_id: user.user_id,
                    role: request.role,
                    delegated: false,
                }
            }
            Some(info) => {
                if info.resource_server_url != details.resource_server_url {
                    return Err(AuthError::access_denied(
                        ErrorCode::DelegatedRsUrlNotMatchItemRs,
                        "delegation is for a different resource server than the item",
                    )
                    .with_id(info.delegation_id));
                }
                Principal {
                    user_id: info.delegator_user_id,
                    role: info.delegated_role,
                    delegated: true,
                }
            }
        };

        let apd = match principal.role {
            Role::Provider => {
                check_provider_access(&principal, &details, &request.item_id)?;
                None
            }
            Role::Consumer => self.consult_apd(&principal, item_id, &details, request).await?,
            other => {
                return Err(AuthError::forbidden_role(
                    ErrorCode::InvalidRoleForToken,
                    format!("{other} access cannot be delegated"),
                ))
            }
        };

        Ok(AccessGrant {
            status: GrantStatus::Success,
            catalogue_id: details.catalogue_id,
            resource_group_id: details.resource_group_id,
            resource_server_url: details.resource_server_url,
            delegator_user_id: principal.delegated.then_some(principal.user_id),
            delegated_role: principal.delegated.then_some(principal.role),
            apd,
        })
    }

    /// The APD's payload is returned as-is; only a failed call denies.
    async fn consult_apd(
        &self,
        principal: &Principal,
        item_id: ItemId,
        details: &ResourceDetails,
        request: &TokenRequest,
    ) -> AuthResult<Option<Value>> {
        let Some(apd_url) = details.apd_url.clone() else {
            return Ok(None);
        };
        let answer = self
            .apd
            .call_apd(ApdRequest {
                apd_url,
                item_id,
                item_type: details.item_type,
                owner_id: details.owner_id,
                resource_server_url: details.resource_server_url.clone(),
                user_id: principal.user_id,
                context: request.context.clone(),
            })
            .await
            .map_err(|err| {
                warn!(item = %item_id, error = %err, "apd call failed");
                apd_failure(err)
            })?;
        Ok(Some(answer))
    }

    fn publish_event(
        &self,
        user: &User,
        principal: Option<UserId>,
        request: &TokenRequest,
        outcome: &AuthResult<AccessGrant>,
    ) {
        match outcome {
            Ok(_) => info!(
                caller = %user.user_id,
                item = %request.item_id,
                role = %request.role,
                "access granted"
            ),
            Err(err) => info!(
                caller = %user.user_id,
                item = %request.item_id,
                role = %request.role,
                code = %err.code,
                "access denied"
            ),
        }
        if self.events.receiver_count() == 0 {
            return;
        }
        let event = AccessAuditEvent {
            caller: user.user_id,
            principal,
            item_id: request.item_id.clone(),
            role: request.role,
            allowed: outcome.is_ok(),
            code: outcome.as_ref().err().map(|err| err.code),
            at: Utc::now(),
        };
        if let Err(err) = self.events.send(event) {
            warn!(target = "access-verifier", "failed to publish audit event: {err}");
        }
    }
}

fn check_token_role(role: Role, user: &User) -> AuthResult<()> {
    let requestable = matches!(role, Role::Consumer | Role::Provider | Role::Delegate);
    if requestable && user.has_role(role) {
        return Ok(());
    }
    Err(AuthError::forbidden_role(
        ErrorCode::InvalidRoleForToken,
        format!("a {role} token cannot be issued to this caller"),
    ))
}

fn check_rs_role(user: &User, role: Role, url: &str) -> AuthResult<()> {
    if user.has_role_for(role, url) {
        return Ok(());
    }
    let code = match role {
        Role::Provider => ErrorCode::ProviderDoesntHaveRsRole,
        _ => ErrorCode::ConsumerDoesntHaveRsRole,
    };
    Err(AuthError::forbidden_role(
        code,
        format!("caller does not hold {role} on {url}"),
    )
    .with_id(url))
}

fn check_provider_access(
    principal: &Principal,
    details: &ResourceDetails,
    item_id: &str,
) -> AuthResult<()> {
    if principal.user_id != details.owner_id {
        return Err(
            AuthError::access_denied(ErrorCode::NotResOwner, "principal does not own the item")
                .with_id(item_id),
        );
    }
    if details.access_policy == AccessPolicy::Pii {
        return Err(AuthError::access_denied(
            ErrorCode::ProviderCannotAccessPiiRes,
            "providers cannot obtain tokens for PII items",
        )
        .with_id(item_id));
    }
    Ok(())
}

/// Best guess at the principal for auditing, available even when the
/// decision fails early.
fn effective_principal(
    request: &TokenRequest,
    delegation: Option<&DelegationInformation>,
    user: &User,
) -> Option<UserId> {
    match (request.role, delegation) {
        (Role::Delegate, Some(info)) => Some(info.delegator_user_id),
        (Role::Delegate, None) => None,
        _ => Some(user.user_id),
    }
}

/// Any APD failure is an upstream denial, including an APD that does not
/// know the item.
fn apd_failure(err: PortError) -> AuthError {
    match err {
        PortError::NotFound { .. } => AuthError::upstream(Some(404), err.to_string()),
        other => other.into_auth(ErrorCode::UpstreamFailure),
    }
}
