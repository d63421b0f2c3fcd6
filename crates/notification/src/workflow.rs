use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use authgrant_core_types::batch::{ensure_non_empty, ensure_unique};
use authgrant_core_types::{
    ActingUser, AuthError, AuthResult, AuthSettings, DelegationInformation, ErrorCode, ItemId,
    ItemType, NotificationId, NotificationSettings, NotificationStatus, Role, User, UserId,
};
use authgrant_entity_store::{
    EntityStore, NotificationFilter, PolicyNotification, WriteBatch, WriteOp,
};
use authgrant_policy::{Grant, PolicyManager};
use authgrant_ports::{
    CatalogueClient, EmailClient, EmailMessage, Party, RegistrationService, RequestOutcome,
};

use crate::model::{
    CreateNotificationRequest, NotificationView, UpdateNotificationRequest, UpdateSummary,
};

/// Consumer requests and the provider side of answering them.
///
/// A request is PENDING until the consumer withdraws it or a provider
/// approves or rejects it. Every other state is final, and acting on a
/// request in a final state fails exactly like acting on an unknown id.
#[derive(Clone)]
pub struct NotificationWorkflow {
    store: Arc<dyn EntityStore>,
    catalogue: Arc<dyn CatalogueClient>,
    registry: Arc<dyn RegistrationService>,
    email: Arc<dyn EmailClient>,
    policies: PolicyManager,
    settings: Arc<AuthSettings>,
    notify: NotificationSettings,
}

impl NotificationWorkflow {
    pub fn new(
        store: Arc<dyn EntityStore>,
        catalogue: Arc<dyn CatalogueClient>,
        registry: Arc<dyn RegistrationService>,
        email: Arc<dyn EmailClient>,
        policies: PolicyManager,
        settings: Arc<AuthSettings>,
        notify: NotificationSettings,
    ) -> Self {
        Self {
            store,
            catalogue,
            registry,
            email,
            policies,
            settings,
            notify,
        }
    }

    pub async fn create_policy_notification(
        &self,
        requests: Vec<CreateNotificationRequest>,
        consumer: &User,
    ) -> AuthResult<Vec<PolicyNotification>> {
        consumer.require_any_role(&[Role::Consumer])?;
        ensure_non_empty(&requests)?;
        ensure_unique(&requests, |r| r.item_id.clone())?;

        let mut grouped: BTreeMap<ItemType, Vec<String>> = BTreeMap::new();
        for request in &requests {
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

        let now = Utc::now();
        let mut rows = Vec::with_capacity(requests.len());
        for request in requests {
            let item = found.get(&request.item_id).ok_or_else(|| {
                AuthError::invalid_input(ErrorCode::ItemNotFound, "item not in catalogue")
                    .with_id(&request.item_id)
            })?;
            if item.item_type != request.item_type {
                return Err(AuthError::invalid_input(
                    ErrorCode::ItemTypeMismatch,
                    format!("item is a {}, not a {}", item.item_type, request.item_type),
                )
                .with_id(&request.item_id));
            }
            rows.push(PolicyNotification {
                id: NotificationId::new(),
                user_id: consumer.user_id,
                item_id: item.internal_id,
                item_type: item.item_type,
                owner_id: item.owner_id,
                resource_server_id: item.resource_server_id,
                status: NotificationStatus::Pending,
                expiry_duration: request.expiry_duration,
                constraints: request.constraints,
                created_at: now,
                updated_at: now,
            });
        }

        let pending = self
            .store
            .notifications(&NotificationFilter {
                user_id: Some(consumer.user_id),
                item_ids: Some(rows.iter().map(|row| row.item_id).collect()),
                status: Some(NotificationStatus::Pending),
                ..Default::default()
            })
            .await?;
        for row in &rows {
            let existing: Vec<NotificationId> = pending
                .iter()
                .filter(|p| p.item_id == row.item_id)
                .map(|p| p.id)
                .collect();
            if !existing.is_empty() {
                return Err(AuthError::already_exists(
                    ErrorCode::RequestAlreadyExists,
                    "a pending request for this item already exists",
                )
                .with_ids(existing));
            }
        }

        let batch: WriteBatch = rows
            .iter()
            .cloned()
            .map(WriteOp::InsertNotification)
            .collect();
        self.store.commit(batch).await?;

        info!(consumer = %consumer.user_id, count = rows.len(), "access requests created");
        Ok(rows)
    }

    /// Consumers see their own requests; providers and auth delegates see the
    /// requests made against items they own. A caller holding both roles sees
    /// both sets.
    pub async fn list_policy_notification(
        &self,
        user: &User,
        auth_delegate: Option<&DelegationInformation>,
    ) -> AuthResult<Vec<NotificationView>> {
        let acting = user.acting_as(auth_delegate, &self.settings)?;
        let as_provider = acting.is_auth_delegate() || user.has_role(Role::Provider);
        let as_consumer = !acting.is_auth_delegate() && user.has_role(Role::Consumer);
        if !as_provider && !as_consumer {
            return Err(AuthError::unauthorized(
                ErrorCode::InvalidRole,
                "caller needs one of the roles CONSUMER, PROVIDER",
            ));
        }

        let mut rows = Vec::new();
        let mut seen = HashSet::new();
        if as_consumer {
            let own = self
                .store
                .notifications(&NotificationFilter {
                    user_id: Some(acting.user_id),
                    ..Default::default()
                })
                .await?;
            rows.extend(own.into_iter().filter(|row| seen.insert(row.id)));
        }
        if as_provider {
            let scope = self.policies.ownership().scope_for(acting.user_id).await?;
            let mut owners = scope.delegators();
            owners.push(acting.user_id);
            let received = self
                .store
                .notifications(&NotificationFilter {
                    owner_ids: Some(owners),
                    ..Default::default()
                })
                .await?;
            rows.extend(received.into_iter().filter(|row| {
                scope.owns(row.owner_id, row.resource_server_id) && seen.insert(row.id)
            }));
        }
        rows.sort_by_key(|row| row.created_at);

        self.enrich(rows).await
    }

    /// Withdraws the consumer's own pending requests.
    pub async fn delete_policy_notification(
        &self,
        ids: Vec<NotificationId>,
        consumer: &User,
    ) -> AuthResult<Vec<NotificationId>> {
        consumer.require_any_role(&[Role::Consumer])?;
        ensure_non_empty(&ids)?;
        ensure_unique(&ids, |id| *id)?;

        let rows = self.rows_by_id(&ids).await?;
        let mut batch = WriteBatch::new();
        for id in &ids {
            let withdrawable = rows.get(id).is_some_and(|row| {
                row.user_id == consumer.user_id && row.status == NotificationStatus::Pending
            });
            if !withdrawable {
                return Err(request_not_found(*id));
            }
            batch.push(WriteOp::SetNotificationStatus {
                id: *id,
                from: NotificationStatus::Pending,
                to: NotificationStatus::Withdrawn,
            });
        }
        self.store.commit(batch).await?;

        info!(consumer = %consumer.user_id, count = ids.len(), "access requests withdrawn");
        Ok(ids)
    }

    /// Approves or rejects pending requests in one commit. Approved requests
    /// become policies for the requester; if any of those policies cannot be
    /// created nothing is written and every request stays pending.
    pub async fn update_policy_notification(
        &self,
        requests: Vec<UpdateNotificationRequest>,
        user: &User,
        auth_delegate: Option<&DelegationInformation>,
    ) -> AuthResult<UpdateSummary> {
        let acting = user.acting_as(auth_delegate, &self.settings)?;
        if !acting.is_auth_delegate() {
            user.require_any_role(&[Role::Provider])?;
        }
        ensure_non_empty(&requests)?;
        ensure_unique(&requests, |r| r.request_id)?;
        if let Some(bad) = requests.iter().find(|r| {
            !matches!(
                r.status,
                NotificationStatus::Approved | NotificationStatus::Rejected
            )
        }) {
            return Err(AuthError::invalid_input(
                ErrorCode::InvalidRequestStatus,
                format!("a request can only be approved or rejected, not {:?}", bad.status),
            )
            .with_id(bad.request_id));
        }

        let ids: Vec<NotificationId> = requests.iter().map(|r| r.request_id).collect();
        let rows = self.rows_by_id(&ids).await?;
        let scope = self.policies.ownership().scope_for(acting.user_id).await?;
        for request in &requests {
            let answerable = rows.get(&request.request_id).is_some_and(|row| {
                row.status == NotificationStatus::Pending
                    && scope.owns(row.owner_id, row.resource_server_id)
            });
            if !answerable {
                debug!(
                    acting = %acting.user_id,
                    request = %request.request_id,
                    "request not answerable"
                );
                return Err(request_not_found(request.request_id));
            }
        }

        let now = Utc::now();
        let mut summary = UpdateSummary::default();
        let mut grants = Vec::new();
        let mut flips = WriteBatch::new();
        for request in &requests {
            let Some(row) = rows.get(&request.request_id) else {
                return Err(request_not_found(request.request_id));
            };
            if request.status == NotificationStatus::Approved {
                grants.push(grant_for(row, request, now)?);
                summary.approved.push(row.id);
            } else {
                summary.rejected.push(row.id);
            }
            flips.push(WriteOp::SetNotificationStatus {
                id: row.id,
                from: NotificationStatus::Pending,
                to: request.status,
            });
        }

        let mut batch = WriteBatch::new();
        if !grants.is_empty() {
            let plan = self.policies.prepare(&acting, grants, now).await?;
            summary.policies = plan.policies;
            batch.append(plan.batch);
        }
        batch.append(flips);
        self.store.commit(batch).await?;

        info!(
            acting = %acting.user_id,
            delegate = ?acting.delegate_id,
            approved = summary.approved.len(),
            rejected = summary.rejected.len(),
            "access requests answered"
        );
        self.mail_outcomes(&acting, &rows, &summary).await;
        Ok(summary)
    }

    async fn rows_by_id(
        &self,
        ids: &[NotificationId],
    ) -> AuthResult<HashMap<NotificationId, PolicyNotification>> {
        Ok(self
            .store
            .notifications(&NotificationFilter {
                ids: Some(ids.to_vec()),
                ..Default::default()
            })
            .await?
            .into_iter()
            .map(|row| (row.id, row))
            .collect())
    }

    async fn enrich(&self, rows: Vec<PolicyNotification>) -> AuthResult<Vec<NotificationView>> {
        let item_ids: Vec<ItemId> = rows.iter().map(|row| row.item_id).collect();
        let cat_ids = self.catalogue.get_cat_ids(&item_ids).await?;
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
            .map(|row| NotificationView {
                request_id: row.id,
                catalogue_id: cat_ids.get(&row.item_id).cloned(),
                item_id: row.item_id,
                item_type: row.item_type,
                owner: Party::resolve(row.owner_id, &details),
                user: Party::resolve(row.user_id, &details),
                status: row.status,
                expiry_duration: row.expiry_duration,
                constraints: row.constraints,
                created_at: row.created_at,
            })
            .collect())
    }

    /// One message per consumer and outcome. Delivery problems are logged and
    /// never reach the caller.
    async fn mail_outcomes(
        &self,
        acting: &ActingUser,
        rows: &HashMap<NotificationId, PolicyNotification>,
        summary: &UpdateSummary,
    ) {
        if !self.notify.email_enabled {
            return;
        }

        let mut outbox: BTreeMap<(UserId, RequestOutcome), Vec<&PolicyNotification>> =
            BTreeMap::new();
        for (ids, outcome) in [
            (&summary.approved, RequestOutcome::Approved),
            (&summary.rejected, RequestOutcome::Rejected),
        ] {
            for row in ids.iter().filter_map(|id| rows.get(id)) {
                outbox.entry((row.user_id, outcome)).or_default().push(row);
            }
        }
        if outbox.is_empty() {
            return;
        }

        let consumers: Vec<UserId> = outbox.keys().map(|(user, _)| *user).collect();
        let details = match self.registry.get_user_details(&consumers).await {
            Ok(details) => details,
            Err(err) => {
                warn!(acting = %acting.user_id, error = %err, "consumer lookup for mail failed");
                return;
            }
        };
        let item_ids: Vec<ItemId> = outbox
            .values()
            .flat_map(|rows| rows.iter().map(|row| row.item_id))
            .collect();
        let cat_ids = self
            .catalogue
            .get_cat_ids(&item_ids)
            .await
            .unwrap_or_else(|err| {
                warn!(error = %err, "catalogue id lookup for mail failed");
                HashMap::new()
            });

        for ((consumer, outcome), answered) in outbox {
            let Some(to) = details.get(&consumer).map(|d| d.email.clone()) else {
                warn!(consumer = %consumer, "no email address for consumer");
                continue;
            };
            let message = EmailMessage {
                sender: self.notify.sender.clone(),
                to,
                outcome,
                request_ids: answered.iter().map(|row| row.id).collect(),
                catalogue_ids: answered
                    .iter()
                    .filter_map(|row| cat_ids.get(&row.item_id).cloned())
                    .collect(),
            };
            if let Err(err) = self.email.send(message).await {
                warn!(consumer = %consumer, error = %err, "access request mail not sent");
            }
        }
    }
}

fn request_not_found(id: NotificationId) -> AuthError {
    AuthError::not_found(
        ErrorCode::RequestNotFound,
        "request does not exist or is no longer pending",
    )
    .with_id(id)
}

/// The policy an approval creates, with the provider's overrides applied.
fn grant_for(
    row: &PolicyNotification,
    request: &UpdateNotificationRequest,
    now: DateTime<Utc>,
) -> AuthResult<Grant> {
    let duration = request
        .expiry_duration
        .as_ref()
        .unwrap_or(&row.expiry_duration);
    let expiry = duration.expiry_from(now).ok_or_else(|| {
        AuthError::invalid_input(ErrorCode::InvalidDuration, "expiry duration is too large")
            .with_id(row.id)
    })?;
    Ok(Grant {
        grantee: row.user_id,
        item_id: row.item_id,
        item_type: row.item_type,
        owner_id: row.owner_id,
        resource_server_id: row.resource_server_id,
        expiry_time: Some(expiry),
        constraints: request
            .constraints
            .clone()
            .unwrap_or_else(|| row.constraints.clone()),
    })
}
