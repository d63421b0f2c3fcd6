use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use authgrant_core_types::{
    DelegationId, DelegationStatus, NotificationId, NotificationStatus, PolicyId, PolicyStatus,
    ResourceServerId,
};

use crate::batch::{WriteBatch, WriteOp};
use crate::errors::{Entity, StoreError, StoreErrorKind};
use crate::model::{
    Delegation, DelegationFilter, NotificationFilter, Policy, PolicyFilter, PolicyNotification,
    ResourceServer,
};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitAck {
    pub ops: usize,
    pub committed_at: DateTime<Utc>,
}

/// Storage for the authorization rows.
///
/// Reads return rows in insertion order. Writes go exclusively through
/// [`EntityStore::commit`], which either applies the whole batch or nothing.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn register_resource_server(&self, server: ResourceServer) -> StoreResult<()>;
    async fn resource_server_by_url(&self, url: &str) -> StoreResult<Option<ResourceServer>>;
    async fn resource_servers(&self, ids: &[ResourceServerId])
        -> StoreResult<Vec<ResourceServer>>;

    async fn policies(&self, filter: &PolicyFilter) -> StoreResult<Vec<Policy>>;
    async fn delegations(&self, filter: &DelegationFilter) -> StoreResult<Vec<Delegation>>;
    async fn notifications(
        &self,
        filter: &NotificationFilter,
    ) -> StoreResult<Vec<PolicyNotification>>;

    async fn commit(&self, batch: WriteBatch) -> StoreResult<CommitAck>;
}

struct Table<K, V> {
    rows: Vec<V>,
    index: HashMap<K, usize>,
}

impl<K, V> Default for Table<K, V> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<K: Copy + Eq + Hash, V> Table<K, V> {
    fn contains(&self, id: &K) -> bool {
        self.index.contains_key(id)
    }

    fn get_mut(&mut self, id: &K) -> Option<&mut V> {
        let slot = *self.index.get(id)?;
        self.rows.get_mut(slot)
    }

    fn push(&mut self, id: K, row: V) {
        self.index.insert(id, self.rows.len());
        self.rows.push(row);
    }

    // Only valid for the most recent insert; rollback unwinds in reverse.
    fn pop(&mut self, id: &K) {
        if self.index.remove(id).is_some() {
            self.rows.pop();
        }
    }

    fn iter(&self) -> impl Iterator<Item = &V> {
        self.rows.iter()
    }
}

enum Undo {
    PolicyInserted(PolicyId),
    DelegationInserted(DelegationId),
    NotificationInserted(NotificationId),
    PolicyStatus(PolicyId, PolicyStatus, DateTime<Utc>),
    DelegationStatus(DelegationId, DelegationStatus, DateTime<Utc>),
    NotificationStatus(NotificationId, NotificationStatus, DateTime<Utc>),
}

#[derive(Default)]
struct Tables {
    policies: Table<PolicyId, Policy>,
    delegations: Table<DelegationId, Delegation>,
    notifications: Table<NotificationId, PolicyNotification>,
    servers: Vec<ResourceServer>,
}

impl Tables {
    fn apply(&mut self, op: WriteOp, now: DateTime<Utc>, undo: &mut Vec<Undo>) -> StoreResult<()> {
        match op {
            WriteOp::InsertPolicy(row) => {
                let conflicts: Vec<String> = if self.policies.contains(&row.id) {
                    vec![row.id.to_string()]
                } else if row.status == PolicyStatus::Active {
                    self.policies
                        .iter()
                        .filter(|p| {
                            p.status == PolicyStatus::Active
                                && p.user_id == row.user_id
                                && p.item_id == row.item_id
                        })
                        .map(|p| p.id.to_string())
                        .collect()
                } else {
                    Vec::new()
                };
                if !conflicts.is_empty() {
                    return Err(conflict(Entity::Policy, conflicts));
                }
                undo.push(Undo::PolicyInserted(row.id));
                self.policies.push(row.id, row);
            }
            WriteOp::InsertDelegation(row) => {
                let conflicts: Vec<String> = if self.delegations.contains(&row.id) {
                    vec![row.id.to_string()]
                } else if row.status == DelegationStatus::Active {
                    self.delegations
                        .iter()
                        .filter(|d| {
                            d.status == DelegationStatus::Active
                                && d.owner_id == row.owner_id
                                && d.user_id == row.user_id
                                && d.resource_server_id == row.resource_server_id
                                && d.role == row.role
                        })
                        .map(|d| d.id.to_string())
                        .collect()
                } else {
                    Vec::new()
                };
                if !conflicts.is_empty() {
                    return Err(conflict(Entity::Delegation, conflicts));
                }
                undo.push(Undo::DelegationInserted(row.id));
                self.delegations.push(row.id, row);
            }
            WriteOp::InsertNotification(row) => {
                let conflicts: Vec<String> = if self.notifications.contains(&row.id) {
                    vec![row.id.to_string()]
                } else if row.status == NotificationStatus::Pending {
                    self.notifications
                        .iter()
                        .filter(|n| {
                            n.status == NotificationStatus::Pending
                                && n.user_id == row.user_id
                                && n.item_id == row.item_id
                        })
                        .map(|n| n.id.to_string())
                        .collect()
                } else {
                    Vec::new()
                };
                if !conflicts.is_empty() {
                    return Err(conflict(Entity::Notification, conflicts));
                }
                undo.push(Undo::NotificationInserted(row.id));
                self.notifications.push(row.id, row);
            }
            WriteOp::SetPolicyStatus { id, from, to } => {
                let row = self
                    .policies
                    .get_mut(&id)
                    .ok_or_else(|| not_found(Entity::Policy, id))?;
                if row.status != from {
                    return Err(mismatch(Entity::Policy, id));
                }
                if !from.can_transition_to(to) {
                    return Err(illegal(Entity::Policy, id));
                }
                undo.push(Undo::PolicyStatus(id, row.status, row.updated_at));
                row.status = to;
                row.updated_at = now;
            }
            WriteOp::SetDelegationStatus { id, from, to } => {
                let row = self
                    .delegations
                    .get_mut(&id)
                    .ok_or_else(|| not_found(Entity::Delegation, id))?;
                if row.status != from {
                    return Err(mismatch(Entity::Delegation, id));
                }
                if !from.can_transition_to(to) {
                    return Err(illegal(Entity::Delegation, id));
                }
                undo.push(Undo::DelegationStatus(id, row.status, row.updated_at));
                row.status = to;
                row.updated_at = now;
            }
            WriteOp::SetNotificationStatus { id, from, to } => {
                let row = self
                    .notifications
                    .get_mut(&id)
                    .ok_or_else(|| not_found(Entity::Notification, id))?;
                if row.status != from {
                    return Err(mismatch(Entity::Notification, id));
                }
                if !from.can_transition_to(to) {
                    return Err(illegal(Entity::Notification, id));
                }
                undo.push(Undo::NotificationStatus(id, row.status, row.updated_at));
                row.status = to;
                row.updated_at = now;
            }
        }
        Ok(())
    }

    fn rollback(&mut self, undo: Vec<Undo>) {
        for step in undo.into_iter().rev() {
            match step {
                Undo::PolicyInserted(id) => self.policies.pop(&id),
                Undo::DelegationInserted(id) => self.delegations.pop(&id),
                Undo::NotificationInserted(id) => self.notifications.pop(&id),
                Undo::PolicyStatus(id, status, at) => {
                    if let Some(row) = self.policies.get_mut(&id) {
                        row.status = status;
                        row.updated_at = at;
                    }
                }
                Undo::DelegationStatus(id, status, at) => {
                    if let Some(row) = self.delegations.get_mut(&id) {
                        row.status = status;
                        row.updated_at = at;
                    }
                }
                Undo::NotificationStatus(id, status, at) => {
                    if let Some(row) = self.notifications.get_mut(&id) {
                        row.status = status;
                        row.updated_at = at;
                    }
                }
            }
        }
    }
}

fn conflict(entity: Entity, ids: Vec<String>) -> StoreError {
    StoreErrorKind::Conflict { entity, ids }.into()
}

fn not_found(entity: Entity, id: impl ToString) -> StoreError {
    StoreErrorKind::NotFound {
        entity,
        id: id.to_string(),
    }
    .into()
}

fn mismatch(entity: Entity, id: impl ToString) -> StoreError {
    StoreErrorKind::StatusMismatch {
        entity,
        id: id.to_string(),
    }
    .into()
}

fn illegal(entity: Entity, id: impl ToString) -> StoreError {
    StoreErrorKind::IllegalTransition {
        entity,
        id: id.to_string(),
    }
    .into()
}

/// Process-local [`EntityStore`] behind a single lock.
///
/// A commit holds the write lock for the whole batch and unwinds its own
/// changes on the first failing op, so readers never observe a partial batch.
#[derive(Default)]
pub struct InMemoryEntityStore {
    tables: RwLock<Tables>,
}

impl InMemoryEntityStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a resource server outside of the async API, for seeding at
    /// startup.
    pub fn seed_resource_server(&self, server: ResourceServer) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let clashes: Vec<String> = tables
            .servers
            .iter()
            .filter(|existing| existing.id == server.id || existing.url == server.url)
            .map(|existing| existing.id.to_string())
            .collect();
        if !clashes.is_empty() {
            return Err(conflict(Entity::ResourceServer, clashes));
        }
        debug!(url = %server.url, id = %server.id, "resource server registered");
        tables.servers.push(server);
        Ok(())
    }

    pub fn policy_count(&self) -> usize {
        self.tables.read().policies.rows.len()
    }

    pub fn delegation_count(&self) -> usize {
        self.tables.read().delegations.rows.len()
    }

    pub fn notification_count(&self) -> usize {
        self.tables.read().notifications.rows.len()
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn register_resource_server(&self, server: ResourceServer) -> StoreResult<()> {
        self.seed_resource_server(server)
    }

    async fn resource_server_by_url(&self, url: &str) -> StoreResult<Option<ResourceServer>> {
        let tables = self.tables.read();
        Ok(tables.servers.iter().find(|s| s.url == url).cloned())
    }

    async fn resource_servers(
        &self,
        ids: &[ResourceServerId],
    ) -> StoreResult<Vec<ResourceServer>> {
        let tables = self.tables.read();
        Ok(tables
            .servers
            .iter()
            .filter(|s| ids.contains(&s.id))
            .cloned()
            .collect())
    }

    async fn policies(&self, filter: &PolicyFilter) -> StoreResult<Vec<Policy>> {
        let tables = self.tables.read();
        Ok(tables
            .policies
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }

    async fn delegations(&self, filter: &DelegationFilter) -> StoreResult<Vec<Delegation>> {
        let tables = self.tables.read();
        Ok(tables
            .delegations
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }

    async fn notifications(
        &self,
        filter: &NotificationFilter,
    ) -> StoreResult<Vec<PolicyNotification>> {
        let tables = self.tables.read();
        Ok(tables
            .notifications
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<CommitAck> {
        let now = Utc::now();
        let ops = batch.len();
        let mut tables = self.tables.write();
        let mut undo = Vec::with_capacity(ops);
        for op in batch.into_ops() {
            if let Err(err) = tables.apply(op, now, &mut undo) {
                tables.rollback(undo);
                debug!(error = %err, ops, "commit rejected");
                return Err(err);
            }
        }
        debug!(ops, "commit applied");
        Ok(CommitAck {
            ops,
            committed_at: now,
        })
    }
}
