use authgrant_core_types::{
    DelegationId, DelegationStatus, NotificationId, NotificationStatus, PolicyId, PolicyStatus,
};

use crate::model::{Delegation, Policy, PolicyNotification};

/// One row mutation. Rows are only ever inserted or moved along their status
/// lifecycle; there is no removal.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    InsertPolicy(Policy),
    InsertDelegation(Delegation),
    InsertNotification(PolicyNotification),
    SetPolicyStatus {
        id: PolicyId,
        from: PolicyStatus,
        to: PolicyStatus,
    },
    SetDelegationStatus {
        id: DelegationId,
        from: DelegationStatus,
        to: DelegationStatus,
    },
    SetNotificationStatus {
        id: NotificationId,
        from: NotificationStatus,
        to: NotificationStatus,
    },
}

/// Mutations committed atomically: all apply or none do.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn with(mut self, op: WriteOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn append(&mut self, other: WriteBatch) {
        self.ops.extend(other.ops);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub(crate) fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

impl Extend<WriteOp> for WriteBatch {
    fn extend<T: IntoIterator<Item = WriteOp>>(&mut self, iter: T) {
        self.ops.extend(iter);
    }
}

impl FromIterator<WriteOp> for WriteBatch {
    fn from_iter<T: IntoIterator<Item = WriteOp>>(iter: T) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}
