//! Append-only storage for policies, delegations, access requests and the
//! resource-server registry.

pub mod api;
pub mod batch;
pub mod errors;
pub mod model;

pub use api::{CommitAck, EntityStore, InMemoryEntityStore, StoreResult};
pub use batch::{WriteBatch, WriteOp};
pub use errors::{Entity, StoreError, StoreErrorKind};
pub use model::{
    Delegation, DelegationFilter, NotificationFilter, Policy, PolicyFilter, PolicyNotification,
    ResourceServer,
};
