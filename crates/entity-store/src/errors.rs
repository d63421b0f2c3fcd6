use std::fmt;

use thiserror::Error;

use authgrant_core_types::{AuthError, ErrorCode};

/// Table a store failure refers to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Entity {
    Policy,
    Delegation,
    Notification,
    ResourceServer,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::Policy => "policy",
            Entity::Delegation => "delegation",
            Entity::Notification => "notification",
            Entity::ResourceServer => "resource server",
        })
    }
}

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum StoreErrorKind {
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: String },
    #[error("{entity} {id} is not in the expected state")]
    StatusMismatch { entity: Entity, id: String },
    #[error("{entity} {id} cannot make that transition")]
    IllegalTransition { entity: Entity, id: String },
    #[error("{entity} conflicts with existing rows")]
    Conflict { entity: Entity, ids: Vec<String> },
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error(transparent)]
pub struct StoreError(pub StoreErrorKind);

impl StoreError {
    pub fn new(kind: StoreErrorKind) -> Self {
        Self(kind)
    }

    pub fn kind(&self) -> &StoreErrorKind {
        &self.0
    }
}

impl From<StoreErrorKind> for StoreError {
    fn from(kind: StoreErrorKind) -> Self {
        StoreError(kind)
    }
}

fn missing_code(entity: Entity) -> ErrorCode {
    match entity {
        Entity::Policy => ErrorCode::InvalidPolicyId,
        Entity::Delegation => ErrorCode::InvalidDelegationId,
        Entity::Notification => ErrorCode::RequestNotFound,
        Entity::ResourceServer => ErrorCode::InvalidResourceServer,
    }
}

fn conflict_code(entity: Entity) -> ErrorCode {
    match entity {
        Entity::Policy => ErrorCode::PolicyAlreadyExists,
        Entity::Delegation => ErrorCode::DelegationAlreadyExists,
        Entity::Notification => ErrorCode::RequestAlreadyExists,
        Entity::ResourceServer => ErrorCode::InvalidResourceServer,
    }
}

impl From<StoreError> for AuthError {
    fn from(value: StoreError) -> Self {
        let detail = value.to_string();
        match value.0 {
            StoreErrorKind::NotFound { entity, id }
            | StoreErrorKind::StatusMismatch { entity, id }
            | StoreErrorKind::IllegalTransition { entity, id } => {
                AuthError::not_found(missing_code(entity), detail).with_id(id)
            }
            StoreErrorKind::Conflict { entity, ids } => {
                AuthError::already_exists(conflict_code(entity), detail).with_ids(ids)
            }
            StoreErrorKind::Internal(_) => AuthError::internal(detail),
        }
    }
}
