//! Error taxonomy shared by every engine.
//!
//! Each failure carries a coarse [`ErrorKind`], a stable machine-readable
//! [`ErrorCode`], the HTTP status the API layer should surface, a human
//! readable detail, and the ids the failure refers to (the offending id of a
//! batch, or the conflicting rows of a uniqueness violation).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidRole,
    InvalidInput,
    AlreadyExists,
    NotFound,
    AccessDenied,
    Upstream,
    Internal,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // caller role
    InvalidRole,
    InvalidRoleForToken,
    ConsumerDoesntHaveRsRole,
    ProviderDoesntHaveRsRole,
    InvalidAuthDelegate,
    AuthDelegateCannotCreateAuthDelegate,
    // request validation
    EmptyRequest,
    DuplicateRequest,
    IncorrectItemId,
    InvalidResourceServer,
    MissingRoleForRs,
    SelfDelegation,
    EmailsNotFound,
    ItemNotFound,
    ItemTypeMismatch,
    UserNotFound,
    InvalidExpiry,
    InvalidDuration,
    MissingDelegationInfo,
    InvalidRequestStatus,
    // uniqueness
    DelegationAlreadyExists,
    PolicyAlreadyExists,
    RequestAlreadyExists,
    // unknown or inactive rows
    InvalidDelegationId,
    InvalidPolicyId,
    RequestNotFound,
    // access decisions
    NotResOwner,
    DelegatedRsUrlNotMatchItemRs,
    ProviderCannotAccessPiiRes,
    // everything else
    UpstreamFailure,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRole => "INVALID_ROLE",
            ErrorCode::InvalidRoleForToken => "INVALID_ROLE_FOR_TOKEN",
            ErrorCode::ConsumerDoesntHaveRsRole => "CONSUMER_DOESNT_HAVE_RS_ROLE",
            ErrorCode::ProviderDoesntHaveRsRole => "PROVIDER_DOESNT_HAVE_RS_ROLE",
            ErrorCode::InvalidAuthDelegate => "INVALID_AUTH_DELEGATE",
            ErrorCode::AuthDelegateCannotCreateAuthDelegate => {
                "AUTH_DELEGATE_CANNOT_CREATE_AUTH_DELEGATE"
            }
            ErrorCode::EmptyRequest => "EMPTY_REQUEST",
            ErrorCode::DuplicateRequest => "DUPLICATE_REQUEST",
            ErrorCode::IncorrectItemId => "INCORRECT_ITEM_ID",
            ErrorCode::InvalidResourceServer => "INVALID_RESOURCE_SERVER",
            ErrorCode::MissingRoleForRs => "MISSING_ROLE_FOR_RS",
            ErrorCode::SelfDelegation => "SELF_DELEGATION",
            ErrorCode::EmailsNotFound => "EMAILS_NOT_FOUND",
            ErrorCode::ItemNotFound => "ITEM_NOT_FOUND",
            ErrorCode::ItemTypeMismatch => "ITEM_TYPE_MISMATCH",
            ErrorCode::UserNotFound => "USER_NOT_FOUND",
            ErrorCode::InvalidExpiry => "INVALID_EXPIRY",
            ErrorCode::InvalidDuration => "INVALID_DURATION",
            ErrorCode::MissingDelegationInfo => "MISSING_DELEGATION_INFO",
            ErrorCode::InvalidRequestStatus => "INVALID_REQUEST_STATUS",
            ErrorCode::DelegationAlreadyExists => "DELEGATION_ALREADY_EXISTS",
            ErrorCode::PolicyAlreadyExists => "POLICY_ALREADY_EXISTS",
            ErrorCode::RequestAlreadyExists => "REQUEST_ALREADY_EXISTS",
            ErrorCode::InvalidDelegationId => "INVALID_DELEGATION_ID",
            ErrorCode::InvalidPolicyId => "INVALID_POLICY_ID",
            ErrorCode::RequestNotFound => "REQUEST_NOT_FOUND",
            ErrorCode::NotResOwner => "NOT_RES_OWNER",
            ErrorCode::DelegatedRsUrlNotMatchItemRs => "DELEGATED_RS_URL_NOT_MATCH_ITEM_RS",
            ErrorCode::ProviderCannotAccessPiiRes => "PROVIDER_CANNOT_ACCESS_PII_RES",
            ErrorCode::UpstreamFailure => "UPSTREAM_FAILURE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, Eq, PartialEq, Serialize, Deserialize)]
#[error("{code} ({status}): {detail}")]
pub struct AuthError {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub status: u16,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
}

impl AuthError {
    pub fn new(kind: ErrorKind, code: ErrorCode, status: u16, detail: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            status,
            detail: detail.into(),
            ids: Vec::new(),
        }
    }

    /// Caller is not authenticated for the operation at all.
    pub fn unauthorized(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRole, code, 401, detail)
    }

    /// Caller holds a role but not the one the operation needs.
    pub fn forbidden_role(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRole, code, 403, detail)
    }

    pub fn invalid_input(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, code, 400, detail)
    }

    pub fn already_exists(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, code, 409, detail)
    }

    /// Unknown id or a row in the wrong state; the two are never told apart.
    pub fn not_found(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, code, 400, detail)
    }

    pub fn access_denied(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::AccessDenied, code, 403, detail)
    }

    /// Collaborator failure; keeps the collaborator's status when it had one.
    pub fn upstream(status: Option<u16>, detail: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Upstream,
            ErrorCode::UpstreamFailure,
            status.unwrap_or(500),
            detail,
        )
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, ErrorCode::InternalError, 500, detail)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_id(mut self, id: impl ToString) -> Self {
        self.ids.push(id.to_string());
        self
    }

    pub fn with_ids<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        self.ids.extend(ids.into_iter().map(|id| id.to_string()));
        self
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }
}
