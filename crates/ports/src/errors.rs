use thiserror::Error;

use authgrant_core_types::{AuthError, ErrorCode};

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PortError {
    /// The collaborator answered but did not know some of the keys asked for.
    #[error("{service}: unknown {}", .ids.join(", "))]
    NotFound {
        service: &'static str,
        ids: Vec<String>,
    },
    /// The collaborator refused the call with a structured status.
    #[error("{service} refused the call ({status}): {message}")]
    Rejected {
        service: &'static str,
        status: u16,
        message: String,
    },
    #[error("{service} unavailable: {message}")]
    Unavailable {
        service: &'static str,
        message: String,
    },
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
}

pub type PortResult<T> = Result<T, PortError>;

impl PortError {
    pub fn not_found<I, T>(service: &'static str, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        PortError::NotFound {
            service,
            ids: ids.into_iter().map(|id| id.to_string()).collect(),
        }
    }

    /// Maps the failure into the shared taxonomy; unknown keys become invalid
    /// input under `missing`.
    pub fn into_auth(self, missing: ErrorCode) -> AuthError {
        let detail = self.to_string();
        match self {
            PortError::NotFound { ids, .. } => {
                AuthError::invalid_input(missing, detail).with_ids(ids)
            }
            PortError::Rejected { status, .. } => AuthError::upstream(Some(status), detail),
            PortError::Unavailable { .. } | PortError::NotImplemented(_) => {
                AuthError::upstream(None, detail)
            }
        }
    }
}

impl From<PortError> for AuthError {
    fn from(value: PortError) -> Self {
        value.into_auth(ErrorCode::ItemNotFound)
    }
}
