//! Checks shared by every batch operation; they run before any lookup.

use std::collections::HashSet;
use std::fmt::Display;
use std::hash::Hash;

use crate::errors::{AuthError, AuthResult, ErrorCode};

pub fn ensure_non_empty<T>(requests: &[T]) -> AuthResult<()> {
    if requests.is_empty() {
        return Err(AuthError::invalid_input(
            ErrorCode::EmptyRequest,
            "request batch is empty",
        ));
    }
    Ok(())
}

/// Fails on the first request whose key was already seen, naming that key.
pub fn ensure_unique<T, K, F>(requests: &[T], key: F) -> AuthResult<()>
where
    F: Fn(&T) -> K,
    K: Eq + Hash + Display,
{
    let mut seen = HashSet::with_capacity(requests.len());
    for request in requests {
        let k = key(request);
        if seen.contains(&k) {
            return Err(AuthError::invalid_input(
                ErrorCode::DuplicateRequest,
                format!("duplicate entry {k} in request"),
            )
            .with_id(k));
        }
        seen.insert(k);
    }
    Ok(())
}
