//! Token-time access decisions: a fail-closed pipeline over the caller's
//! roles, the catalogue's view of the item and, for consumers, the item's
//! access policy decider.

pub mod model;
pub mod verifier;

pub use model::{AccessAuditEvent, AccessGrant, GrantStatus, TokenRequest};
pub use verifier::AccessVerifier;
