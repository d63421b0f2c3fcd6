//! Direct access grants: validation, creation, revocation and listing, plus
//! the ownership rule shared with the request workflow.

pub mod manager;
pub mod model;
pub mod ownership;

pub use manager::PolicyManager;
pub use model::{CreatePolicyRequest, Grant, PolicyPlan, PolicyView};
pub use ownership::{OwnershipResolver, OwnershipScope};
