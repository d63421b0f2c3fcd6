//! Access requests: consumers ask, providers (or their auth delegates)
//! approve or reject, and approvals turn into policies atomically.

pub mod model;
pub mod workflow;

pub use model::{
    CreateNotificationRequest, NotificationView, UpdateNotificationRequest, UpdateSummary,
};
pub use workflow::NotificationWorkflow;
