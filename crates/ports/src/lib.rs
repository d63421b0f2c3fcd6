//! Contracts the authorization core consumes from its collaborators: the
//! catalogue, the user directory, APD evaluators and the mailer. Each contract
//! ships with an in-memory implementation used for wiring and tests.

pub mod apd;
pub mod catalogue;
pub mod email;
pub mod errors;
pub mod registration;

pub use apd::{ApdRequest, ApdService, NoopApd, StaticApd};
pub use catalogue::{
    CatalogueClient, CatalogueEntry, CatalogueItem, InMemoryCatalogue, ResourceDetails,
};
pub use email::{EmailClient, EmailMessage, NoopEmailClient, RecordingEmailClient, RequestOutcome};
pub use errors::{PortError, PortResult};
pub use registration::{Identity, InMemoryRegistry, Party, RegistrationService, UserDetails};
