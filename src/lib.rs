//! Federated authorization core: delegations, direct policies, access
//! requests and token-time access decisions over a shared entity store.

pub mod config;
pub mod telemetry;

use std::sync::Arc;

use tracing::info;

use authgrant_access_verifier::AccessVerifier;
use authgrant_core_types::{AuthResult, ResourceServerId, UserId};
use authgrant_delegation::DelegationManager;
use authgrant_entity_store::{EntityStore, InMemoryEntityStore, ResourceServer};
use authgrant_notification::NotificationWorkflow;
use authgrant_policy::PolicyManager;
use authgrant_ports::{
    ApdService, CatalogueClient, EmailClient, InMemoryCatalogue, InMemoryRegistry, NoopApd,
    NoopEmailClient, RegistrationService,
};

pub use config::{load_config, AuthgrantConfig, ConfigError, LoggingConfig};

pub use authgrant_access_verifier as access_verifier;
pub use authgrant_core_types as core_types;
pub use authgrant_delegation as delegation;
pub use authgrant_entity_store as entity_store;
pub use authgrant_notification as notification;
pub use authgrant_policy as policy;
pub use authgrant_ports as ports;

/// Every engine wired to one store, one set of collaborators and one frozen
/// configuration.
pub struct AuthCore {
    config: Arc<AuthgrantConfig>,
    store: Arc<dyn EntityStore>,
    delegations: DelegationManager,
    policies: PolicyManager,
    notifications: NotificationWorkflow,
    verifier: AccessVerifier,
}

impl AuthCore {
    pub fn builder() -> AuthCoreBuilder {
        AuthCoreBuilder::default()
    }

    pub fn config(&self) -> &AuthgrantConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub fn delegations(&self) -> &DelegationManager {
        &self.delegations
    }

    pub fn policies(&self) -> &PolicyManager {
        &self.policies
    }

    pub fn notifications(&self) -> &NotificationWorkflow {
        &self.notifications
    }

    pub fn verifier(&self) -> &AccessVerifier {
        &self.verifier
    }
}

/// Collaborators left unset fall back to the in-memory or no-op
/// implementations from `authgrant-ports`.
#[derive(Default)]
pub struct AuthCoreBuilder {
    config: Option<Arc<AuthgrantConfig>>,
    store: Option<Arc<dyn EntityStore>>,
    catalogue: Option<Arc<dyn CatalogueClient>>,
    registry: Option<Arc<dyn RegistrationService>>,
    apd: Option<Arc<dyn ApdService>>,
    email: Option<Arc<dyn EmailClient>>,
    platform_owner: Option<UserId>,
}

impl AuthCoreBuilder {
    pub fn config(mut self, config: Arc<AuthgrantConfig>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn store(mut self, store: Arc<dyn EntityStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn catalogue(mut self, catalogue: Arc<dyn CatalogueClient>) -> Self {
        self.catalogue = Some(catalogue);
        self
    }

    pub fn registry(mut self, registry: Arc<dyn RegistrationService>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn apd(mut self, apd: Arc<dyn ApdService>) -> Self {
        self.apd = Some(apd);
        self
    }

    pub fn email(mut self, email: Arc<dyn EmailClient>) -> Self {
        self.email = Some(email);
        self
    }

    /// Owner recorded for the auth server row when the builder has to
    /// register it.
    pub fn platform_owner(mut self, owner: UserId) -> Self {
        self.platform_owner = Some(owner);
        self
    }

    /// Wires the engines and makes sure the auth server is registered.
    pub async fn build(self) -> AuthResult<AuthCore> {
        let config = self.config.unwrap_or_default();
        let store: Arc<dyn EntityStore> = self.store.unwrap_or_else(|| InMemoryEntityStore::new());
        let catalogue: Arc<dyn CatalogueClient> =
            self.catalogue.unwrap_or_else(|| InMemoryCatalogue::new());
        let registry: Arc<dyn RegistrationService> =
            self.registry.unwrap_or_else(|| InMemoryRegistry::new());
        let apd: Arc<dyn ApdService> = self.apd.unwrap_or_else(|| Arc::new(NoopApd));
        let email: Arc<dyn EmailClient> = self.email.unwrap_or_else(|| Arc::new(NoopEmailClient));

        let auth_server_url = config.core.auth_server_url.clone();
        if store.resource_server_by_url(&auth_server_url).await?.is_none() {
            store
                .register_resource_server(ResourceServer {
                    id: ResourceServerId::new(),
                    url: auth_server_url.clone(),
                    owner_id: self.platform_owner.unwrap_or_default(),
                    name: "authorization server".into(),
                })
                .await?;
            info!(url = %auth_server_url, "auth server registered");
        }

        let settings = Arc::new(config.core.clone());
        let policies = PolicyManager::new(
            store.clone(),
            catalogue.clone(),
            registry.clone(),
            settings.clone(),
        );
        let delegations = DelegationManager::new(store.clone(), registry.clone(), settings.clone());
        let notifications = NotificationWorkflow::new(
            store.clone(),
            catalogue.clone(),
            registry,
            email,
            policies.clone(),
            settings,
            config.notifications.clone(),
        );
        let verifier = AccessVerifier::new(catalogue, apd);

        Ok(AuthCore {
            config,
            store,
            delegations,
            policies,
            notifications,
            verifier,
        })
    }
}
