use std::sync::Arc;

use authgrant_access_verifier::{AccessVerifier, GrantStatus, TokenRequest};
use authgrant_core_types::{
    AccessPolicy, DelegationId, DelegationInformation, ErrorCode, ErrorKind, ItemId, ItemType,
    ResourceServerId, Role, User, UserId,
};
use authgrant_ports::{CatalogueEntry, InMemoryCatalogue, PortError, StaticApd};
use serde_json::{json, Value};

struct Fixture {
    catalogue: Arc<InMemoryCatalogue>,
    apd: Arc<StaticApd>,
    verifier: AccessVerifier,
    owner: User,
}

fn fixture() -> Fixture {
    let catalogue = InMemoryCatalogue::new();
    let apd = StaticApd::allowing(json!({ "status": "success" }));
    let verifier = AccessVerifier::new(catalogue.clone(), apd.clone());
    let owner = User::new(UserId::new(), "p@example.com")
        .with_role(Role::Provider, ["alpha.com", "bravo.com"]);
    Fixture {
        catalogue,
        apd,
        verifier,
        owner,
    }
}

impl Fixture {
    fn item(&self, url: &str, policy: AccessPolicy, apd_url: Option<&str>) -> ItemId {
        let internal_id = ItemId::new();
        self.catalogue.insert(CatalogueEntry {
            internal_id,
            catalogue_id: format!("{url}/item-{internal_id}"),
            item_type: ItemType::Resource,
            owner_id: self.owner.user_id,
            resource_server_id: ResourceServerId::new(),
            resource_server_url: url.into(),
            resource_group_id: Some(ItemId::new()),
            apd_url: apd_url.map(str::to_string),
            access_policy: policy,
        });
        internal_id
    }
}

fn token(item: impl ToString, role: Role) -> TokenRequest {
    TokenRequest {
        item_id: item.to_string(),
        item_type: ItemType::Resource,
        role,
        context: Value::Null,
    }
}

#[tokio::test]
async fn owner_gets_provider_access_to_secure_items() {
    let fx = fixture();
    let item = fx.item("alpha.com", AccessPolicy::Secure, None);

    let grant = fx
        .verifier
        .verify_resource_access(&token(item, Role::Provider), None, &fx.owner)
        .await
        .unwrap();
    assert_eq!(grant.status, GrantStatus::Success);
    assert_eq!(grant.resource_server_url, "alpha.com");
    assert!(grant.delegator_user_id.is_none());
    assert!(grant.apd.is_none());
}

#[tokio::test]
async fn providers_never_reach_pii_items() {
    let fx = fixture();
    let item = fx.item("alpha.com", AccessPolicy::Pii, None);

    let err = fx
        .verifier
        .verify_resource_access(&token(item, Role::Provider), None, &fx.owner)
        .await
        .unwrap_err();
    assert_eq!(err.status, 403);
    assert_eq!(err.code, ErrorCode::ProviderCannotAccessPiiRes);
}

#[tokio::test]
async fn delegation_must_match_the_item_server() {
    let fx = fixture();
    let item = fx.item("bravo.com", AccessPolicy::Secure, None);
    let delegate =
        User::new(UserId::new(), "d@example.com").with_role(Role::Delegate, ["alpha.com"]);
    let mut info = DelegationInformation {
        delegation_id: DelegationId::new(),
        delegator_user_id: fx.owner.user_id,
        delegated_role: Role::Provider,
        resource_server_url: "alpha.com".into(),
    };

    let err = fx
        .verifier
        .verify_resource_access(&token(item, Role::Delegate), Some(&info), &delegate)
        .await
        .unwrap_err();
    assert_eq!(err.status, 403);
    assert_eq!(err.code, ErrorCode::DelegatedRsUrlNotMatchItemRs);

    info.resource_server_url = "bravo.com".into();
    let grant = fx
        .verifier
        .verify_resource_access(&token(item, Role::Delegate), Some(&info), &delegate)
        .await
        .unwrap();
    assert_eq!(grant.delegator_user_id, Some(fx.owner.user_id));
    assert_eq!(grant.delegated_role, Some(Role::Provider));
}

#[tokio::test]
async fn early_pipeline_failures() {
    let fx = fixture();
    let admin = User::new(UserId::new(), "a@example.com").with_role(Role::Admin, ["alpha.com"]);
    let item = fx.item("alpha.com", AccessPolicy::Secure, None);

    let err = fx
        .verifier
        .verify_resource_access(&token(item, Role::Admin), None, &admin)
        .await
        .unwrap_err();
    assert_eq!(err.status, 403);
    assert_eq!(err.code, ErrorCode::InvalidRoleForToken);

    let err = fx
        .verifier
        .verify_resource_access(&token("not-a-handle", Role::Provider), None, &fx.owner)
        .await
        .unwrap_err();
    assert_eq!(err.status, 400);
    assert_eq!(err.code, ErrorCode::IncorrectItemId);

    let delegate =
        User::new(UserId::new(), "d@example.com").with_role(Role::Delegate, ["alpha.com"]);
    let err = fx
        .verifier
        .verify_resource_access(&token(item, Role::Delegate), None, &delegate)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::MissingDelegationInfo);

    let unknown = fx
        .verifier
        .verify_resource_access(&token(ItemId::new(), Role::Provider), None, &fx.owner)
        .await
        .unwrap_err();
    assert_eq!(unknown.code, ErrorCode::ItemNotFound);
}

#[tokio::test]
async fn rs_role_and_ownership_checks() {
    let fx = fixture();
    let item = fx.item("alpha.com", AccessPolicy::Secure, None);

    let consumer =
        User::new(UserId::new(), "c@example.com").with_role(Role::Consumer, ["bravo.com"]);
    let err = fx
        .verifier
        .verify_resource_access(&token(item, Role::Consumer), None, &consumer)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ConsumerDoesntHaveRsRole);

    let other_provider =
        User::new(UserId::new(), "q@example.com").with_role(Role::Provider, ["alpha.com"]);
    let err = fx
        .verifier
        .verify_resource_access(&token(item, Role::Provider), None, &other_provider)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotResOwner);
}

#[tokio::test]
async fn consumers_go_through_the_apd() {
    let fx = fixture();
    let item = fx.item("alpha.com", AccessPolicy::Secure, Some("apd.alpha.com"));
    let consumer =
        User::new(UserId::new(), "c@example.com").with_role(Role::Consumer, ["alpha.com"]);
    let mut request = token(item, Role::Consumer);
    request.context = json!({ "purpose": "research" });

    let grant = fx
        .verifier
        .verify_resource_access(&request, None, &consumer)
        .await
        .unwrap();
    assert_eq!(grant.apd, Some(json!({ "status": "success" })));
    let calls = fx.apd.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].user_id, consumer.user_id);
    assert_eq!(calls[0].apd_url, "apd.alpha.com");
    assert_eq!(calls[0].context, json!({ "purpose": "research" }));

    fx.apd.set_answer(Err(PortError::Rejected {
        service: "apd",
        status: 403,
        message: "denied by apd".into(),
    }));
    let err = fx
        .verifier
        .verify_resource_access(&request, None, &consumer)
        .await
        .unwrap_err();
    assert_eq!(err.status, 403);
    assert_eq!(err.code, ErrorCode::UpstreamFailure);
}

#[tokio::test]
async fn delegated_consumer_apd_sees_the_delegator() {
    let fx = fixture();
    let item = fx.item("alpha.com", AccessPolicy::Secure, Some("apd.alpha.com"));
    let delegator = UserId::new();
    let delegate =
        User::new(UserId::new(), "d@example.com").with_role(Role::Delegate, ["alpha.com"]);
    let info = DelegationInformation {
        delegation_id: DelegationId::new(),
        delegator_user_id: delegator,
        delegated_role: Role::Consumer,
        resource_server_url: "alpha.com".into(),
    };

    let grant = fx
        .verifier
        .verify_resource_access(&token(item, Role::Delegate), Some(&info), &delegate)
        .await
        .unwrap();
    assert_eq!(grant.delegator_user_id, Some(delegator));
    assert_eq!(grant.delegated_role, Some(Role::Consumer));
    assert_eq!(grant.apd, Some(json!({ "status": "success" })));

    let calls = fx.apd.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].user_id, delegator);
    assert_ne!(calls[0].user_id, delegate.user_id);
}

#[tokio::test]
async fn catalogue_outage_propagates_status() {
    let fx = fixture();
    let item = fx.item("alpha.com", AccessPolicy::Secure, None);
    fx.catalogue.set_outage(Some(PortError::Rejected {
        service: "catalogue",
        status: 503,
        message: "maintenance".into(),
    }));

    let err = fx
        .verifier
        .verify_resource_access(&token(item, Role::Provider), None, &fx.owner)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Upstream);
    assert_eq!(err.status, 503);

    fx.catalogue.set_outage(None);
    assert!(fx
        .verifier
        .verify_resource_access(&token(item, Role::Provider), None, &fx.owner)
        .await
        .is_ok());
}

#[tokio::test]
async fn apd_that_does_not_know_the_item_is_upstream() {
    let fx = fixture();
    let item = fx.item("alpha.com", AccessPolicy::Secure, Some("apd.alpha.com"));
    let consumer =
        User::new(UserId::new(), "c@example.com").with_role(Role::Consumer, ["alpha.com"]);
    fx.apd.set_answer(Err(PortError::not_found("apd", [item])));

    let err = fx
        .verifier
        .verify_resource_access(&token(item, Role::Consumer), None, &consumer)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Upstream);
    assert_eq!(err.code, ErrorCode::UpstreamFailure);
    assert_eq!(err.status, 404);
}

#[tokio::test]
async fn decisions_are_published_to_subscribers() {
    let fx = fixture();
    let mut events = fx.verifier.subscribe();
    let item = fx.item("alpha.com", AccessPolicy::Pii, None);

    let _ = fx
        .verifier
        .verify_resource_access(&token(item, Role::Provider), None, &fx.owner)
        .await;

    let event = events.recv().await.unwrap();
    assert!(!event.allowed);
    assert_eq!(event.code, Some(ErrorCode::ProviderCannotAccessPiiRes));
    assert_eq!(event.principal, Some(fx.owner.user_id));
}
