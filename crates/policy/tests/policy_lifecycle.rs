use std::sync::Arc;

use authgrant_core_types::{
    AccessPolicy, AuthSettings, Constraints, DelegationId, DelegationInformation,
    DelegationStatus, ErrorCode, ItemId, ItemType, ResourceServerId, Role, User, UserId,
};
use authgrant_entity_store::{
    Delegation, EntityStore, InMemoryEntityStore, PolicyFilter, WriteBatch, WriteOp,
};
use authgrant_policy::{CreatePolicyRequest, PolicyManager};
use authgrant_ports::{CatalogueEntry, InMemoryCatalogue, InMemoryRegistry};
use chrono::{Duration, Utc};

const AUTH_SERVER: &str = "authvertx.example.com";

struct Fixture {
    store: Arc<InMemoryEntityStore>,
    catalogue: Arc<InMemoryCatalogue>,
    registry: Arc<InMemoryRegistry>,
    manager: PolicyManager,
    alpha: ResourceServerId,
}

fn fixture() -> Fixture {
    let store = InMemoryEntityStore::new();
    let catalogue = InMemoryCatalogue::new();
    let registry = InMemoryRegistry::new();
    let manager = PolicyManager::new(
        store.clone(),
        catalogue.clone(),
        registry.clone(),
        Arc::new(AuthSettings::new(AUTH_SERVER)),
    );
    Fixture {
        store,
        catalogue,
        registry,
        manager,
        alpha: ResourceServerId::new(),
    }
}

impl Fixture {
    fn user(&self, email: &str, roles: &[Role]) -> User {
        let mut user = User::new(UserId::new(), email);
        for role in roles {
            user = user.with_role(*role, ["alpha.com"]);
        }
        self.registry.insert(user.clone());
        user
    }

    fn item(&self, cat_id: &str, owner: UserId, item_type: ItemType) -> CatalogueEntry {
        let entry = CatalogueEntry {
            internal_id: ItemId::new(),
            catalogue_id: cat_id.into(),
            item_type,
            owner_id: owner,
            resource_server_id: self.alpha,
            resource_server_url: "alpha.com".into(),
            resource_group_id: None,
            apd_url: None,
            access_policy: AccessPolicy::Secure,
        };
        self.catalogue.insert(entry.clone());
        entry
    }

    async fn delegate(&self, owner: UserId, user: UserId, role: Role) {
        let now = Utc::now();
        let row = Delegation {
            id: DelegationId::new(),
            owner_id: owner,
            user_id: user,
            resource_server_id: self.alpha,
            role,
            status: DelegationStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.store
            .commit(WriteBatch::new().with(WriteOp::InsertDelegation(row)))
            .await
            .unwrap();
    }
}

fn request(user: UserId, cat_id: &str) -> CreatePolicyRequest {
    CreatePolicyRequest {
        user_id: user,
        item_id: cat_id.into(),
        item_type: ItemType::Resource,
        expiry_time: None,
        constraints: Constraints::new(),
    }
}

#[tokio::test]
async fn provider_grants_and_both_parties_see_the_policy() {
    let fx = fixture();
    let provider = fx.user("p@example.com", &[Role::Provider]);
    let consumer = fx.user("c@example.com", &[Role::Consumer]);
    let item = fx.item("alpha/rs/one", provider.user_id, ItemType::Resource);

    let mut req = request(consumer.user_id, "alpha/rs/one");
    req.expiry_time = Some(Utc::now() + Duration::days(10));
    req.constraints.insert("access".into(), serde_json::json!(["api"]));
    let created = fx
        .manager
        .create_policy(vec![req], &provider, None)
        .await
        .unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].item_id, item.internal_id);
    assert_eq!(created[0].owner_id, provider.user_id);

    for caller in [&provider, &consumer] {
        let listed = fx.manager.list_policy(caller, None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].catalogue_id.as_deref(), Some("alpha/rs/one"));
        assert_eq!(listed[0].user.email.as_deref(), Some("c@example.com"));
        assert!(!listed[0].expired);
    }
}

#[tokio::test]
async fn duplicate_items_reject_the_whole_batch() {
    let fx = fixture();
    let provider = fx.user("p@example.com", &[Role::Provider]);
    let consumer = fx.user("c@example.com", &[Role::Consumer]);
    fx.item("alpha/rs/one", provider.user_id, ItemType::Resource);

    let err = fx
        .manager
        .create_policy(
            vec![
                request(consumer.user_id, "alpha/rs/one"),
                request(provider.user_id, "alpha/rs/one"),
            ],
            &provider,
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::DuplicateRequest);
    assert_eq!(err.status, 400);
    assert_eq!(fx.store.policy_count(), 0);
}

#[tokio::test]
async fn validation_failures_name_the_offending_entry() {
    let fx = fixture();
    let provider = fx.user("p@example.com", &[Role::Provider]);
    let consumer = fx.user("c@example.com", &[Role::Consumer]);
    let other = fx.user("o@example.com", &[Role::Provider]);
    fx.item("alpha/rs/mine", provider.user_id, ItemType::Resource);
    fx.item("alpha/rs/theirs", other.user_id, ItemType::Resource);
    fx.item("alpha/rg", provider.user_id, ItemType::ResourceGroup);

    let missing = fx
        .manager
        .create_policy(vec![request(consumer.user_id, "alpha/rs/nope")], &provider, None)
        .await
        .unwrap_err();
    assert_eq!(missing.code, ErrorCode::ItemNotFound);
    assert_eq!(missing.ids, vec!["alpha/rs/nope".to_string()]);

    let mismatch = fx
        .manager
        .create_policy(vec![request(consumer.user_id, "alpha/rg")], &provider, None)
        .await
        .unwrap_err();
    assert_eq!(mismatch.code, ErrorCode::ItemTypeMismatch);

    let not_owner = fx
        .manager
        .create_policy(
            vec![
                request(consumer.user_id, "alpha/rs/mine"),
                request(consumer.user_id, "alpha/rs/theirs"),
            ],
            &provider,
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(not_owner.code, ErrorCode::NotResOwner);
    assert_eq!(not_owner.status, 403);

    let stranger = UserId::new();
    let unknown_grantee = fx
        .manager
        .create_policy(vec![request(stranger, "alpha/rs/mine")], &provider, None)
        .await
        .unwrap_err();
    assert_eq!(unknown_grantee.code, ErrorCode::UserNotFound);
    assert_eq!(unknown_grantee.ids, vec![stranger.to_string()]);

    let mut past = request(consumer.user_id, "alpha/rs/mine");
    past.expiry_time = Some(Utc::now() - Duration::minutes(1));
    let expired = fx
        .manager
        .create_policy(vec![past], &provider, None)
        .await
        .unwrap_err();
    assert_eq!(expired.code, ErrorCode::InvalidExpiry);

    assert_eq!(fx.store.policy_count(), 0);
}

#[tokio::test]
async fn second_active_grant_is_a_conflict() {
    let fx = fixture();
    let provider = fx.user("p@example.com", &[Role::Provider]);
    let consumer = fx.user("c@example.com", &[Role::Consumer]);
    fx.item("alpha/rs/one", provider.user_id, ItemType::Resource);

    let first = fx
        .manager
        .create_policy(vec![request(consumer.user_id, "alpha/rs/one")], &provider, None)
        .await
        .unwrap();
    let err = fx
        .manager
        .create_policy(vec![request(consumer.user_id, "alpha/rs/one")], &provider, None)
        .await
        .unwrap_err();
    assert_eq!(err.status, 409);
    assert_eq!(err.ids, vec![first[0].id.to_string()]);
}

#[tokio::test]
async fn provider_delegate_grants_through_one_hop() {
    let fx = fixture();
    let provider = fx.user("p@example.com", &[Role::Provider]);
    let delegate = fx.user("d@example.com", &[Role::Delegate]);
    let consumer = fx.user("c@example.com", &[Role::Consumer]);
    fx.item("alpha/rs/one", provider.user_id, ItemType::Resource);

    let denied = fx
        .manager
        .create_policy(vec![request(consumer.user_id, "alpha/rs/one")], &delegate, None)
        .await
        .unwrap_err();
    assert_eq!(denied.code, ErrorCode::NotResOwner);

    fx.delegate(provider.user_id, delegate.user_id, Role::Provider)
        .await;
    let created = fx
        .manager
        .create_policy(vec![request(consumer.user_id, "alpha/rs/one")], &delegate, None)
        .await
        .unwrap();
    assert_eq!(created[0].owner_id, provider.user_id);

    let listed = fx.manager.list_policy(&delegate, None).await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn auth_delegate_acts_for_the_provider() {
    let fx = fixture();
    let provider = fx.user("p@example.com", &[Role::Provider]);
    let consumer = fx.user("c@example.com", &[Role::Consumer]);
    let helper = User::new(UserId::new(), "h@example.com").with_role(Role::Delegate, [AUTH_SERVER]);
    fx.registry.insert(helper.clone());
    fx.item("alpha/rs/one", provider.user_id, ItemType::Resource);

    let info = DelegationInformation {
        delegation_id: DelegationId::new(),
        delegator_user_id: provider.user_id,
        delegated_role: Role::Provider,
        resource_server_url: AUTH_SERVER.into(),
    };
    let created = fx
        .manager
        .create_policy(
            vec![request(consumer.user_id, "alpha/rs/one")],
            &helper,
            Some(&info),
        )
        .await
        .unwrap();
    assert_eq!(created[0].owner_id, provider.user_id);
}

#[tokio::test]
async fn role_gate_separates_resource_server_grants() {
    let fx = fixture();
    let admin = fx.user("a@example.com", &[Role::Admin]);
    let consumer = fx.user("c@example.com", &[Role::Consumer]);
    fx.item("alpha.com", admin.user_id, ItemType::ResourceServer);
    fx.item("alpha/rs/one", admin.user_id, ItemType::Resource);

    let mut rs_grant = request(consumer.user_id, "alpha.com");
    rs_grant.item_type = ItemType::ResourceServer;
    fx.manager
        .create_policy(vec![rs_grant.clone()], &admin, None)
        .await
        .unwrap();

    let admin_on_resource = fx
        .manager
        .create_policy(vec![request(consumer.user_id, "alpha/rs/one")], &admin, None)
        .await
        .unwrap_err();
    assert_eq!(admin_on_resource.code, ErrorCode::InvalidRole);
    assert_eq!(admin_on_resource.status, 403);

    let consumer_grant = fx
        .manager
        .create_policy(vec![rs_grant], &consumer, None)
        .await
        .unwrap_err();
    assert_eq!(consumer_grant.code, ErrorCode::InvalidRole);
}

#[tokio::test]
async fn deleting_twice_fails_like_an_unknown_id() {
    let fx = fixture();
    let provider = fx.user("p@example.com", &[Role::Provider]);
    let consumer = fx.user("c@example.com", &[Role::Consumer]);
    fx.item("alpha/rs/one", provider.user_id, ItemType::Resource);
    let created = fx
        .manager
        .create_policy(vec![request(consumer.user_id, "alpha/rs/one")], &provider, None)
        .await
        .unwrap();
    let id = created[0].id;

    fx.manager
        .delete_policy(vec![id], &provider, None)
        .await
        .unwrap();
    let again = fx
        .manager
        .delete_policy(vec![id], &provider, None)
        .await
        .unwrap_err();
    let unknown = fx
        .manager
        .delete_policy(vec![authgrant_core_types::PolicyId::new()], &provider, None)
        .await
        .unwrap_err();
    assert_eq!(again.code, unknown.code);
    assert_eq!(again.status, unknown.status);
    assert_eq!(again.kind, unknown.kind);

    let rows = fx.store.policies(&PolicyFilter::default()).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn grantee_cannot_delete_the_grant() {
    let fx = fixture();
    let provider = fx.user("p@example.com", &[Role::Provider]);
    let consumer = fx.user("c@example.com", &[Role::Consumer, Role::Delegate]);
    fx.item("alpha/rs/one", provider.user_id, ItemType::Resource);
    let created = fx
        .manager
        .create_policy(vec![request(consumer.user_id, "alpha/rs/one")], &provider, None)
        .await
        .unwrap();

    let err = fx
        .manager
        .delete_policy(vec![created[0].id], &consumer, None)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidPolicyId);
    assert_eq!(err.ids, vec![created[0].id.to_string()]);
}
