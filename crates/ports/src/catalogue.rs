use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use authgrant_core_types::{AccessPolicy, ItemId, ItemType, ResourceServerId, UserId};

use crate::errors::{PortError, PortResult};

const SERVICE: &str = "catalogue";

/// Item as resolved by a batch lookup on catalogue ids.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogueItem {
    pub item_type: ItemType,
    pub internal_id: ItemId,
    pub catalogue_id: String,
    pub owner_id: UserId,
    pub resource_server_id: ResourceServerId,
    pub resource_group_id: Option<ItemId>,
}

/// Everything the access decision needs to know about one item.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDetails {
    pub catalogue_id: String,
    pub item_type: ItemType,
    pub owner_id: UserId,
    pub resource_server_url: String,
    pub resource_group_id: Option<ItemId>,
    pub apd_url: Option<String>,
    pub access_policy: AccessPolicy,
}

#[async_trait]
pub trait CatalogueClient: Send + Sync {
    /// Resolves catalogue ids grouped by their claimed type. Fails naming the
    /// first id that does not resolve. Each result carries the type the
    /// catalogue records, which may differ from the claimed one.
    async fn check_req_items(
        &self,
        requested: &BTreeMap<ItemType, Vec<String>>,
    ) -> PortResult<HashMap<String, CatalogueItem>>;

    async fn get_resource_details(&self, item_id: ItemId) -> PortResult<ResourceDetails>;

    /// Best effort; unknown ids are left out of the map.
    async fn get_cat_ids(&self, item_ids: &[ItemId]) -> PortResult<HashMap<ItemId, String>>;
}

/// Full catalogue record held by [`InMemoryCatalogue`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CatalogueEntry {
    pub internal_id: ItemId,
    pub catalogue_id: String,
    pub item_type: ItemType,
    pub owner_id: UserId,
    pub resource_server_id: ResourceServerId,
    pub resource_server_url: String,
    pub resource_group_id: Option<ItemId>,
    pub apd_url: Option<String>,
    pub access_policy: AccessPolicy,
}

impl CatalogueEntry {
    fn item(&self) -> CatalogueItem {
        CatalogueItem {
            item_type: self.item_type,
            internal_id: self.internal_id,
            catalogue_id: self.catalogue_id.clone(),
            owner_id: self.owner_id,
            resource_server_id: self.resource_server_id,
            resource_group_id: self.resource_group_id,
        }
    }

    fn details(&self) -> ResourceDetails {
        ResourceDetails {
            catalogue_id: self.catalogue_id.clone(),
            item_type: self.item_type,
            owner_id: self.owner_id,
            resource_server_url: self.resource_server_url.clone(),
            resource_group_id: self.resource_group_id,
            apd_url: self.apd_url.clone(),
            access_policy: self.access_policy,
        }
    }
}

#[derive(Default)]
pub struct InMemoryCatalogue {
    by_internal: DashMap<ItemId, CatalogueEntry>,
    by_catalogue: DashMap<String, ItemId>,
    outage: RwLock<Option<PortError>>,
}

impl InMemoryCatalogue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, entry: CatalogueEntry) {
        self.by_catalogue
            .insert(entry.catalogue_id.clone(), entry.internal_id);
        self.by_internal.insert(entry.internal_id, entry);
    }

    /// Makes every call fail with `error` until cleared with `None`.
    pub fn set_outage(&self, error: Option<PortError>) {
        *self.outage.write() = error;
    }

    fn check_outage(&self) -> PortResult<()> {
        match self.outage.read().as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CatalogueClient for InMemoryCatalogue {
    async fn check_req_items(
        &self,
        requested: &BTreeMap<ItemType, Vec<String>>,
    ) -> PortResult<HashMap<String, CatalogueItem>> {
        self.check_outage()?;
        let mut resolved = HashMap::new();
        for ids in requested.values() {
            for cat_id in ids {
                let entry = self
                    .by_catalogue
                    .get(cat_id)
                    .and_then(|internal| self.by_internal.get(internal.value()).map(|e| e.clone()))
                    .ok_or_else(|| PortError::not_found(SERVICE, [cat_id]))?;
                resolved.insert(cat_id.clone(), entry.item());
            }
        }
        Ok(resolved)
    }

    async fn get_resource_details(&self, item_id: ItemId) -> PortResult<ResourceDetails> {
        self.check_outage()?;
        self.by_internal
            .get(&item_id)
            .map(|entry| entry.details())
            .ok_or_else(|| PortError::not_found(SERVICE, [item_id]))
    }

    async fn get_cat_ids(&self, item_ids: &[ItemId]) -> PortResult<HashMap<ItemId, String>> {
        self.check_outage()?;
        Ok(item_ids
            .iter()
            .filter_map(|id| {
                self.by_internal
                    .get(id)
                    .map(|entry| (*id, entry.catalogue_id.clone()))
            })
            .collect())
    }
}
