//! Read-through cache for warehouse and material records. Reports and
//! document views look these up once per row, so they are kept in memory
//! for a short TTL instead of hitting the store every time.

use std::sync::Arc;
use std::time::Duration;

use depot_core::{LedgerStore, Material, StoreResult, Warehouse};
use moka::future::Cache;
use tracing::debug;
use uuid::Uuid;

const MAX_ENTRIES: u64 = 10_000;

#[derive(Clone)]
pub struct LookupCache {
    store: Arc<dyn LedgerStore>,
    warehouses: Cache<Uuid, Warehouse>,
    materials: Cache<Uuid, Material>,
}

impl LookupCache {
    pub fn new(store: Arc<dyn LedgerStore>, ttl: Duration) -> Self {
        Self {
            store,
            warehouses: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(ttl)
                .build(),
            materials: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn warehouse(&self, id: Uuid) -> StoreResult<Option<Warehouse>> {
        if let Some(warehouse) = self.warehouses.get(&id).await {
            return Ok(Some(warehouse));
        }
        debug!(%id, "warehouse cache miss");
        let warehouse = self.store.warehouse(id).await?;
        if let Some(warehouse) = &warehouse {
            self.warehouses.insert(id, warehouse.clone()).await;
        }
        Ok(warehouse)
    }

    pub async fn material(&self, id: Uuid) -> StoreResult<Option<Material>> {
        if let Some(material) = self.materials.get(&id).await {
            return Ok(Some(material));
        }
        debug!(%id, "material cache miss");
        let material = self.store.material(id).await?;
        if let Some(material) = &material {
            self.materials.insert(id, material.clone()).await;
        }
        Ok(material)
    }

    /// Replaces a cached material after it was changed through the service.
    pub async fn refresh_material(&self, material: Material) {
        self.materials.insert(material.id, material).await;
    }

    pub async fn warehouse_name(&self, id: Uuid) -> Option<String> {
        self.warehouse(id).await.ok().flatten().map(|w| w.name)
    }

    pub async fn material_name(&self, id: Uuid) -> Option<String> {
        self.material(id).await.ok().flatten().map(|m| m.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use depot_core::CostingMethod;
    use depot_store::InMemoryLedgerStore;

    fn material(code: &str) -> Material {
        Material {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: format!("Material {code}"),
            unit: "box".to_string(),
            costing_method: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn serves_cached_material_until_refreshed() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let cache = LookupCache::new(store.clone(), Duration::from_secs(60));
        let paracetamol = material("VT-01");
        store.insert_material(&paracetamol).await.unwrap();

        let first = cache.material(paracetamol.id).await.unwrap().unwrap();
        assert_eq!(first.costing_method, None);

        let updated = store
            .set_costing_method(paracetamol.id, Some(CostingMethod::Fifo))
            .await
            .unwrap();
        let stale = cache.material(paracetamol.id).await.unwrap().unwrap();
        assert_eq!(stale.costing_method, None);

        cache.refresh_material(updated).await;
        let fresh = cache.material(paracetamol.id).await.unwrap().unwrap();
        assert_eq!(fresh.costing_method, Some(CostingMethod::Fifo));
    }

    #[tokio::test]
    async fn unknown_ids_are_not_cached() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let cache = LookupCache::new(store.clone(), Duration::from_secs(60));
        let missing = Uuid::new_v4();
        assert!(cache.warehouse(missing).await.unwrap().is_none());
        assert_eq!(cache.warehouse_name(missing).await, None);
    }
}
