use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use checkout_types::ports::catalog::{CatalogPort, ProductInfo, ServiceInfo};
use checkout_types::ports::RepoError;

/// Seedable stand-in for the external catalog subsystem. The checkout core
/// only ever reads price and duration through this, so a map is all it takes.
#[derive(Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<Uuid, ProductInfo>>,
    services: RwLock<HashMap<Uuid, ServiceInfo>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_product(&self, product: ProductInfo) {
        if let Ok(mut map) = self.products.write() {
            map.insert(product.id, product);
        }
    }

    pub fn seed_service(&self, service: ServiceInfo) {
        if let Ok(mut map) = self.services.write() {
            map.insert(service.id, service);
        }
    }
}

#[async_trait]
impl CatalogPort for InMemoryCatalog {
    async fn product(&self, id: Uuid) -> Result<Option<ProductInfo>, RepoError> {
        let map = self
            .products
            .read()
            .map_err(|e| RepoError::DbError(e.to_string()))?;
        Ok(map.get(&id).cloned())
    }

    async fn service(&self, id: Uuid) -> Result<Option<ServiceInfo>, RepoError> {
        let map = self
            .services
            .read()
            .map_err(|e| RepoError::DbError(e.to_string()))?;
        Ok(map.get(&id).cloned())
    }
}
