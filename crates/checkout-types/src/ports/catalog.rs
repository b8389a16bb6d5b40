use async_trait::async_trait;
use uuid::Uuid;

use super::RepoError;

/// Price/duration lookups supplied by the catalog subsystem. The checkout
/// core never writes through this port.
#[derive(Debug, Clone)]
pub struct ProductInfo {
    pub id: Uuid,
    pub name: String,
    pub price: i64,
}

#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub id: Uuid,
    pub name: String,
    pub price: i64,
    pub duration_min: i64,
}

#[async_trait]
pub trait CatalogPort: Send + Sync + 'static {
    async fn product(&self, id: Uuid) -> Result<Option<ProductInfo>, RepoError>;
    async fn service(&self, id: Uuid) -> Result<Option<ServiceInfo>, RepoError>;
}
