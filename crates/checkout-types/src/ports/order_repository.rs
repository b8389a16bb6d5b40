use async_trait::async_trait;
use uuid::Uuid;

use super::RepoError;
use crate::domain::order::Order;

/// Outcome of a versioned compare-and-update.
#[derive(Debug)]
pub enum CasOutcome {
    /// The stored version matched; the returned order carries the new version.
    Updated(Order),
    /// Someone else moved the order first; nothing was written.
    Conflict,
    Missing,
}

#[async_trait]
pub trait OrderRepository: Send + Sync + 'static {
    async fn create(&self, order: Order) -> Result<Order, RepoError>;
    async fn get(&self, id: Uuid) -> Result<Option<Order>, RepoError>;
    /// Orders still awaiting payment, oldest first.
    async fn list_pending(&self) -> Result<Vec<Order>, RepoError>;
    /// Writes `order` only if the stored version equals `expected_version`.
    /// This is the sole mutation path after creation; the order's state,
    /// lines and timestamps all move together or not at all.
    async fn compare_and_update(
        &self,
        expected_version: u64,
        order: Order,
    ) -> Result<CasOutcome, RepoError>;
}
