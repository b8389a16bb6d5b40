use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::RepoError;
use crate::domain::slot::Slot;

#[derive(Debug, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved,
    /// An active reservation overlaps the requested interval.
    Taken,
}

#[async_trait]
pub trait SlotRepository: Send + Sync + 'static {
    /// Active (non-released) reservations for a service whose interval
    /// touches `[from, to)`.
    async fn active_reservations(
        &self,
        service_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Slot>, RepoError>;
    /// Atomic check-and-insert: the overlap check and the write happen under
    /// one guard, so two racers for overlapping intervals cannot both win.
    async fn reserve(&self, slot: Slot, order_id: Uuid) -> Result<ReserveOutcome, RepoError>;
    /// Frees every reservation held by `order_id`; returns how many were
    /// freed. Releasing an order with no active reservations is a no-op.
    async fn release_for_order(&self, order_id: Uuid) -> Result<u32, RepoError>;
}
