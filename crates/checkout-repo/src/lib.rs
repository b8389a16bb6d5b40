#[cfg(not(any(feature = "memory", feature = "sqlite")))]
compile_error!("Enable a repo feature: `memory` or `sqlite`.");

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use checkout_types::domain::coupon::Coupon;
use checkout_types::domain::order::Order;
use checkout_types::domain::slot::Slot;
use checkout_types::ports::coupon_repository::{CouponRepository, RedeemOutcome};
use checkout_types::ports::order_repository::{CasOutcome, OrderRepository};
use checkout_types::ports::slot_repository::{ReserveOutcome, SlotRepository};
use checkout_types::ports::RepoError;

pub mod catalog;
#[cfg(feature = "memory")]
pub mod memory;
pub mod notify;
#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Backend selected at build time; sqlite wins when both features are on.
pub enum Repo {
    #[cfg(feature = "memory")]
    Memory(memory::InMemoryRepo),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite::SqliteRepo),
}

#[cfg(feature = "sqlite")]
pub async fn build_repo(database_url: Option<&str>) -> anyhow::Result<Repo> {
    let url = database_url.unwrap_or("sqlite://checkout.db");
    Ok(Repo::Sqlite(sqlite::SqliteRepo::new(url).await?))
}

#[cfg(all(feature = "memory", not(feature = "sqlite")))]
pub async fn build_repo(_database_url: Option<&str>) -> anyhow::Result<Repo> {
    Ok(Repo::Memory(memory::InMemoryRepo::new()))
}

#[async_trait]
impl OrderRepository for Repo {
    async fn create(&self, order: Order) -> Result<Order, RepoError> {
        match self {
            #[cfg(feature = "memory")]
            Repo::Memory(r) => OrderRepository::create(r, order).await,
            #[cfg(feature = "sqlite")]
            Repo::Sqlite(r) => OrderRepository::create(r, order).await,
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, RepoError> {
        match self {
            #[cfg(feature = "memory")]
            Repo::Memory(r) => OrderRepository::get(r, id).await,
            #[cfg(feature = "sqlite")]
            Repo::Sqlite(r) => OrderRepository::get(r, id).await,
        }
    }

    async fn list_pending(&self) -> Result<Vec<Order>, RepoError> {
        match self {
            #[cfg(feature = "memory")]
            Repo::Memory(r) => r.list_pending().await,
            #[cfg(feature = "sqlite")]
            Repo::Sqlite(r) => r.list_pending().await,
        }
    }

    async fn compare_and_update(
        &self,
        expected_version: u64,
        order: Order,
    ) -> Result<CasOutcome, RepoError> {
        match self {
            #[cfg(feature = "memory")]
            Repo::Memory(r) => r.compare_and_update(expected_version, order).await,
            #[cfg(feature = "sqlite")]
            Repo::Sqlite(r) => r.compare_and_update(expected_version, order).await,
        }
    }
}

#[async_trait]
impl CouponRepository for Repo {
    async fn create(&self, coupon: Coupon) -> Result<Coupon, RepoError> {
        match self {
            #[cfg(feature = "memory")]
            Repo::Memory(r) => CouponRepository::create(r, coupon).await,
            #[cfg(feature = "sqlite")]
            Repo::Sqlite(r) => CouponRepository::create(r, coupon).await,
        }
    }

    async fn find(&self, code: &str) -> Result<Option<Coupon>, RepoError> {
        match self {
            #[cfg(feature = "memory")]
            Repo::Memory(r) => r.find(code).await,
            #[cfg(feature = "sqlite")]
            Repo::Sqlite(r) => r.find(code).await,
        }
    }

    async fn redeem(&self, code: &str, order_id: Uuid) -> Result<RedeemOutcome, RepoError> {
        match self {
            #[cfg(feature = "memory")]
            Repo::Memory(r) => r.redeem(code, order_id).await,
            #[cfg(feature = "sqlite")]
            Repo::Sqlite(r) => r.redeem(code, order_id).await,
        }
    }

    async fn release(&self, code: &str, order_id: Uuid) -> Result<bool, RepoError> {
        match self {
            #[cfg(feature = "memory")]
            Repo::Memory(r) => r.release(code, order_id).await,
            #[cfg(feature = "sqlite")]
            Repo::Sqlite(r) => r.release(code, order_id).await,
        }
    }
}

#[async_trait]
impl SlotRepository for Repo {
    async fn active_reservations(
        &self,
        service_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Slot>, RepoError> {
        match self {
            #[cfg(feature = "memory")]
            Repo::Memory(r) => r.active_reservations(service_id, from, to).await,
            #[cfg(feature = "sqlite")]
            Repo::Sqlite(r) => r.active_reservations(service_id, from, to).await,
        }
    }

    async fn reserve(&self, slot: Slot, order_id: Uuid) -> Result<ReserveOutcome, RepoError> {
        match self {
            #[cfg(feature = "memory")]
            Repo::Memory(r) => r.reserve(slot, order_id).await,
            #[cfg(feature = "sqlite")]
            Repo::Sqlite(r) => r.reserve(slot, order_id).await,
        }
    }

    async fn release_for_order(&self, order_id: Uuid) -> Result<u32, RepoError> {
        match self {
            #[cfg(feature = "memory")]
            Repo::Memory(r) => SlotRepository::release_for_order(r, order_id).await,
            #[cfg(feature = "sqlite")]
            Repo::Sqlite(r) => SlotRepository::release_for_order(r, order_id).await,
        }
    }
}
