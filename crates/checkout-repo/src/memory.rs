use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use checkout_types::domain::coupon::Coupon;
use checkout_types::domain::order::{Order, OrderState};
use checkout_types::domain::slot::Slot;
use checkout_types::ports::coupon_repository::{CouponRepository, RedeemOutcome};
use checkout_types::ports::order_repository::{CasOutcome, OrderRepository};
use checkout_types::ports::slot_repository::{ReserveOutcome, SlotRepository};
use checkout_types::ports::RepoError;

struct CouponEntry {
    coupon: Coupon,
    redeemed_by: HashSet<Uuid>,
}

struct Reservation {
    slot: Slot,
    order_id: Uuid,
}

/// DashMap-backed adapter for all three repositories. Conditional updates
/// run under the map's per-entry guard, which is what makes the coupon
/// compare-and-increment, the slot check-and-insert and the order CAS
/// single atomic operations here.
#[derive(Clone)]
pub struct InMemoryRepo {
    orders: Arc<DashMap<Uuid, Order>>,
    coupons: Arc<DashMap<String, CouponEntry>>,
    reservations: Arc<DashMap<Uuid, Vec<Reservation>>>,
}

impl InMemoryRepo {
    pub fn new() -> Self {
        Self {
            orders: Arc::new(DashMap::new()),
            coupons: Arc::new(DashMap::new()),
            reservations: Arc::new(DashMap::new()),
        }
    }

    /// Test/bootstrap helper; same effect as `CouponRepository::create`.
    pub fn seed_coupon(&self, coupon: Coupon) {
        self.coupons.insert(
            coupon.code.clone(),
            CouponEntry {
                coupon,
                redeemed_by: HashSet::new(),
            },
        );
    }
}

impl Default for InMemoryRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderRepository for InMemoryRepo {
    async fn create(&self, order: Order) -> Result<Order, RepoError> {
        self.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, RepoError> {
        Ok(self.orders.get(&id).map(|r| r.clone()))
    }

    async fn list_pending(&self) -> Result<Vec<Order>, RepoError> {
        let mut pending: Vec<Order> = self
            .orders
            .iter()
            .filter(|kv| matches!(kv.value().state, OrderState::Pending))
            .map(|kv| kv.value().clone())
            .collect();
        pending.sort_by_key(|o| o.created_at);
        Ok(pending)
    }

    async fn compare_and_update(
        &self,
        expected_version: u64,
        mut order: Order,
    ) -> Result<CasOutcome, RepoError> {
        let Some(mut current) = self.orders.get_mut(&order.id) else {
            return Ok(CasOutcome::Missing);
        };
        if current.version != expected_version {
            return Ok(CasOutcome::Conflict);
        }
        order.version = expected_version + 1;
        *current = order.clone();
        Ok(CasOutcome::Updated(order))
    }
}

#[async_trait]
impl CouponRepository for InMemoryRepo {
    async fn create(&self, coupon: Coupon) -> Result<Coupon, RepoError> {
        self.seed_coupon(coupon.clone());
        Ok(coupon)
    }

    async fn find(&self, code: &str) -> Result<Option<Coupon>, RepoError> {
        Ok(self.coupons.get(code).map(|e| e.coupon.clone()))
    }

    async fn redeem(&self, code: &str, order_id: Uuid) -> Result<RedeemOutcome, RepoError> {
        let Some(mut entry) = self.coupons.get_mut(code) else {
            return Ok(RedeemOutcome::NotFound);
        };
        if entry.redeemed_by.contains(&order_id) {
            return Ok(RedeemOutcome::Redeemed);
        }
        if entry.coupon.used_count >= entry.coupon.usage_limit {
            return Ok(RedeemOutcome::Exhausted);
        }
        entry.coupon.used_count += 1;
        entry.redeemed_by.insert(order_id);
        Ok(RedeemOutcome::Redeemed)
    }

    async fn release(&self, code: &str, order_id: Uuid) -> Result<bool, RepoError> {
        let Some(mut entry) = self.coupons.get_mut(code) else {
            return Ok(false);
        };
        if !entry.redeemed_by.remove(&order_id) {
            return Ok(false);
        }
        entry.coupon.used_count = entry.coupon.used_count.saturating_sub(1);
        Ok(true)
    }
}

#[async_trait]
impl SlotRepository for InMemoryRepo {
    async fn active_reservations(
        &self,
        service_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Slot>, RepoError> {
        let Some(held) = self.reservations.get(&service_id) else {
            return Ok(Vec::new());
        };
        let mut slots: Vec<Slot> = held
            .iter()
            .filter(|r| r.slot.starts_at < to && r.slot.ends_at() > from)
            .map(|r| r.slot)
            .collect();
        slots.sort_by_key(|s| s.starts_at);
        Ok(slots)
    }

    async fn reserve(&self, slot: Slot, order_id: Uuid) -> Result<ReserveOutcome, RepoError> {
        // entry guard: collision check and insert are one critical section
        let mut held = self.reservations.entry(slot.service_id).or_default();
        if held.iter().any(|r| r.slot.collides_with(&slot)) {
            return Ok(ReserveOutcome::Taken);
        }
        held.push(Reservation { slot, order_id });
        Ok(ReserveOutcome::Reserved)
    }

    async fn release_for_order(&self, order_id: Uuid) -> Result<u32, RepoError> {
        let mut freed = 0u32;
        for mut held in self.reservations.iter_mut() {
            let before = held.len();
            held.retain(|r| r.order_id != order_id);
            freed += (before - held.len()) as u32;
        }
        Ok(freed)
    }
}
