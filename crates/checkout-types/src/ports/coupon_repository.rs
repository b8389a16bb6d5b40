use async_trait::async_trait;
use uuid::Uuid;

use super::RepoError;
use crate::domain::coupon::Coupon;

#[derive(Debug, PartialEq, Eq)]
pub enum RedeemOutcome {
    /// Counter incremented, or this order had already redeemed (replayed
    /// callback) — either way the redemption is in effect.
    Redeemed,
    /// `used_count` was already at the limit; nothing changed.
    Exhausted,
    NotFound,
}

#[async_trait]
pub trait CouponRepository: Send + Sync + 'static {
    async fn create(&self, coupon: Coupon) -> Result<Coupon, RepoError>;
    /// Lookup by normalized code.
    async fn find(&self, code: &str) -> Result<Option<Coupon>, RepoError>;
    /// Compare-and-increment: bumps `used_count` only while it is below
    /// `usage_limit`, in one conditional write, and records `order_id` so a
    /// retried redemption for the same order is a no-op success.
    async fn redeem(&self, code: &str, order_id: Uuid) -> Result<RedeemOutcome, RepoError>;
    /// Conditional decrement, keyed by the redemption record for `order_id`.
    /// Returns `false` (and changes nothing) when that order never redeemed
    /// or was already released, so release is idempotent per order.
    async fn release(&self, code: &str, order_id: Uuid) -> Result<bool, RepoError>;
}
