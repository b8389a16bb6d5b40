use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::AppError;
use checkout_types::domain::coupon::{Coupon, CouponRejection};
use checkout_types::ports::coupon_repository::{CouponRepository, RedeemOutcome};

/// Validates and atomically redeems coupons. The validity/minimum checks run
/// here; the usage ceiling is enforced by the repository's conditional
/// increment, because that is the one check a concurrent redeemer can race.
#[derive(Clone)]
pub struct CouponLedger {
    repo: Arc<dyn CouponRepository>,
}

impl CouponLedger {
    pub fn new(repo: Arc<dyn CouponRepository>) -> Self {
        Self { repo }
    }

    /// Returns the discount a coupon grants against `order_total`, or the
    /// specific rejection as a conflict.
    pub async fn validate(
        &self,
        code: &str,
        order_total: i64,
        now: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        let code = Coupon::normalize_code(code);
        let coupon = self
            .repo
            .find(&code)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("coupon {code}")))?;
        coupon
            .validate(order_total, now)
            .map_err(|r| AppError::Conflict(r.to_string()))
    }

    /// Compare-and-increment tied to `order_id`; replaying the same order's
    /// redemption is a success without a second increment.
    pub async fn redeem(&self, code: &str, order_id: Uuid) -> Result<(), AppError> {
        let code = Coupon::normalize_code(code);
        match self.repo.redeem(&code, order_id).await? {
            RedeemOutcome::Redeemed => Ok(()),
            RedeemOutcome::Exhausted => {
                Err(AppError::Conflict(CouponRejection::Exhausted.to_string()))
            }
            RedeemOutcome::NotFound => Err(AppError::NotFound(format!("coupon {code}"))),
        }
    }

    /// Gives back one use when a redeeming order is cancelled before payment.
    /// Idempotent per order; releasing an order that never redeemed is a
    /// no-op.
    pub async fn release(&self, code: &str, order_id: Uuid) -> Result<(), AppError> {
        let code = Coupon::normalize_code(code);
        self.repo.release(&code, order_id).await?;
        Ok(())
    }
}
