use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a coupon cannot be applied to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum CouponRejection {
    #[error("coupon not found")]
    NotFound,
    #[error("coupon inactive")]
    Inactive,
    #[error("coupon outside its validity window")]
    Expired,
    #[error("order total below the coupon minimum")]
    BelowMinimum,
    #[error("coupon usage limit reached")]
    Exhausted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    /// Uppercase, trimmed. Normalize lookups with [`Coupon::normalize_code`].
    pub code: String,
    pub discount: i64,
    pub min_order_value: i64,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub usage_limit: u32,
    pub used_count: u32,
    pub active: bool,
}

impl Coupon {
    pub fn normalize_code(raw: &str) -> String {
        raw.trim().to_uppercase()
    }

    /// Checks everything except redemption itself; the usage counter is only
    /// advisory here and is re-checked atomically at redeem time.
    pub fn validate(&self, order_total: i64, now: DateTime<Utc>) -> Result<i64, CouponRejection> {
        if !self.active {
            return Err(CouponRejection::Inactive);
        }
        if now < self.starts_at || now > self.ends_at {
            return Err(CouponRejection::Expired);
        }
        if order_total < self.min_order_value {
            return Err(CouponRejection::BelowMinimum);
        }
        if self.used_count >= self.usage_limit {
            return Err(CouponRejection::Exhausted);
        }
        Ok(self.discount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon() -> Coupon {
        let now = Utc::now();
        Coupon {
            code: "WELCOME".into(),
            discount: 50_000,
            min_order_value: 100_000,
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(1),
            usage_limit: 1,
            used_count: 0,
            active: true,
        }
    }

    #[test]
    fn normalizes_codes() {
        assert_eq!(Coupon::normalize_code("  welcome "), "WELCOME");
    }

    #[test]
    fn valid_coupon_yields_discount() {
        assert_eq!(coupon().validate(500_000, Utc::now()), Ok(50_000));
    }

    #[test]
    fn rejection_reasons() {
        let now = Utc::now();

        let mut c = coupon();
        c.active = false;
        assert_eq!(c.validate(500_000, now), Err(CouponRejection::Inactive));

        let c = coupon();
        assert_eq!(
            c.validate(500_000, c.ends_at + Duration::hours(1)),
            Err(CouponRejection::Expired)
        );
        assert_eq!(
            c.validate(500_000, c.starts_at - Duration::hours(1)),
            Err(CouponRejection::Expired)
        );

        assert_eq!(
            coupon().validate(99_999, now),
            Err(CouponRejection::BelowMinimum)
        );

        let mut c = coupon();
        c.used_count = 1;
        assert_eq!(c.validate(500_000, now), Err(CouponRejection::Exhausted));
    }
}
