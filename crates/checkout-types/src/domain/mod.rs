pub mod coupon;
pub mod order;
pub mod slot;
