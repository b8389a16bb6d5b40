pub mod checkout;
pub mod coupons;
pub mod gateway;
pub mod slots;
