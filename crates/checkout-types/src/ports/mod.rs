pub mod catalog;
pub mod coupon_repository;
pub mod notifier;
pub mod order_repository;
pub mod slot_repository;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("db error: {0}")]
    DbError(String),
}
