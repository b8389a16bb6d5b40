use async_trait::async_trait;

use crate::domain::order::Order;

#[derive(thiserror::Error, Debug)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Outbound notification collaborator. Invoked fire-and-forget on booking
/// completion; a failure here is logged and never fails the order.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn booking_completed(&self, order: &Order) -> Result<(), NotifyError>;
}
