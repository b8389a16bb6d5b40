use async_trait::async_trait;

use checkout_types::domain::order::Order;
use checkout_types::ports::notifier::{Notifier, NotifyError};

/// Log-only notification adapter. The real collaborator sends email; the
/// core treats either as fire-and-forget.
#[derive(Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn booking_completed(&self, order: &Order) -> Result<(), NotifyError> {
        tracing::info!(order_id = %order.id, email = %order.email, "booking completed");
        Ok(())
    }
}
