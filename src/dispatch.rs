use async_trait::async_trait;

use crate::entity::orders;

/// Post-commit hand-off for billing documents, sales records and customer
/// notifications. Implementations run only after the order transaction has
/// durably committed, and their failures never reach the checkout caller.
#[async_trait]
pub trait OrderEventSink: Send + Sync {
    async fn order_placed(&self, order: &orders::Model);
}

/// Default sink: records the hand-off in the log stream. Real delivery
/// (bills, WhatsApp/SMS) plugs in behind the same trait.
pub struct LogSink;

#[async_trait]
impl OrderEventSink for LogSink {
    async fn order_placed(&self, order: &orders::Model) {
        tracing::info!(
            order_id = order.id,
            phone = %order.phone,
            total = %order.total_price,
            "order placed; billing and notification dispatch queued"
        );
    }
}
