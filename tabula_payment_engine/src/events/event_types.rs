use crate::db_types::PaymentIntent;

/// Emitted when an intent reaches `Captured`, whether via the synchronous path or a webhook confirmation.
/// Fulfilment (kitchen tickets, receipts) hangs off this event.
#[derive(Debug, Clone)]
pub struct PaymentCapturedEvent {
    pub intent: PaymentIntent,
}

impl PaymentCapturedEvent {
    pub fn new(intent: PaymentIntent) -> Self {
        Self { intent }
    }
}

/// Emitted when an intent reaches a terminal `Failed` (hard decline or all providers exhausted).
#[derive(Debug, Clone)]
pub struct PaymentFailedEvent {
    pub intent: PaymentIntent,
}

impl PaymentFailedEvent {
    pub fn new(intent: PaymentIntent) -> Self {
        Self { intent }
    }
}
