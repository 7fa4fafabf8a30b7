use serde::Serialize;

use crate::db_types::{DisputeCase, DisputeStatus, Purchase, RefundRequest};

/// Fired when a purchase transitions to `completed` on a verified charge confirmation.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseSettledEvent {
    pub purchase: Purchase,
}

impl PurchaseSettledEvent {
    pub fn new(purchase: Purchase) -> Self {
        Self { purchase }
    }
}

/// Fired when the processor confirms that a refund has succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct RefundSettledEvent {
    pub refund: RefundRequest,
    pub purchase: Purchase,
}

impl RefundSettledEvent {
    pub fn new(refund: RefundRequest, purchase: Purchase) -> Self {
        Self { refund, purchase }
    }
}

/// Fired when a dispute reaches a terminal decision.
#[derive(Debug, Clone, Serialize)]
pub struct DisputeClosedEvent {
    pub dispute: DisputeCase,
    pub outcome: DisputeStatus,
}

impl DisputeClosedEvent {
    pub fn new(dispute: DisputeCase) -> Self {
        let outcome = dispute.status;
        Self { dispute, outcome }
    }
}
