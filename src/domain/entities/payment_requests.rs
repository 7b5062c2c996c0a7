use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    entities::milestones::MilestoneId,
    value_objects::enums::payment_request_statuses::PaymentRequestStatus,
};

pub type PaymentRequestId = i64;

/// A professional's request to be paid for one milestone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub id: PaymentRequestId,
    pub payment_uuid: Option<Uuid>,
    pub milestone_id: MilestoneId,
    pub amount: Decimal,
    pub description: String,
    pub notes: Option<String>,
    pub status: PaymentRequestStatus,
    pub created_at: DateTime<Utc>,
}

impl PaymentRequest {
    /// Moves the request along its lifecycle. Returns `false` and leaves the
    /// record untouched when the move is illegal.
    pub fn advance(&mut self, next: PaymentRequestStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    /// One-step settlement used by the client's "accept": any live request
    /// becomes `processed`.
    pub fn settle(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = PaymentRequestStatus::Processed;
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPaymentRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}
