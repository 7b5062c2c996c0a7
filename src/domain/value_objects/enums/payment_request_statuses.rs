use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Lifecycle of a professional's request to be paid for a milestone.
///
/// ```text
/// (none) -> requested -> approved -> processed
///                   \-> rejected
/// ```
///
/// `rejected` and `processed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRequestStatus {
    Requested,
    Approved,
    Rejected,
    #[serde(alias = "paid")]
    Processed,
}

impl PaymentRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentRequestStatus::Requested => "requested",
            PaymentRequestStatus::Approved => "approved",
            PaymentRequestStatus::Rejected => "rejected",
            PaymentRequestStatus::Processed => "processed",
        }
    }

    /// Decodes the backend's milestone `payment_status` field.
    /// `not_requested` means there is no request at all.
    pub fn from_backend(value: &str) -> Option<Option<Self>> {
        match value {
            "" | "not_requested" => Some(None),
            "requested" | "pending" => Some(Some(PaymentRequestStatus::Requested)),
            "approved" => Some(Some(PaymentRequestStatus::Approved)),
            "rejected" => Some(Some(PaymentRequestStatus::Rejected)),
            "processed" | "paid" => Some(Some(PaymentRequestStatus::Processed)),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentRequestStatus::Rejected | PaymentRequestStatus::Processed
        )
    }

    pub fn is_outstanding(&self) -> bool {
        matches!(self, PaymentRequestStatus::Requested)
    }

    pub fn can_transition_to(&self, next: PaymentRequestStatus) -> bool {
        matches!(
            (self, next),
            (PaymentRequestStatus::Requested, PaymentRequestStatus::Approved)
                | (PaymentRequestStatus::Requested, PaymentRequestStatus::Rejected)
                | (PaymentRequestStatus::Approved, PaymentRequestStatus::Processed)
        )
    }
}

impl Display for PaymentRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions_follow_the_request_lifecycle() {
        use PaymentRequestStatus::*;

        assert!(Requested.can_transition_to(Approved));
        assert!(Requested.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Processed));

        assert!(!Requested.can_transition_to(Processed));
        assert!(!Approved.can_transition_to(Rejected));
        for terminal in [Rejected, Processed] {
            assert!(terminal.is_terminal());
            for next in [Requested, Approved, Rejected, Processed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn backend_payment_status_is_decoded() {
        assert_eq!(PaymentRequestStatus::from_backend("not_requested"), Some(None));
        assert_eq!(
            PaymentRequestStatus::from_backend("paid"),
            Some(Some(PaymentRequestStatus::Processed))
        );
        assert_eq!(PaymentRequestStatus::from_backend("on_hold"), None);
    }
}
