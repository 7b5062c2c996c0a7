use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    entities::contracts::ContractId,
    value_objects::enums::{
        milestone_statuses::MilestoneStatus, payment_request_statuses::PaymentRequestStatus,
    },
};

pub type MilestoneId = i64;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Milestone {
    pub id: MilestoneId,
    #[serde(default)]
    pub contract: Option<ContractId>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub status: MilestoneStatus,
    #[serde(default)]
    pub completion_date: Option<NaiveDate>,
    #[serde(default)]
    pub payment_date: Option<NaiveDate>,
    #[serde(default)]
    pub order: i32,
    #[serde(default, deserialize_with = "payment_status_field::deserialize")]
    pub payment_status: Option<PaymentRequestStatus>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Milestone {
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status != MilestoneStatus::Completed && self.due_date < today
    }

    pub fn progress_fraction(&self) -> f32 {
        match self.status {
            MilestoneStatus::Pending | MilestoneStatus::Cancelled => 0.0,
            MilestoneStatus::InProgress => 0.5,
            MilestoneStatus::Completed => 1.0,
        }
    }

    pub fn has_outstanding_request(&self) -> bool {
        self.payment_status
            .is_some_and(|status| status.is_outstanding())
    }

    pub fn can_request_payment(&self) -> bool {
        self.status.accepts_payment_request() && !self.has_outstanding_request()
    }

    /// Only pending milestones may be edited or deleted.
    pub fn is_editable(&self) -> bool {
        self.status == MilestoneStatus::Pending
    }
}

/// Contract total minus every defined milestone, regardless of status.
/// Negative when milestones were defined beyond the contract value.
pub fn remaining_budget(contract_total: Decimal, milestones: &[Milestone]) -> Decimal {
    contract_total - milestones_total(milestones)
}

pub fn milestones_total(milestones: &[Milestone]) -> Decimal {
    milestones.iter().map(|milestone| milestone.amount).sum()
}

pub fn next_order(milestones: &[Milestone]) -> i32 {
    milestones
        .iter()
        .map(|milestone| milestone.order)
        .max()
        .map_or(1, |max| max + 1)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMilestone {
    pub title: String,
    pub description: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub order: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MilestoneChanges {
    pub title: String,
    pub description: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub due_date: NaiveDate,
}

impl MilestoneChanges {
    pub fn apply_to(&self, milestone: &mut Milestone) {
        milestone.title = self.title.clone();
        milestone.description = self.description.clone();
        milestone.amount = self.amount;
        milestone.due_date = self.due_date;
    }
}

pub(crate) mod payment_status_field {
    use serde::{Deserialize, Deserializer, de::Error};

    use crate::domain::value_objects::enums::payment_request_statuses::PaymentRequestStatus;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<PaymentRequestStatus>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        PaymentRequestStatus::from_backend(&raw)
            .ok_or_else(|| D::Error::custom(format!("unknown payment status `{raw}`")))
    }
}
