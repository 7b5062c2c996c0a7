use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::{
    entities::milestones::{Milestone, milestones_total, remaining_budget},
    value_objects::{enums::contract_statuses::ContractStatus, money::format_usd},
};

pub type ContractId = i64;

/// Read model of the contract owning the milestones. The backend owns it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub contract_number: Option<String>,
    pub total_amount: Decimal,
    #[serde(default)]
    pub paid_amount: Decimal,
    #[serde(default)]
    pub status: ContractStatus,
    #[serde(default)]
    pub client_signed: bool,
    #[serde(default)]
    pub professional_signed: bool,
}

impl Contract {
    pub fn is_fully_signed(&self) -> bool {
        self.client_signed && self.professional_signed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetSummary {
    pub contract_total: Decimal,
    pub paid_amount: Decimal,
    pub milestones_total: Decimal,
    pub remaining: Decimal,
}

impl BudgetSummary {
    pub fn compute(contract: &Contract, milestones: &[Milestone]) -> Self {
        Self {
            contract_total: contract.total_amount,
            paid_amount: contract.paid_amount,
            milestones_total: milestones_total(milestones),
            remaining: remaining_budget(contract.total_amount, milestones),
        }
    }

    pub fn can_add_milestone(&self) -> bool {
        self.remaining > Decimal::ZERO
    }

    pub fn exceeded_by(&self) -> Option<Decimal> {
        (self.remaining < Decimal::ZERO).then(|| self.remaining.abs())
    }

    pub fn warning(&self) -> Option<String> {
        let exceeded_by = self.exceeded_by()?;
        Some(format!(
            "The total amount of defined milestones ({}) exceeds the contract total amount ({}) by {}.",
            format_usd(self.milestones_total),
            format_usd(self.contract_total),
            format_usd(exceeded_by),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn contract(total: i64) -> Contract {
        serde_json::from_value(json!({
            "id": 7,
            "title": "Kitchen remodel",
            "total_amount": total,
            "paid_amount": "100.00",
            "status": "active"
        }))
        .unwrap()
    }

    fn milestone(amount: i64) -> Milestone {
        serde_json::from_value(json!({
            "id": amount,
            "title": "Step",
            "amount": amount,
            "due_date": NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        }))
        .unwrap()
    }

    #[test]
    fn summary_within_budget_allows_new_milestones() {
        let summary = BudgetSummary::compute(&contract(1000), &[milestone(400), milestone(400)]);
        assert_eq!(summary.remaining, Decimal::from(200));
        assert_eq!(summary.paid_amount, Decimal::from(100));
        assert!(summary.can_add_milestone());
        assert_eq!(summary.warning(), None);
    }

    #[test]
    fn overspent_budget_blocks_creation_and_warns() {
        let summary = BudgetSummary::compute(&contract(500), &[milestone(400), milestone(300)]);
        assert!(!summary.can_add_milestone());
        assert_eq!(summary.exceeded_by(), Some(Decimal::from(200)));
        assert_eq!(
            summary.warning().unwrap(),
            "The total amount of defined milestones ($700.00) exceeds the contract total amount ($500.00) by $200.00."
        );
    }

    #[test]
    fn exhausted_budget_blocks_creation_without_warning() {
        let summary = BudgetSummary::compute(&contract(800), &[milestone(400), milestone(400)]);
        assert!(!summary.can_add_milestone());
        assert_eq!(summary.warning(), None);
    }
}
