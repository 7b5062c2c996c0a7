use async_trait::async_trait;
use mockall::automock;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::{
    entities::{
        contracts::{Contract, ContractId},
        milestones::{Milestone, MilestoneChanges, MilestoneId, NewMilestone, payment_status_field},
        payment_requests::{NewPaymentRequest, PaymentRequestId},
    },
    value_objects::{
        enums::{
            contract_statuses::ContractStatus, milestone_statuses::MilestoneStatus,
            payment_request_statuses::PaymentRequestStatus,
        },
        gateway_errors::GatewayError,
    },
};

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Plain acknowledgement returned by endpoints that only confirm an action.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ActionMessage {
    #[serde(default)]
    pub message: Option<String>,
}

/// Answer to a milestone payment request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaymentRequestReceipt {
    #[serde(default)]
    pub message: Option<String>,
    pub payment_id: PaymentRequestId,
    #[serde(default)]
    pub payment_uuid: Option<Uuid>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    /// Status of the backend's payment row (e.g. `pending`).
    #[serde(default)]
    pub status: Option<String>,
}

/// Answer to approve/reject/process/accept/cancel on a milestone.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PaymentActionOutcome {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub milestone_id: Option<MilestoneId>,
    #[serde(default)]
    pub status: Option<MilestoneStatus>,
    #[serde(default, deserialize_with = "payment_status_field::deserialize")]
    pub payment_status: Option<PaymentRequestStatus>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub net_amount_to_professional: Option<Decimal>,
    #[serde(default)]
    pub platform_commission: Option<Decimal>,
    #[serde(default)]
    pub contract_balance_remaining: Option<Decimal>,
}

/// Answer to a contract-level complete/dispute.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ContractClosure {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<ContractStatus>,
}

/// One method per backend endpoint. Implementations never retry, cache or
/// coalesce; every failure is reported as a [`GatewayError`].
#[automock]
#[async_trait]
pub trait ContractGateway: Send + Sync {
    async fn get_contract(&self, contract_id: ContractId) -> GatewayResult<Contract>;

    async fn list_milestones(&self, contract_id: ContractId) -> GatewayResult<Vec<Milestone>>;

    async fn create_milestone(
        &self,
        contract_id: ContractId,
        milestone: NewMilestone,
    ) -> GatewayResult<Milestone>;

    async fn update_milestone(
        &self,
        milestone_id: MilestoneId,
        changes: MilestoneChanges,
    ) -> GatewayResult<Milestone>;

    async fn delete_milestone(&self, milestone_id: MilestoneId) -> GatewayResult<()>;

    async fn request_milestone_payment(
        &self,
        milestone_id: MilestoneId,
        request: NewPaymentRequest,
    ) -> GatewayResult<PaymentRequestReceipt>;

    async fn approve_milestone_payment(
        &self,
        contract_id: ContractId,
        milestone_id: MilestoneId,
        notes: Option<String>,
    ) -> GatewayResult<PaymentActionOutcome>;

    async fn reject_milestone_payment(
        &self,
        contract_id: ContractId,
        milestone_id: MilestoneId,
        notes: Option<String>,
    ) -> GatewayResult<PaymentActionOutcome>;

    async fn process_milestone_payment(
        &self,
        contract_id: ContractId,
        milestone_id: MilestoneId,
    ) -> GatewayResult<PaymentActionOutcome>;

    async fn accept_milestone_payment(
        &self,
        contract_id: ContractId,
        milestone_id: MilestoneId,
        notes: Option<String>,
    ) -> GatewayResult<PaymentActionOutcome>;

    async fn cancel_milestone(
        &self,
        contract_id: ContractId,
        milestone_id: MilestoneId,
        notes: Option<String>,
    ) -> GatewayResult<PaymentActionOutcome>;

    async fn update_contract_status(
        &self,
        contract_id: ContractId,
        status: ContractStatus,
    ) -> GatewayResult<Contract>;

    async fn sign_contract(&self, contract_id: ContractId) -> GatewayResult<ActionMessage>;

    async fn complete_contract(&self, contract_id: ContractId) -> GatewayResult<ContractClosure>;

    async fn dispute_contract(&self, contract_id: ContractId) -> GatewayResult<ContractClosure>;
}
