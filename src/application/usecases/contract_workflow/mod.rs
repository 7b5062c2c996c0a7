mod contract_status;
mod milestones;
mod payments;

use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{
    entities::{
        contracts::{BudgetSummary, Contract, ContractId},
        milestones::{Milestone, MilestoneId},
        payment_requests::PaymentRequest,
    },
    repositories::contract_gateway::ContractGateway,
    value_objects::{
        enums::{contract_statuses::ContractStatus, error_categories::ErrorCategory},
        gateway_errors::GatewayError,
        validation::{MilestoneForm, PaymentRequestForm, ValidationErrors},
    },
};

pub use contract_status::{ContractAction, StatusTransitionPolicy};
pub use payments::{PaymentFlowStep, PaymentRequestFlow, PaymentRequestSummary};

#[derive(Debug, Clone, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(ValidationErrors),
    /// A local rule refused the action before any network call.
    #[error("{0}")]
    Rejected(String),
    #[error("milestone {0} not found")]
    MilestoneNotFound(MilestoneId),
    #[error("no failed action to retry")]
    NothingToRetry,
    #[error("{}", gateway_message(context, source))]
    Gateway {
        context: &'static str,
        #[source]
        source: GatewayError,
    },
}

fn gateway_message(context: &str, source: &GatewayError) -> String {
    if source.message.trim().is_empty() {
        format!("Failed to {context}")
    } else {
        source.message.clone()
    }
}

impl WorkflowError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            WorkflowError::Validation(_)
            | WorkflowError::Rejected(_)
            | WorkflowError::NothingToRetry => ErrorCategory::Validation,
            WorkflowError::MilestoneNotFound(_) => ErrorCategory::NotFound,
            WorkflowError::Gateway { source, .. } => source.category,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    pub fn field_errors(&self) -> Option<&ValidationErrors> {
        match self {
            WorkflowError::Validation(errors) => Some(errors),
            _ => None,
        }
    }

    fn gateway(context: &'static str) -> impl FnOnce(GatewayError) -> WorkflowError {
        move |source| WorkflowError::Gateway { context, source }
    }
}

pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;

/// Every user-triggered operation, kept so a failed one can be re-issued as is.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowAction {
    Refresh,
    CreateMilestone(MilestoneForm),
    UpdateMilestone {
        milestone_id: MilestoneId,
        form: MilestoneForm,
    },
    DeleteMilestone(MilestoneId),
    RequestPayment {
        milestone_id: MilestoneId,
        form: PaymentRequestForm,
    },
    ApprovePayment {
        milestone_id: MilestoneId,
        notes: Option<String>,
    },
    RejectPayment {
        milestone_id: MilestoneId,
        notes: Option<String>,
    },
    ProcessPayment(MilestoneId),
    AcceptPayment {
        milestone_id: MilestoneId,
        notes: Option<String>,
    },
    CancelMilestone {
        milestone_id: MilestoneId,
        notes: Option<String>,
    },
    ChangeContractStatus(ContractStatus),
    SignContract,
    CompleteContract,
    DisputeContract,
}

#[derive(Debug, Clone)]
pub struct FailedAction {
    pub action: WorkflowAction,
    pub error: WorkflowError,
}

/// Milestone and payment workflow for one contract.
///
/// The workflow holds the locally reconciled view of the contract. Every
/// mutation goes through the gateway first and the local state only changes
/// once the backend accepted it. Operations take `&mut self`, so at most one
/// action is in flight per workflow.
pub struct ContractWorkflow<G>
where
    G: ContractGateway + Send + Sync + 'static,
{
    gateway: Arc<G>,
    policy: StatusTransitionPolicy,
    contract: Contract,
    milestones: Vec<Milestone>,
    payment_requests: Vec<PaymentRequest>,
    payment_flow: Option<PaymentRequestFlow>,
    pending_delete: Option<MilestoneId>,
    last_failure: Option<FailedAction>,
}

impl<G> ContractWorkflow<G>
where
    G: ContractGateway + Send + Sync + 'static,
{
    pub async fn load(
        gateway: Arc<G>,
        contract_id: ContractId,
        policy: StatusTransitionPolicy,
    ) -> WorkflowResult<Self> {
        info!(contract_id, "contract_workflow: loading contract");

        let contract = gateway
            .get_contract(contract_id)
            .await
            .map_err(WorkflowError::gateway("load contract"))?;
        let mut milestones = gateway
            .list_milestones(contract_id)
            .await
            .map_err(WorkflowError::gateway("load milestones"))?;
        milestones.sort_by_key(|milestone| milestone.order);

        info!(
            contract_id,
            status = %contract.status,
            milestones = milestones.len(),
            "contract_workflow: contract loaded"
        );

        Ok(Self {
            gateway,
            policy,
            contract,
            milestones,
            payment_requests: Vec::new(),
            payment_flow: None,
            pending_delete: None,
            last_failure: None,
        })
    }

    /// Re-fetches the contract and its milestones, e.g. after a `not_found`
    /// or `conflict` answer.
    pub async fn refresh(&mut self) -> WorkflowResult<()> {
        let result = self.try_refresh().await;
        self.track(WorkflowAction::Refresh, result)
    }

    async fn try_refresh(&mut self) -> WorkflowResult<()> {
        let contract_id = self.contract.id;
        let contract = self
            .gateway
            .get_contract(contract_id)
            .await
            .map_err(WorkflowError::gateway("load contract"))?;
        let mut milestones = self
            .gateway
            .list_milestones(contract_id)
            .await
            .map_err(WorkflowError::gateway("load milestones"))?;
        milestones.sort_by_key(|milestone| milestone.order);

        self.contract = contract;
        self.milestones = milestones;

        if let Some(milestone_id) = self.pending_delete {
            if self.milestone(milestone_id).is_none() {
                self.pending_delete = None;
            }
        }
        if let Some(flow) = &self.payment_flow {
            if self.milestone(flow.milestone_id()).is_none() {
                self.payment_flow = None;
            }
        }

        info!(
            contract_id,
            milestones = self.milestones.len(),
            "contract_workflow: contract refreshed"
        );
        Ok(())
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    pub fn milestones(&self) -> &[Milestone] {
        &self.milestones
    }

    pub fn milestone(&self, milestone_id: MilestoneId) -> Option<&Milestone> {
        self.milestones
            .iter()
            .find(|milestone| milestone.id == milestone_id)
    }

    pub fn payment_requests(&self) -> &[PaymentRequest] {
        &self.payment_requests
    }

    pub fn budget(&self) -> BudgetSummary {
        BudgetSummary::compute(&self.contract, &self.milestones)
    }

    pub fn policy(&self) -> StatusTransitionPolicy {
        self.policy
    }

    pub fn last_failure(&self) -> Option<&FailedAction> {
        self.last_failure.as_ref()
    }

    pub fn error(&self) -> Option<&WorkflowError> {
        self.last_failure.as_ref().map(|failure| &failure.error)
    }

    pub fn dismiss_error(&mut self) {
        self.last_failure = None;
    }

    /// Runs one action and discards its output.
    pub async fn execute(&mut self, action: WorkflowAction) -> WorkflowResult<()> {
        match action {
            WorkflowAction::Refresh => self.refresh().await,
            WorkflowAction::CreateMilestone(form) => self.create_milestone(form).await.map(drop),
            WorkflowAction::UpdateMilestone { milestone_id, form } => {
                self.update_milestone(milestone_id, form).await.map(drop)
            }
            WorkflowAction::DeleteMilestone(milestone_id) => {
                self.request_delete(milestone_id)?;
                self.confirm_delete().await
            }
            WorkflowAction::RequestPayment { milestone_id, form } => {
                self.request_payment(milestone_id, form).await.map(drop)
            }
            WorkflowAction::ApprovePayment {
                milestone_id,
                notes,
            } => self.approve_payment(milestone_id, notes).await.map(drop),
            WorkflowAction::RejectPayment {
                milestone_id,
                notes,
            } => self.reject_payment(milestone_id, notes).await.map(drop),
            WorkflowAction::ProcessPayment(milestone_id) => {
                self.process_payment(milestone_id).await.map(drop)
            }
            WorkflowAction::AcceptPayment {
                milestone_id,
                notes,
            } => self.accept_payment(milestone_id, notes).await.map(drop),
            WorkflowAction::CancelMilestone {
                milestone_id,
                notes,
            } => self.cancel_milestone(milestone_id, notes).await.map(drop),
            WorkflowAction::ChangeContractStatus(status) => {
                self.change_contract_status(status).await
            }
            WorkflowAction::SignContract => self.sign_contract().await,
            WorkflowAction::CompleteContract => self.complete_contract().await,
            WorkflowAction::DisputeContract => self.dispute_contract().await,
        }
    }

    /// Re-issues the last failed action when its failure was transient
    /// (network, server error, service unavailable). Never retries on its own.
    pub async fn retry_last_action(&mut self) -> WorkflowResult<()> {
        let Some(failure) = self.last_failure.clone() else {
            return Err(WorkflowError::NothingToRetry);
        };
        if !failure.error.is_retryable() {
            return Err(failure.error);
        }

        info!(
            action = ?failure.action,
            category = %failure.error.category(),
            "contract_workflow: retrying failed action"
        );
        self.execute(failure.action).await
    }

    /// Records the outcome of a user-triggered action.
    fn track<T>(&mut self, action: WorkflowAction, result: WorkflowResult<T>) -> WorkflowResult<T> {
        match &result {
            Ok(_) => self.last_failure = None,
            Err(error) => {
                warn!(
                    contract_id = self.contract.id,
                    action = ?action,
                    category = %error.category(),
                    error = %error,
                    "contract_workflow: action failed"
                );
                self.last_failure = Some(FailedAction {
                    action,
                    error: error.clone(),
                });
            }
        }
        result
    }

    fn milestone_index(&self, milestone_id: MilestoneId) -> WorkflowResult<usize> {
        self.milestones
            .iter()
            .position(|milestone| milestone.id == milestone_id)
            .ok_or(WorkflowError::MilestoneNotFound(milestone_id))
    }

    fn sort_milestones(&mut self) {
        self.milestones.sort_by_key(|milestone| milestone.order);
    }
}

pub(crate) fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, NaiveDate};
    use rust_decimal::Decimal;

    use crate::domain::{
        entities::{contracts::Contract, milestones::Milestone},
        repositories::contract_gateway::MockContractGateway,
        value_objects::enums::{
            contract_statuses::ContractStatus, milestone_statuses::MilestoneStatus,
            payment_request_statuses::PaymentRequestStatus,
        },
    };

    use super::{ContractWorkflow, StatusTransitionPolicy};

    pub(crate) fn future_date(days: i64) -> NaiveDate {
        super::today() + Duration::days(days)
    }

    pub(crate) fn contract(total: i64, status: ContractStatus) -> Contract {
        Contract {
            id: 7,
            title: "Kitchen remodel".to_string(),
            contract_number: Some("CN-0007".to_string()),
            total_amount: Decimal::from(total),
            paid_amount: Decimal::ZERO,
            status,
            client_signed: true,
            professional_signed: true,
        }
    }

    pub(crate) fn milestone(
        id: i64,
        amount: i64,
        status: MilestoneStatus,
        payment_status: Option<PaymentRequestStatus>,
    ) -> Milestone {
        Milestone {
            id,
            contract: Some(7),
            title: format!("Milestone {id}"),
            description: "Deliver the agreed scope".to_string(),
            amount: Decimal::from(amount),
            due_date: future_date(30),
            status,
            completion_date: None,
            payment_date: None,
            order: id as i32,
            payment_status,
            created_at: None,
            updated_at: None,
        }
    }

    pub(crate) async fn workflow(
        mut gateway: MockContractGateway,
        contract: Contract,
        milestones: Vec<Milestone>,
    ) -> ContractWorkflow<MockContractGateway> {
        gateway
            .expect_get_contract()
            .times(1)
            .returning(move |_| Ok(contract.clone()));
        gateway
            .expect_list_milestones()
            .times(1)
            .returning(move |_| Ok(milestones.clone()));

        ContractWorkflow::load(
            std::sync::Arc::new(gateway),
            7,
            StatusTransitionPolicy::Unrestricted,
        )
        .await
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::domain::{
        repositories::contract_gateway::MockContractGateway,
        value_objects::enums::milestone_statuses::MilestoneStatus,
    };

    #[tokio::test]
    async fn load_sorts_milestones_by_order() {
        let mut second = milestone(2, 100, MilestoneStatus::Pending, None);
        second.order = 1;
        let mut first = milestone(1, 100, MilestoneStatus::Pending, None);
        first.order = 5;

        let workflow = workflow(
            MockContractGateway::new(),
            contract(1000, ContractStatus::Active),
            vec![first, second],
        )
        .await;

        let ids: Vec<_> = workflow.milestones().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(workflow.budget().remaining, rust_decimal::Decimal::from(800));
    }

    #[tokio::test]
    async fn failed_load_surfaces_gateway_error() {
        let mut gateway = MockContractGateway::new();
        gateway.expect_get_contract().times(1).returning(|_| {
            Err(GatewayError::from_status(404, Some("Contract not found".into()), None))
        });

        let err = ContractWorkflow::load(Arc::new(gateway), 7, StatusTransitionPolicy::Unrestricted)
            .await
            .err()
            .unwrap();

        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert_eq!(err.to_string(), "Contract not found");
    }

    #[tokio::test]
    async fn transient_failure_can_be_retried_verbatim() {
        let mut gateway = MockContractGateway::new();
        let mut calls = 0;
        gateway.expect_complete_contract().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(GatewayError::from_status(503, None, None))
            } else {
                Ok(Default::default())
            }
        });

        let mut workflow =
            workflow(gateway, contract(1000, ContractStatus::Active), vec![]).await;

        let err = workflow.complete_contract().await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ServiceUnavailable);
        assert_eq!(
            workflow.last_failure().unwrap().action,
            WorkflowAction::CompleteContract
        );

        workflow.retry_last_action().await.unwrap();
        assert_eq!(workflow.contract().status, ContractStatus::Completed);
        assert!(workflow.error().is_none());
    }

    #[tokio::test]
    async fn non_transient_failure_is_not_retried() {
        let mut gateway = MockContractGateway::new();
        gateway.expect_sign_contract().times(1).returning(|_| {
            Err(GatewayError::from_status(
                403,
                Some("Only contract parties can sign".into()),
                None,
            ))
        });

        let mut workflow =
            workflow(gateway, contract(1000, ContractStatus::Pending), vec![]).await;

        workflow.sign_contract().await.unwrap_err();
        let err = workflow.retry_last_action().await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Permission);

        workflow.dismiss_error();
        assert!(workflow.error().is_none());
        assert!(matches!(
            workflow.retry_last_action().await,
            Err(WorkflowError::NothingToRetry)
        ));
    }

    #[tokio::test]
    async fn refresh_replaces_local_view() {
        let mut gateway = MockContractGateway::new();
        let mut calls = 0;
        gateway.expect_get_contract().times(2).returning(move |_| {
            calls += 1;
            let mut contract = contract(1000, ContractStatus::Active);
            if calls == 2 {
                contract.paid_amount = rust_decimal::Decimal::from(400);
            }
            Ok(contract)
        });
        let mut calls = 0;
        gateway.expect_list_milestones().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok(vec![milestone(1, 400, MilestoneStatus::Pending, None)])
            } else {
                Ok(vec![])
            }
        });

        let mut workflow =
            ContractWorkflow::load(Arc::new(gateway), 7, StatusTransitionPolicy::Unrestricted)
                .await
                .unwrap();
        workflow.request_delete(1).unwrap();

        workflow.refresh().await.unwrap();

        assert!(workflow.milestones().is_empty());
        assert_eq!(workflow.contract().paid_amount, rust_decimal::Decimal::from(400));
        assert_eq!(workflow.pending_delete(), None);
    }
}
