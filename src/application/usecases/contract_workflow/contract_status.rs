use std::fmt::Display;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{ContractWorkflow, WorkflowAction, WorkflowError, WorkflowResult};
use crate::domain::{
    repositories::contract_gateway::ContractGateway,
    value_objects::enums::contract_statuses::ContractStatus,
};

/// How freely a client may set the contract status directly.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusTransitionPolicy {
    /// Any status can be picked from any status.
    #[default]
    Unrestricted,
    /// Completed, disputed and cancelled contracts keep their status.
    Guarded,
}

impl StatusTransitionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusTransitionPolicy::Unrestricted => "unrestricted",
            StatusTransitionPolicy::Guarded => "guarded",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unrestricted" => Some(StatusTransitionPolicy::Unrestricted),
            "guarded" => Some(StatusTransitionPolicy::Guarded),
            _ => None,
        }
    }

    pub fn allows(&self, from: ContractStatus, to: ContractStatus) -> bool {
        match self {
            StatusTransitionPolicy::Unrestricted => true,
            StatusTransitionPolicy::Guarded => from == to || !from.is_closed(),
        }
    }
}

impl Display for StatusTransitionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractAction {
    Sign,
    Complete,
    Dispute,
}

impl<G> ContractWorkflow<G>
where
    G: ContractGateway + Send + Sync + 'static,
{
    /// Contract-level actions currently offered to the parties.
    pub fn available_actions(&self) -> Vec<ContractAction> {
        let mut actions = Vec::new();
        if !self.contract.is_fully_signed() && !self.contract.status.is_closed() {
            actions.push(ContractAction::Sign);
        }
        if !self.contract.status.is_closed() {
            actions.push(ContractAction::Complete);
            actions.push(ContractAction::Dispute);
        }
        actions
    }

    pub async fn change_contract_status(&mut self, status: ContractStatus) -> WorkflowResult<()> {
        let result = self.try_change_contract_status(status).await;
        self.track(WorkflowAction::ChangeContractStatus(status), result)
    }

    async fn try_change_contract_status(&mut self, status: ContractStatus) -> WorkflowResult<()> {
        let from = self.contract.status;
        if !self.policy.allows(from, status) {
            return Err(WorkflowError::Rejected(format!(
                "Contract is {from} and can no longer change status"
            )));
        }

        let updated = self
            .gateway
            .update_contract_status(self.contract.id, status)
            .await
            .map_err(WorkflowError::gateway("update contract status"))?;

        self.contract = updated;
        self.contract.status = status;

        info!(
            contract_id = self.contract.id,
            from = %from,
            to = %status,
            policy = %self.policy,
            "contract_workflow: contract status changed"
        );
        Ok(())
    }

    /// Marks the contract completed. Not offered once the contract is closed.
    pub async fn complete_contract(&mut self) -> WorkflowResult<()> {
        let result = self.try_close_contract(ContractStatus::Completed).await;
        self.track(WorkflowAction::CompleteContract, result)
    }

    pub async fn dispute_contract(&mut self) -> WorkflowResult<()> {
        let result = self.try_close_contract(ContractStatus::Disputed).await;
        self.track(WorkflowAction::DisputeContract, result)
    }

    async fn try_close_contract(&mut self, status: ContractStatus) -> WorkflowResult<()> {
        let from = self.contract.status;
        if from.is_closed() {
            return Err(WorkflowError::Rejected(format!(
                "Contract is already {from}"
            )));
        }

        let contract_id = self.contract.id;
        let closure = if status == ContractStatus::Disputed {
            self.gateway
                .dispute_contract(contract_id)
                .await
                .map_err(WorkflowError::gateway("dispute contract"))?
        } else {
            self.gateway
                .complete_contract(contract_id)
                .await
                .map_err(WorkflowError::gateway("complete contract"))?
        };

        // The requested status wins over the backend's echo.
        if closure.status.is_some_and(|reported| reported != status) {
            info!(
                contract_id,
                reported = ?closure.status,
                "contract_workflow: backend reported a different status"
            );
        }

        self.contract.status = status;
        info!(
            contract_id,
            from = %from,
            to = %status,
            "contract_workflow: contract closed"
        );
        Ok(())
    }

    /// Signs the contract, then reloads it to pick up both signatures. A
    /// failed reload is logged and leaves the sign result standing.
    pub async fn sign_contract(&mut self) -> WorkflowResult<()> {
        let result = self.try_sign_contract().await;
        self.track(WorkflowAction::SignContract, result)?;
        self.reload_contract().await;
        Ok(())
    }

    async fn try_sign_contract(&mut self) -> WorkflowResult<()> {
        let contract_id = self.contract.id;
        self.gateway
            .sign_contract(contract_id)
            .await
            .map_err(WorkflowError::gateway("sign contract"))?;

        info!(contract_id, "contract_workflow: contract signed");
        Ok(())
    }

    async fn reload_contract(&mut self) {
        let contract_id = self.contract.id;
        match self.gateway.get_contract(contract_id).await {
            Ok(contract) => {
                self.contract = contract;
                info!(
                    contract_id,
                    client_signed = self.contract.client_signed,
                    professional_signed = self.contract.professional_signed,
                    "contract_workflow: contract reloaded"
                );
            }
            Err(error) => warn!(
                contract_id,
                category = %error.category,
                error = %error,
                "contract_workflow: contract reload failed"
            ),
        }
    }
}
