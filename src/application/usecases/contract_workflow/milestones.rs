use rust_decimal::Decimal;
use tracing::info;

use super::{ContractWorkflow, WorkflowAction, WorkflowError, WorkflowResult, today};
use crate::domain::{
    entities::milestones::{Milestone, MilestoneId, next_order},
    repositories::contract_gateway::ContractGateway,
    value_objects::{
        money::format_usd,
        validation::{MilestoneForm, milestone_changes_from_form, new_milestone_from_form},
    },
};

impl<G> ContractWorkflow<G>
where
    G: ContractGateway + Send + Sync + 'static,
{
    /// Adds a milestone after validating it against the remaining budget.
    pub async fn create_milestone(&mut self, form: MilestoneForm) -> WorkflowResult<Milestone> {
        let result = self.try_create_milestone(&form).await;
        self.track(WorkflowAction::CreateMilestone(form), result)
    }

    async fn try_create_milestone(&mut self, form: &MilestoneForm) -> WorkflowResult<Milestone> {
        let budget = self.budget();
        if !budget.can_add_milestone() {
            return Err(WorkflowError::Rejected(format!(
                "No budget left for new milestones (remaining {})",
                format_usd(budget.remaining)
            )));
        }

        let payload = new_milestone_from_form(
            form,
            budget.remaining,
            today(),
            next_order(&self.milestones),
        )
        .map_err(WorkflowError::Validation)?;

        let created = self
            .gateway
            .create_milestone(self.contract.id, payload)
            .await
            .map_err(WorkflowError::gateway("create milestone"))?;

        info!(
            contract_id = self.contract.id,
            milestone_id = created.id,
            amount = %created.amount,
            order = created.order,
            "contract_workflow: milestone created"
        );

        self.milestones.push(created.clone());
        self.sort_milestones();
        Ok(created)
    }

    /// Edits a milestone. Only pending milestones can be edited.
    pub async fn update_milestone(
        &mut self,
        milestone_id: MilestoneId,
        form: MilestoneForm,
    ) -> WorkflowResult<Milestone> {
        let result = self.try_update_milestone(milestone_id, &form).await;
        self.track(WorkflowAction::UpdateMilestone { milestone_id, form }, result)
    }

    async fn try_update_milestone(
        &mut self,
        milestone_id: MilestoneId,
        form: &MilestoneForm,
    ) -> WorkflowResult<Milestone> {
        let idx = self.milestone_index(milestone_id)?;
        if !self.milestones[idx].is_editable() {
            return Err(WorkflowError::Rejected(format!(
                "Only pending milestones can be edited (milestone is {})",
                self.milestones[idx].status
            )));
        }

        let other_milestones_total: Decimal = self
            .milestones
            .iter()
            .filter(|milestone| milestone.id != milestone_id)
            .map(|milestone| milestone.amount)
            .sum();
        let changes = milestone_changes_from_form(
            form,
            other_milestones_total,
            self.contract.total_amount,
            today(),
        )
        .map_err(WorkflowError::Validation)?;

        let updated = self
            .gateway
            .update_milestone(milestone_id, changes.clone())
            .await
            .map_err(WorkflowError::gateway("update milestone"))?;

        info!(
            contract_id = self.contract.id,
            milestone_id,
            amount = %updated.amount,
            "contract_workflow: milestone updated"
        );

        let idx = self.milestone_index(milestone_id)?;
        if updated.id == milestone_id {
            self.milestones[idx] = updated;
        } else {
            changes.apply_to(&mut self.milestones[idx]);
        }
        self.sort_milestones();
        Ok(self.milestones[self.milestone_index(milestone_id)?].clone())
    }

    /// First step of deletion: marks the milestone as awaiting confirmation.
    pub fn request_delete(&mut self, milestone_id: MilestoneId) -> WorkflowResult<()> {
        if let Err(error) = self.ensure_deletable(milestone_id) {
            return self.track(WorkflowAction::DeleteMilestone(milestone_id), Err(error));
        }
        self.pending_delete = Some(milestone_id);
        Ok(())
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    pub fn pending_delete(&self) -> Option<MilestoneId> {
        self.pending_delete
    }

    /// Deletes the milestone marked by [`Self::request_delete`]. A failed
    /// delete leaves the confirmation pending.
    pub async fn confirm_delete(&mut self) -> WorkflowResult<()> {
        let Some(milestone_id) = self.pending_delete.take() else {
            return Err(WorkflowError::Rejected(
                "No milestone deletion is awaiting confirmation".to_string(),
            ));
        };

        let result = self.try_delete_milestone(milestone_id).await;
        if result.is_err() {
            self.pending_delete = Some(milestone_id);
        }
        self.track(WorkflowAction::DeleteMilestone(milestone_id), result)
    }

    async fn try_delete_milestone(&mut self, milestone_id: MilestoneId) -> WorkflowResult<()> {
        self.ensure_deletable(milestone_id)?;

        self.gateway
            .delete_milestone(milestone_id)
            .await
            .map_err(WorkflowError::gateway("delete milestone"))?;

        info!(
            contract_id = self.contract.id,
            milestone_id,
            "contract_workflow: milestone deleted"
        );

        self.milestones
            .retain(|milestone| milestone.id != milestone_id);
        Ok(())
    }

    fn ensure_deletable(&self, milestone_id: MilestoneId) -> WorkflowResult<()> {
        let milestone = &self.milestones[self.milestone_index(milestone_id)?];
        if milestone.is_editable() {
            Ok(())
        } else {
            Err(WorkflowError::Rejected(format!(
                "Only pending milestones can be deleted (milestone is {})",
                milestone.status
            )))
        }
    }
}
