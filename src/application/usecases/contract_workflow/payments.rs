use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use super::{ContractWorkflow, WorkflowAction, WorkflowError, WorkflowResult, today};
use crate::domain::{
    entities::{
        milestones::{Milestone, MilestoneId},
        payment_requests::PaymentRequest,
    },
    repositories::contract_gateway::{ContractGateway, PaymentActionOutcome},
    value_objects::{
        enums::{
            milestone_statuses::MilestoneStatus, payment_request_statuses::PaymentRequestStatus,
        },
        money::format_usd,
        validation::{PaymentRequestForm, ValidationErrors, payment_request_from_form},
    },
};

const DESCRIPTION_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentFlowStep {
    Draft,
    Reviewing,
    Submitting,
}

/// The single in-progress payment request, from first draft to submission.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequestFlow {
    milestone_id: MilestoneId,
    milestone_title: String,
    milestone_amount: Decimal,
    form: PaymentRequestForm,
    errors: ValidationErrors,
    step: PaymentFlowStep,
}

impl PaymentRequestFlow {
    fn new(milestone: &Milestone) -> Self {
        Self {
            milestone_id: milestone.id,
            milestone_title: milestone.title.clone(),
            milestone_amount: milestone.amount,
            form: PaymentRequestForm {
                amount: milestone.amount.to_string(),
                ..PaymentRequestForm::default()
            },
            errors: ValidationErrors::new(),
            step: PaymentFlowStep::Draft,
        }
    }

    pub fn milestone_id(&self) -> MilestoneId {
        self.milestone_id
    }

    pub fn form(&self) -> &PaymentRequestForm {
        &self.form
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn step(&self) -> PaymentFlowStep {
        self.step
    }

    pub fn summary(&self) -> PaymentRequestSummary {
        let description = self.form.description.trim();
        let truncated = description.chars().count() > DESCRIPTION_PREVIEW_CHARS;
        let amount = self
            .form
            .amount
            .trim()
            .parse::<Decimal>()
            .unwrap_or(self.milestone_amount);
        let notes = self.form.notes.trim();

        PaymentRequestSummary {
            milestone_id: self.milestone_id,
            milestone_title: self.milestone_title.clone(),
            amount,
            formatted_amount: format_usd(amount),
            description_preview: description.chars().take(DESCRIPTION_PREVIEW_CHARS).collect(),
            truncated,
            notes: (!notes.is_empty()).then(|| notes.to_string()),
        }
    }
}

/// What the professional is asked to confirm before the request is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequestSummary {
    pub milestone_id: MilestoneId,
    pub milestone_title: String,
    pub amount: Decimal,
    pub formatted_amount: String,
    pub description_preview: String,
    pub truncated: bool,
    pub notes: Option<String>,
}

impl<G> ContractWorkflow<G>
where
    G: ContractGateway + Send + Sync + 'static,
{
    pub fn payment_flow(&self) -> Option<&PaymentRequestFlow> {
        self.payment_flow.as_ref()
    }

    /// Opens the payment request flow for a milestone. The form starts with
    /// the full milestone amount.
    pub fn begin_payment_request(
        &mut self,
        milestone_id: MilestoneId,
    ) -> WorkflowResult<&PaymentRequestFlow> {
        if let Some(flow) = &self.payment_flow {
            return Err(WorkflowError::Rejected(format!(
                "A payment request for milestone {} is already in progress",
                flow.milestone_id
            )));
        }

        let milestone = &self.milestones[self.milestone_index(milestone_id)?];
        if !milestone.status.accepts_payment_request() {
            return Err(WorkflowError::Rejected(format!(
                "Payment can only be requested for pending or in-progress milestones (milestone is {})",
                milestone.status
            )));
        }
        if milestone.has_outstanding_request() || self.has_requested_record(milestone_id) {
            return Err(WorkflowError::Rejected(
                "A payment request for this milestone is already awaiting a decision".to_string(),
            ));
        }

        let flow = PaymentRequestFlow::new(milestone);
        info!(
            contract_id = self.contract.id,
            milestone_id,
            amount = %flow.milestone_amount,
            "contract_workflow: payment request started"
        );
        Ok(self.payment_flow.insert(flow))
    }

    /// Validates the draft. Valid input moves the flow to the review step and
    /// returns the confirmation summary; invalid input stays in the draft.
    pub fn review_payment_request(
        &mut self,
        form: PaymentRequestForm,
    ) -> WorkflowResult<PaymentRequestSummary> {
        let flow = self.payment_flow.as_mut().ok_or_else(no_payment_flow)?;
        if flow.step != PaymentFlowStep::Draft {
            return Err(WorkflowError::Rejected(
                "The payment request is not being edited".to_string(),
            ));
        }

        flow.form = form;
        if let Err(errors) = payment_request_from_form(&flow.form, flow.milestone_amount) {
            flow.errors = errors.clone();
            return Err(WorkflowError::Validation(errors));
        }

        flow.errors = ValidationErrors::new();
        flow.step = PaymentFlowStep::Reviewing;
        Ok(flow.summary())
    }

    pub fn back_to_edit(&mut self) -> WorkflowResult<()> {
        let flow = self.payment_flow.as_mut().ok_or_else(no_payment_flow)?;
        flow.step = PaymentFlowStep::Draft;
        Ok(())
    }

    /// Drops the flow before anything was sent.
    pub fn cancel_payment_request(&mut self) {
        if let Some(flow) = self.payment_flow.take() {
            info!(
                milestone_id = flow.milestone_id,
                "contract_workflow: payment request discarded"
            );
        }
    }

    /// Sends the reviewed request. On failure the entered data is kept and
    /// the flow goes back to the draft step.
    pub async fn confirm_payment_request(&mut self) -> WorkflowResult<PaymentRequest> {
        let Some(flow) = self.payment_flow.as_ref() else {
            return Err(no_payment_flow());
        };
        let action = WorkflowAction::RequestPayment {
            milestone_id: flow.milestone_id,
            form: flow.form.clone(),
        };
        let result = self.try_confirm_payment_request().await;
        self.track(action, result)
    }

    /// Runs the whole flow in one go: begin, review and confirm.
    pub async fn request_payment(
        &mut self,
        milestone_id: MilestoneId,
        form: PaymentRequestForm,
    ) -> WorkflowResult<PaymentRequest> {
        if let Some(open) = self
            .payment_flow
            .as_ref()
            .map(|flow| flow.milestone_id)
            .filter(|open| *open != milestone_id)
        {
            return Err(WorkflowError::Rejected(format!(
                "A payment request for milestone {open} is already in progress"
            )));
        }
        if self.payment_flow.is_none() {
            self.begin_payment_request(milestone_id)?;
        }
        self.back_to_edit()?;
        self.review_payment_request(form)?;
        self.confirm_payment_request().await
    }

    async fn try_confirm_payment_request(&mut self) -> WorkflowResult<PaymentRequest> {
        let flow = self.payment_flow.as_mut().ok_or_else(no_payment_flow)?;
        if flow.step != PaymentFlowStep::Reviewing {
            return Err(WorkflowError::Rejected(
                "Review the payment request before submitting it".to_string(),
            ));
        }
        let payload = payment_request_from_form(&flow.form, flow.milestone_amount)
            .map_err(WorkflowError::Validation)?;
        let milestone_id = flow.milestone_id;
        flow.step = PaymentFlowStep::Submitting;

        let receipt = match self
            .gateway
            .request_milestone_payment(milestone_id, payload.clone())
            .await
        {
            Ok(receipt) => receipt,
            Err(source) => {
                if let Some(flow) = self.payment_flow.as_mut() {
                    flow.step = PaymentFlowStep::Draft;
                }
                return Err(WorkflowError::Gateway {
                    context: "request milestone payment",
                    source,
                });
            }
        };

        let request = PaymentRequest {
            id: receipt.payment_id,
            payment_uuid: receipt.payment_uuid,
            milestone_id,
            amount: payload.amount,
            description: payload.description,
            notes: payload.notes,
            status: PaymentRequestStatus::Requested,
            created_at: Utc::now(),
        };

        if let Ok(idx) = self.milestone_index(milestone_id) {
            let milestone = &mut self.milestones[idx];
            milestone.payment_status = Some(PaymentRequestStatus::Requested);
            if milestone.status == MilestoneStatus::Pending {
                milestone.status = MilestoneStatus::InProgress;
            }
        }
        self.payment_requests.push(request.clone());
        self.payment_flow = None;

        info!(
            contract_id = self.contract.id,
            milestone_id,
            payment_id = request.id,
            amount = %request.amount,
            "contract_workflow: payment requested"
        );
        Ok(request)
    }

    pub async fn approve_payment(
        &mut self,
        milestone_id: MilestoneId,
        notes: Option<String>,
    ) -> WorkflowResult<Milestone> {
        let action = WorkflowAction::ApprovePayment {
            milestone_id,
            notes: notes.clone(),
        };
        let result = self.try_approve_payment(milestone_id, notes).await;
        self.track(action, result)
    }

    async fn try_approve_payment(
        &mut self,
        milestone_id: MilestoneId,
        notes: Option<String>,
    ) -> WorkflowResult<Milestone> {
        self.ensure_payment_status(
            milestone_id,
            &[PaymentRequestStatus::Requested],
            "Payment can only be approved when it is requested",
        )?;

        let outcome = self
            .gateway
            .approve_milestone_payment(self.contract.id, milestone_id, notes)
            .await
            .map_err(WorkflowError::gateway("approve payment"))?;

        self.advance_records(milestone_id, PaymentRequestStatus::Approved);
        let milestone = self.apply_outcome(milestone_id, &outcome, |milestone| {
            milestone.payment_status = Some(PaymentRequestStatus::Approved);
        })?;

        info!(milestone_id, "contract_workflow: payment approved");
        Ok(milestone)
    }

    pub async fn reject_payment(
        &mut self,
        milestone_id: MilestoneId,
        notes: Option<String>,
    ) -> WorkflowResult<Milestone> {
        let action = WorkflowAction::RejectPayment {
            milestone_id,
            notes: notes.clone(),
        };
        let result = self.try_reject_payment(milestone_id, notes).await;
        self.track(action, result)
    }

    async fn try_reject_payment(
        &mut self,
        milestone_id: MilestoneId,
        notes: Option<String>,
    ) -> WorkflowResult<Milestone> {
        self.ensure_payment_status(
            milestone_id,
            &[PaymentRequestStatus::Requested],
            "Payment can only be rejected when it is requested",
        )?;

        let outcome = self
            .gateway
            .reject_milestone_payment(self.contract.id, milestone_id, notes)
            .await
            .map_err(WorkflowError::gateway("reject payment"))?;

        self.advance_records(milestone_id, PaymentRequestStatus::Rejected);
        let milestone = self.apply_outcome(milestone_id, &outcome, |milestone| {
            milestone.payment_status = Some(PaymentRequestStatus::Rejected);
        })?;

        info!(milestone_id, "contract_workflow: payment rejected");
        Ok(milestone)
    }

    /// Moves the funds of an approved request to the professional.
    pub async fn process_payment(&mut self, milestone_id: MilestoneId) -> WorkflowResult<Milestone> {
        let result = self.try_process_payment(milestone_id).await;
        self.track(WorkflowAction::ProcessPayment(milestone_id), result)
    }

    async fn try_process_payment(&mut self, milestone_id: MilestoneId) -> WorkflowResult<Milestone> {
        self.ensure_payment_status(
            milestone_id,
            &[PaymentRequestStatus::Approved],
            "Milestone payment must be approved first",
        )?;

        let outcome = self
            .gateway
            .process_milestone_payment(self.contract.id, milestone_id)
            .await
            .map_err(WorkflowError::gateway("process payment"))?;

        self.advance_records(milestone_id, PaymentRequestStatus::Processed);
        let milestone = self.settle_milestone(milestone_id, &outcome)?;

        info!(
            milestone_id,
            amount = %milestone.amount,
            paid_amount = %self.contract.paid_amount,
            "contract_workflow: payment processed"
        );
        Ok(milestone)
    }

    /// Client's one-step acceptance: a requested or approved payment is
    /// settled in a single backend call.
    pub async fn accept_payment(
        &mut self,
        milestone_id: MilestoneId,
        notes: Option<String>,
    ) -> WorkflowResult<Milestone> {
        let action = WorkflowAction::AcceptPayment {
            milestone_id,
            notes: notes.clone(),
        };
        let result = self.try_accept_payment(milestone_id, notes).await;
        self.track(action, result)
    }

    async fn try_accept_payment(
        &mut self,
        milestone_id: MilestoneId,
        notes: Option<String>,
    ) -> WorkflowResult<Milestone> {
        let milestone = &self.milestones[self.milestone_index(milestone_id)?];
        if !matches!(
            milestone.status,
            MilestoneStatus::InProgress | MilestoneStatus::Completed
        ) {
            return Err(WorkflowError::Rejected(
                "Milestone must be completed or in progress to accept payment".to_string(),
            ));
        }
        self.ensure_payment_status(
            milestone_id,
            &[PaymentRequestStatus::Requested, PaymentRequestStatus::Approved],
            "Only a requested or approved payment can be accepted",
        )?;

        let outcome = self
            .gateway
            .accept_milestone_payment(self.contract.id, milestone_id, notes)
            .await
            .map_err(WorkflowError::gateway("accept payment"))?;

        for request in self.records_mut(milestone_id) {
            request.settle();
        }
        let milestone = self.settle_milestone(milestone_id, &outcome)?;

        info!(
            milestone_id,
            amount = %milestone.amount,
            "contract_workflow: payment accepted"
        );
        Ok(milestone)
    }

    /// Cancels a pending or in-progress milestone. Any outstanding request on
    /// it ends up rejected.
    pub async fn cancel_milestone(
        &mut self,
        milestone_id: MilestoneId,
        notes: Option<String>,
    ) -> WorkflowResult<Milestone> {
        let action = WorkflowAction::CancelMilestone {
            milestone_id,
            notes: notes.clone(),
        };
        let result = self.try_cancel_milestone(milestone_id, notes).await;
        self.track(action, result)
    }

    async fn try_cancel_milestone(
        &mut self,
        milestone_id: MilestoneId,
        notes: Option<String>,
    ) -> WorkflowResult<Milestone> {
        let milestone = &self.milestones[self.milestone_index(milestone_id)?];
        if !milestone.status.accepts_payment_request() {
            return Err(WorkflowError::Rejected(
                "Can only cancel pending or in-progress milestones".to_string(),
            ));
        }

        let outcome = self
            .gateway
            .cancel_milestone(self.contract.id, milestone_id, notes)
            .await
            .map_err(WorkflowError::gateway("cancel milestone"))?;

        self.advance_records(milestone_id, PaymentRequestStatus::Rejected);
        if self
            .payment_flow
            .as_ref()
            .is_some_and(|flow| flow.milestone_id == milestone_id)
        {
            self.payment_flow = None;
        }
        let milestone = self.apply_outcome(milestone_id, &outcome, |milestone| {
            milestone.status = MilestoneStatus::Cancelled;
            milestone.payment_status = Some(PaymentRequestStatus::Rejected);
        })?;

        info!(milestone_id, "contract_workflow: milestone cancelled");
        Ok(milestone)
    }

    fn has_requested_record(&self, milestone_id: MilestoneId) -> bool {
        self.payment_requests.iter().any(|request| {
            request.milestone_id == milestone_id && request.status.is_outstanding()
        })
    }

    fn records_mut(
        &mut self,
        milestone_id: MilestoneId,
    ) -> impl Iterator<Item = &mut PaymentRequest> {
        self.payment_requests
            .iter_mut()
            .filter(move |request| request.milestone_id == milestone_id)
    }

    fn advance_records(&mut self, milestone_id: MilestoneId, next: PaymentRequestStatus) {
        for request in self.records_mut(milestone_id) {
            request.advance(next);
        }
    }

    fn ensure_payment_status(
        &self,
        milestone_id: MilestoneId,
        allowed: &[PaymentRequestStatus],
        message: &str,
    ) -> WorkflowResult<()> {
        let milestone = &self.milestones[self.milestone_index(milestone_id)?];
        match milestone.payment_status {
            Some(status) if allowed.contains(&status) => Ok(()),
            _ => Err(WorkflowError::Rejected(message.to_string())),
        }
    }

    /// Applies the local transition, then lets whatever the backend reported win.
    fn apply_outcome(
        &mut self,
        milestone_id: MilestoneId,
        outcome: &PaymentActionOutcome,
        transition: impl FnOnce(&mut Milestone),
    ) -> WorkflowResult<Milestone> {
        let idx = self.milestone_index(milestone_id)?;
        transition(&mut self.milestones[idx]);

        let milestone = &mut self.milestones[idx];
        if let Some(status) = outcome.status {
            milestone.status = status;
        }
        if let Some(payment_status) = outcome.payment_status {
            milestone.payment_status = Some(payment_status);
        }
        if outcome.milestone_id.is_some_and(|id| id != milestone_id) {
            warn!(
                milestone_id,
                reported = ?outcome.milestone_id,
                "contract_workflow: backend answered for a different milestone"
            );
        }
        Ok(milestone.clone())
    }

    fn settle_milestone(
        &mut self,
        milestone_id: MilestoneId,
        outcome: &PaymentActionOutcome,
    ) -> WorkflowResult<Milestone> {
        let paid_on = today();
        let milestone = self.apply_outcome(milestone_id, outcome, |milestone| {
            milestone.status = MilestoneStatus::Completed;
            milestone.payment_status = Some(PaymentRequestStatus::Processed);
            milestone.payment_date = Some(paid_on);
            milestone.completion_date.get_or_insert(paid_on);
        })?;

        self.contract.paid_amount += outcome.amount.unwrap_or(milestone.amount);
        Ok(milestone)
    }
}

fn no_payment_flow() -> WorkflowError {
    WorkflowError::Rejected("No payment request is in progress".to_string())
}
