use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result, anyhow};
use milestone_desk::{
    application::usecases::contract_workflow::ContractWorkflow,
    config::config_loader,
    domain::value_objects::money::format_usd,
    infrastructure::backend_api::{client::BackendApiClient, session::StaticSession},
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        error!("milestone-desk exited with error: {:#}", error);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    milestone_desk::observability::init_observability("milestone-desk")?;

    let contract_id: i64 = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow!("usage: milestone-desk <contract_id>"))?
        .parse()
        .context("contract_id must be a number")?;

    let dotenvy_env = config_loader::load()?;
    info!(
        base_url = %dotenvy_env.backend_api.base_url,
        timeout_secs = dotenvy_env.backend_api.timeout,
        policy = %dotenvy_env.workflow.contract_status_policy,
        "ENV has been loaded"
    );

    let session = Arc::new(StaticSession::new(dotenvy_env.backend_api.access_token.clone()));
    let gateway = BackendApiClient::new(
        dotenvy_env.backend_api.base_url.clone(),
        Duration::from_secs(dotenvy_env.backend_api.timeout),
        session,
    )?;

    let workflow = ContractWorkflow::load(
        Arc::new(gateway),
        contract_id,
        dotenvy_env.workflow.contract_status_policy,
    )
    .await
    .with_context(|| format!("failed to load contract {contract_id}"))?;

    let contract = workflow.contract();
    let budget = workflow.budget();
    info!(
        contract_id = contract.id,
        title = %contract.title,
        status = %contract.status,
        total = %format_usd(budget.contract_total),
        paid = %format_usd(budget.paid_amount),
        defined = %format_usd(budget.milestones_total),
        remaining = %format_usd(budget.remaining),
        can_add_milestone = budget.can_add_milestone(),
        actions = ?workflow.available_actions(),
        "Contract overview"
    );
    if let Some(warning) = budget.warning() {
        warn!("{warning}");
    }

    let today = chrono::Local::now().date_naive();
    for milestone in workflow.milestones() {
        info!(
            milestone_id = milestone.id,
            order = milestone.order,
            title = %milestone.title,
            status = %milestone.status,
            amount = %format_usd(milestone.amount),
            due_date = %milestone.due_date,
            progress = milestone.progress_fraction(),
            overdue = milestone.is_overdue(today),
            payment_status = milestone
                .payment_status
                .map(|status| status.as_str())
                .unwrap_or("not_requested"),
            "Milestone"
        );
    }

    Ok(())
}
