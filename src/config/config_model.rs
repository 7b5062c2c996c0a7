use url::Url;

use crate::application::usecases::contract_workflow::StatusTransitionPolicy;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub backend_api: BackendApi,
    pub workflow: Workflow,
}

#[derive(Debug, Clone)]
pub struct BackendApi {
    pub base_url: Url,
    pub timeout: u64,
    pub access_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Workflow {
    pub contract_status_policy: StatusTransitionPolicy,
}
