use anyhow::{Context, Result, anyhow};
use url::Url;

use crate::application::usecases::contract_workflow::StatusTransitionPolicy;

use super::config_model::{BackendApi, DotEnvyConfig, Workflow};

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api";
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    from_lookup(|key| std::env::var(key).ok())
}

/// Builds the config from any key lookup; `load` reads the process environment.
pub fn from_lookup<F>(lookup: F) -> Result<DotEnvyConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    let base_url = var("API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
    let backend_api = BackendApi {
        base_url: Url::parse(base_url.trim())
            .with_context(|| format!("API_BASE_URL is invalid: {base_url}"))?,
        timeout: match var("API_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("API_TIMEOUT_SECS is invalid: {raw}"))?,
            None => DEFAULT_API_TIMEOUT_SECS,
        },
        access_token: var("ACCESS_TOKEN"),
    };

    let contract_status_policy = match var("CONTRACT_STATUS_POLICY") {
        Some(raw) => StatusTransitionPolicy::from_str(&raw)
            .ok_or_else(|| anyhow!("CONTRACT_STATUS_POLICY is invalid: {raw}"))?,
        None => StatusTransitionPolicy::default(),
    };

    Ok(DotEnvyConfig {
        backend_api,
        workflow: Workflow {
            contract_status_policy,
        },
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.backend_api.base_url.as_str(), "http://127.0.0.1:8000/api");
        assert_eq!(config.backend_api.timeout, 30);
        assert_eq!(config.backend_api.access_token, None);
        assert_eq!(
            config.workflow.contract_status_policy,
            StatusTransitionPolicy::Unrestricted
        );
    }

    #[test]
    fn explicit_values_are_parsed() {
        let config = from_lookup(lookup(&[
            ("API_BASE_URL", "https://marketplace.example.com/api/"),
            ("API_TIMEOUT_SECS", "5"),
            ("ACCESS_TOKEN", "abc"),
            ("CONTRACT_STATUS_POLICY", "guarded"),
        ]))
        .unwrap();

        assert_eq!(config.backend_api.timeout, 5);
        assert_eq!(config.backend_api.access_token.as_deref(), Some("abc"));
        assert_eq!(
            config.workflow.contract_status_policy,
            StatusTransitionPolicy::Guarded
        );
    }

    #[test]
    fn invalid_values_are_reported() {
        assert!(from_lookup(lookup(&[("API_TIMEOUT_SECS", "soon")])).is_err());
        assert!(from_lookup(lookup(&[("CONTRACT_STATUS_POLICY", "strict")])).is_err());
        assert!(from_lookup(lookup(&[("API_BASE_URL", "not a url")])).is_err());
    }
}
