use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{
    Method, RequestBuilder, Response,
    header::{ACCEPT, AUTHORIZATION},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::{debug, error};
use url::Url;

use super::envelope::{ListEnvelope, error_message};
use crate::domain::{
    entities::{
        contracts::{Contract, ContractId},
        milestones::{Milestone, MilestoneChanges, MilestoneId, NewMilestone},
        payment_requests::NewPaymentRequest,
    },
    repositories::{
        contract_gateway::{
            ActionMessage, ContractClosure, ContractGateway, GatewayResult, PaymentActionOutcome,
            PaymentRequestReceipt,
        },
        session::SessionContext,
    },
    value_objects::{
        enums::{contract_statuses::ContractStatus, error_categories::ErrorCategory},
        gateway_errors::GatewayError,
    },
};

/// JSON-over-HTTP client for the marketplace backend.
pub struct BackendApiClient {
    http: reqwest::Client,
    base_url: Url,
    session: Arc<dyn SessionContext>,
}

impl BackendApiClient {
    pub fn new(base_url: Url, timeout: Duration, session: Arc<dyn SessionContext>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build backend http client")?;

        Ok(Self {
            http,
            base_url: with_trailing_slash(base_url),
            session,
        })
    }

    fn request(&self, method: Method, path: &str) -> GatewayResult<RequestBuilder> {
        let url = self.base_url.join(path).map_err(|err| {
            GatewayError::new(
                ErrorCategory::Unknown,
                format!("invalid backend endpoint `{path}`: {err}"),
            )
        })?;

        let mut builder = self
            .http
            .request(method, url)
            .header(ACCEPT, "application/json");
        if let Some(token) = self.session.access_token() {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        Ok(builder)
    }

    async fn send(builder: RequestBuilder, context: &str) -> GatewayResult<Response> {
        let resp = builder.send().await.map_err(|err| {
            error!(
                context = %context,
                timeout = err.is_timeout(),
                connect = err.is_connect(),
                error = %err,
                "backend request did not complete"
            );
            GatewayError::network(ErrorCategory::Network.default_message())
        })?;

        Self::ensure_success(resp, context).await
    }

    async fn ensure_success(resp: Response, context: &str) -> GatewayResult<Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };
        let details = serde_json::from_str::<Value>(&body).ok();
        let backend_message = details.as_ref().and_then(error_message);

        error!(
            status = %status,
            backend_message = ?backend_message,
            response_body = %body,
            context = %context,
            "backend api request failed"
        );

        Err(GatewayError::from_status(
            status.as_u16(),
            backend_message,
            details,
        ))
    }

    async fn decode<T: DeserializeOwned>(resp: Response, context: &str) -> GatewayResult<T> {
        let status = resp.status().as_u16();
        let bytes = resp.bytes().await.map_err(|err| {
            error!(context = %context, error = %err, "failed to read backend response body");
            GatewayError::network(ErrorCategory::Network.default_message())
        })?;

        serde_json::from_slice(&bytes).map_err(|err| {
            error!(
                context = %context,
                status,
                error = %err,
                "backend response did not match the expected shape"
            );
            GatewayError {
                category: ErrorCategory::Unknown,
                message: format!("Unexpected response from backend while trying to {context}"),
                status: Some(status),
                details: None,
            }
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, context: &str) -> GatewayResult<T> {
        let resp = Self::send(self.request(Method::GET, path)?, context).await?;
        Self::decode(resp, context).await
    }

    async fn send_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        context: &str,
    ) -> GatewayResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(context = %context, path = %path, "calling backend");
        let resp = Self::send(self.request(method, path)?.json(body), context).await?;
        Self::decode(resp, context).await
    }

    async fn milestone_action(
        &self,
        contract_id: ContractId,
        milestone_id: MilestoneId,
        action: &str,
        notes: Option<String>,
    ) -> GatewayResult<PaymentActionOutcome> {
        let body = match notes {
            Some(notes) => json!({ "notes": notes }),
            None => json!({}),
        };
        self.send_json(
            Method::POST,
            &format!("contracts/{contract_id}/milestones/{milestone_id}/{action}/"),
            &body,
            action,
        )
        .await
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[async_trait]
impl ContractGateway for BackendApiClient {
    async fn get_contract(&self, contract_id: ContractId) -> GatewayResult<Contract> {
        self.get_json(&format!("contracts/{contract_id}/"), "get contract")
            .await
    }

    async fn list_milestones(&self, contract_id: ContractId) -> GatewayResult<Vec<Milestone>> {
        let envelope: ListEnvelope<Milestone> = self
            .get_json(
                &format!("contracts/{contract_id}/milestones/"),
                "list milestones",
            )
            .await?;
        Ok(envelope.into_items())
    }

    async fn create_milestone(
        &self,
        contract_id: ContractId,
        milestone: NewMilestone,
    ) -> GatewayResult<Milestone> {
        self.send_json(
            Method::POST,
            &format!("contracts/{contract_id}/milestones/"),
            &milestone,
            "create milestone",
        )
        .await
    }

    async fn update_milestone(
        &self,
        milestone_id: MilestoneId,
        changes: MilestoneChanges,
    ) -> GatewayResult<Milestone> {
        self.send_json(
            Method::PUT,
            &format!("contracts/milestones/{milestone_id}/"),
            &changes,
            "update milestone",
        )
        .await
    }

    async fn delete_milestone(&self, milestone_id: MilestoneId) -> GatewayResult<()> {
        let builder = self.request(
            Method::DELETE,
            &format!("contracts/milestones/{milestone_id}/"),
        )?;
        Self::send(builder, "delete milestone").await?;
        Ok(())
    }

    async fn request_milestone_payment(
        &self,
        milestone_id: MilestoneId,
        request: NewPaymentRequest,
    ) -> GatewayResult<PaymentRequestReceipt> {
        self.send_json(
            Method::POST,
            &format!("payments/milestones/{milestone_id}/request/"),
            &request,
            "request milestone payment",
        )
        .await
    }

    async fn approve_milestone_payment(
        &self,
        contract_id: ContractId,
        milestone_id: MilestoneId,
        notes: Option<String>,
    ) -> GatewayResult<PaymentActionOutcome> {
        self.milestone_action(contract_id, milestone_id, "approve-payment", notes)
            .await
    }

    async fn reject_milestone_payment(
        &self,
        contract_id: ContractId,
        milestone_id: MilestoneId,
        notes: Option<String>,
    ) -> GatewayResult<PaymentActionOutcome> {
        self.milestone_action(contract_id, milestone_id, "reject-payment", notes)
            .await
    }

    async fn process_milestone_payment(
        &self,
        contract_id: ContractId,
        milestone_id: MilestoneId,
    ) -> GatewayResult<PaymentActionOutcome> {
        self.milestone_action(contract_id, milestone_id, "process-payment", None)
            .await
    }

    async fn accept_milestone_payment(
        &self,
        contract_id: ContractId,
        milestone_id: MilestoneId,
        notes: Option<String>,
    ) -> GatewayResult<PaymentActionOutcome> {
        self.milestone_action(contract_id, milestone_id, "accept-payment", notes)
            .await
    }

    async fn cancel_milestone(
        &self,
        contract_id: ContractId,
        milestone_id: MilestoneId,
        notes: Option<String>,
    ) -> GatewayResult<PaymentActionOutcome> {
        self.milestone_action(contract_id, milestone_id, "cancel", notes)
            .await
    }

    async fn update_contract_status(
        &self,
        contract_id: ContractId,
        status: ContractStatus,
    ) -> GatewayResult<Contract> {
        self.send_json(
            Method::PATCH,
            &format!("contracts/{contract_id}/update/"),
            &json!({ "status": status }),
            "update contract status",
        )
        .await
    }

    async fn sign_contract(&self, contract_id: ContractId) -> GatewayResult<ActionMessage> {
        self.send_json(
            Method::POST,
            &format!("contracts/{contract_id}/sign/"),
            &json!({}),
            "sign contract",
        )
        .await
    }

    async fn complete_contract(&self, contract_id: ContractId) -> GatewayResult<ContractClosure> {
        self.send_json(
            Method::POST,
            &format!("contracts/{contract_id}/complete/"),
            &json!({}),
            "complete contract",
        )
        .await
    }

    async fn dispute_contract(&self, contract_id: ContractId) -> GatewayResult<ContractClosure> {
        self.send_json(
            Method::POST,
            &format!("contracts/{contract_id}/dispute/"),
            &json!({}),
            "dispute contract",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use axum::{
        Json, Router,
        body::Bytes,
        extract::Path,
        http::{HeaderMap, StatusCode, Uri},
        routing::{delete, get, post},
    };
    use rust_decimal::Decimal;

    use crate::{
        domain::value_objects::enums::{
            milestone_statuses::MilestoneStatus, payment_request_statuses::PaymentRequestStatus,
        },
        infrastructure::backend_api::session::StaticSession,
    };

    type Calls = Arc<Mutex<Vec<(String, String, Value)>>>;

    /// Backend stub that records method, path and JSON body of every call and
    /// answers with a body shaped for the route.
    fn recording_backend(calls: Calls) -> Router {
        Router::new().fallback(move |method: axum::http::Method, uri: Uri, body: Bytes| {
            let calls = calls.clone();
            async move {
                let path = uri.path().to_string();
                let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
                calls
                    .lock()
                    .unwrap()
                    .push((method.to_string(), path.clone(), body));
                Json(reply_for(&path))
            }
        })
    }

    fn reply_for(path: &str) -> Value {
        let action = path.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
        match action {
            "approve-payment" => json!({"message": "Payment approved", "payment_status": "approved"}),
            "reject-payment" => json!({"message": "Payment rejected", "payment_status": "rejected"}),
            "accept-payment" => json!({
                "message": "Payment accepted",
                "status": "completed",
                "payment_status": "paid",
                "amount": "400.00"
            }),
            "cancel" => json!({"message": "Milestone cancelled", "status": "cancelled"}),
            "sign" => json!({"message": "Contract signed successfully"}),
            "complete" => json!({"message": "Contract completed successfully", "status": "completed"}),
            "dispute" => json!({"message": "Contract disputed", "status": "disputed"}),
            _ if path.starts_with("/api/contracts/milestones/") => milestone_json(3, 1),
            _ => json!({
                "id": 7,
                "title": "Kitchen remodel",
                "total_amount": "1000.00",
                "paid_amount": "250.00",
                "status": "active",
                "client_signed": true,
                "professional_signed": false
            }),
        }
    }

    async fn spawn_backend(router: Router) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Url::parse(&format!("http://{addr}/api")).unwrap()
    }

    fn client(base_url: Url, token: Option<&str>) -> BackendApiClient {
        BackendApiClient::new(
            base_url,
            Duration::from_secs(5),
            Arc::new(StaticSession::new(token.map(str::to_string))),
        )
        .unwrap()
    }

    fn milestone_json(id: i64, order: i64) -> Value {
        json!({
            "id": id,
            "contract": 7,
            "title": format!("Milestone {id}"),
            "description": "Deliver the agreed scope",
            "amount": "400.00",
            "due_date": "2024-06-01",
            "status": "pending",
            "payment_status": "not_requested",
            "order": order
        })
    }

    #[tokio::test]
    async fn paginated_milestones_are_unwrapped_and_bearer_token_is_sent() {
        let router = Router::new().route(
            "/api/contracts/:id/milestones/",
            get(|Path(id): Path<i64>, headers: HeaderMap| async move {
                let authorized = headers
                    .get("authorization")
                    .and_then(|value| value.to_str().ok())
                    == Some("Bearer token-123");
                if !authorized || id != 7 {
                    return (
                        StatusCode::UNAUTHORIZED,
                        Json(json!({"detail": "Authentication credentials were not provided."})),
                    );
                }
                (
                    StatusCode::OK,
                    Json(json!({
                        "count": 2,
                        "results": [milestone_json(1, 1), milestone_json(2, 2)]
                    })),
                )
            }),
        );
        let base_url = spawn_backend(router).await;

        let milestones = client(base_url.clone(), Some("token-123"))
            .list_milestones(7)
            .await
            .unwrap();
        assert_eq!(milestones.len(), 2);
        assert_eq!(milestones[1].amount, Decimal::from(400));

        let err = client(base_url, None).list_milestones(7).await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::Auth);
        assert_eq!(err.message, "Authentication credentials were not provided.");
        assert_eq!(err.status, Some(401));
    }

    #[tokio::test]
    async fn conflict_keeps_backend_message_and_details() {
        let router = Router::new().route(
            "/api/contracts/:id/milestones/",
            post(|| async {
                (
                    StatusCode::CONFLICT,
                    Json(json!({"error": "A milestone with this order already exists"})),
                )
            }),
        );
        let base_url = spawn_backend(router).await;

        let payload = NewMilestone {
            title: "Design".to_string(),
            description: "Mockups for all pages".to_string(),
            amount: Decimal::from(300),
            due_date: chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            order: 3,
        };
        let err = client(base_url, Some("t"))
            .create_milestone(7, payload)
            .await
            .unwrap_err();

        assert_eq!(err.category, ErrorCategory::Conflict);
        assert_eq!(err.message, "A milestone with this order already exists");
        assert!(err.details.is_some());
    }

    #[tokio::test]
    async fn payment_request_sends_amount_as_json_number() {
        let received = Arc::new(Mutex::new(None::<Value>));
        let captured = received.clone();
        let router = Router::new().route(
            "/api/payments/milestones/:id/request/",
            post(move |Path(id): Path<i64>, Json(body): Json<Value>| {
                let captured = captured.clone();
                async move {
                    *captured.lock().unwrap() = Some(body);
                    Json(json!({
                        "message": "Milestone payment request created successfully",
                        "payment_id": 55,
                        "payment_uuid": "0b8f3c1e-5d1a-4a37-9d0c-0f6a1c1f8e21",
                        "amount": 250.0,
                        "status": "pending",
                        "milestone": id
                    }))
                }
            }),
        );
        let base_url = spawn_backend(router).await;

        let receipt = client(base_url, Some("t"))
            .request_milestone_payment(
                3,
                NewPaymentRequest {
                    amount: Decimal::from(250),
                    description: "Finished the first deliverable".to_string(),
                    notes: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(receipt.payment_id, 55);
        assert!(receipt.payment_uuid.is_some());
        let body = received.lock().unwrap().clone().unwrap();
        assert_eq!(body["amount"], json!(250.0));
        assert_eq!(body["description"], json!("Finished the first deliverable"));
        assert!(body.get("notes").is_none());
    }

    #[tokio::test]
    async fn payment_action_outcome_decodes_backend_payment_status() {
        let router = Router::new().route(
            "/api/contracts/:cid/milestones/:mid/process-payment/",
            post(|Path((_cid, mid)): Path<(i64, i64)>| async move {
                Json(json!({
                    "message": "Payment processed successfully",
                    "milestone_id": mid,
                    "payment_status": "paid",
                    "amount": "250.00",
                    "contract_balance_remaining": 750
                }))
            }),
        );
        let base_url = spawn_backend(router).await;

        let outcome = client(base_url, Some("t"))
            .process_milestone_payment(7, 3)
            .await
            .unwrap();

        assert_eq!(outcome.milestone_id, Some(3));
        assert_eq!(outcome.payment_status, Some(PaymentRequestStatus::Processed));
        assert_eq!(outcome.contract_balance_remaining, Some(Decimal::from(750)));
    }

    #[tokio::test]
    async fn delete_accepts_empty_no_content_answer() {
        let router = Router::new().route(
            "/api/contracts/milestones/:id/",
            delete(|| async { StatusCode::NO_CONTENT }),
        );
        let base_url = spawn_backend(router).await;

        client(base_url, Some("t")).delete_milestone(3).await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_retryable_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let base_url = Url::parse(&format!("http://{addr}/api/")).unwrap();
        let err = client(base_url, Some("t")).get_contract(7).await.unwrap_err();

        assert_eq!(err.category, ErrorCategory::Network);
        assert_eq!(err.status, None);
        assert!(err.is_retryable());
    }

    #[test]
    fn base_url_gets_a_trailing_slash() {
        let url = with_trailing_slash(Url::parse("http://localhost:8000/api").unwrap());
        assert_eq!(url.join("contracts/1/").unwrap().as_str(), "http://localhost:8000/api/contracts/1/");
    }

    #[tokio::test]
    async fn contract_and_milestone_edits_use_their_routes() {
        let calls = Calls::default();
        let base_url = spawn_backend(recording_backend(calls.clone())).await;
        let client = client(base_url, Some("t"));

        let contract = client.get_contract(7).await.unwrap();
        assert_eq!(contract.total_amount, Decimal::from(1000));
        assert_eq!(contract.paid_amount, Decimal::from(250));
        assert_eq!(contract.status, ContractStatus::Active);
        assert!(!contract.is_fully_signed());

        let updated = client
            .update_milestone(
                3,
                MilestoneChanges {
                    title: "Framing".to_string(),
                    description: "Frame the new walls".to_string(),
                    amount: Decimal::new(32550, 2),
                    due_date: chrono::NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.id, 3);

        let calls = calls.lock().unwrap().clone();
        assert_eq!(calls[0].0, "GET");
        assert_eq!(calls[0].1, "/api/contracts/7/");
        assert_eq!(calls[1].0, "PUT");
        assert_eq!(calls[1].1, "/api/contracts/milestones/3/");
        assert_eq!(
            calls[1].2,
            json!({
                "title": "Framing",
                "description": "Frame the new walls",
                "amount": 325.5,
                "due_date": "2024-07-01"
            })
        );
    }

    #[tokio::test]
    async fn milestone_decisions_post_notes_to_their_routes() {
        let calls = Calls::default();
        let base_url = spawn_backend(recording_backend(calls.clone())).await;
        let client = client(base_url, Some("t"));

        let approved = client
            .approve_milestone_payment(7, 3, Some("Looks good".to_string()))
            .await
            .unwrap();
        assert_eq!(approved.payment_status, Some(PaymentRequestStatus::Approved));

        let rejected = client.reject_milestone_payment(7, 3, None).await.unwrap();
        assert_eq!(rejected.payment_status, Some(PaymentRequestStatus::Rejected));

        let accepted = client
            .accept_milestone_payment(7, 3, Some("Thanks".to_string()))
            .await
            .unwrap();
        assert_eq!(accepted.status, Some(MilestoneStatus::Completed));
        assert_eq!(accepted.payment_status, Some(PaymentRequestStatus::Processed));

        let cancelled = client
            .cancel_milestone(7, 3, Some("Scope dropped".to_string()))
            .await
            .unwrap();
        assert_eq!(cancelled.status, Some(MilestoneStatus::Cancelled));

        let calls = calls.lock().unwrap().clone();
        let expected = [
            ("/api/contracts/7/milestones/3/approve-payment/", json!({"notes": "Looks good"})),
            ("/api/contracts/7/milestones/3/reject-payment/", json!({})),
            ("/api/contracts/7/milestones/3/accept-payment/", json!({"notes": "Thanks"})),
            ("/api/contracts/7/milestones/3/cancel/", json!({"notes": "Scope dropped"})),
        ];
        assert_eq!(calls.len(), expected.len());
        for ((method, path, body), (expected_path, expected_body)) in calls.iter().zip(expected) {
            assert_eq!(method, "POST");
            assert_eq!(path, expected_path);
            assert_eq!(body, &expected_body);
        }
    }

    #[tokio::test]
    async fn contract_lifecycle_calls_use_their_routes() {
        let calls = Calls::default();
        let base_url = spawn_backend(recording_backend(calls.clone())).await;
        let client = client(base_url, Some("t"));

        let contract = client
            .update_contract_status(7, ContractStatus::Active)
            .await
            .unwrap();
        assert_eq!(contract.id, 7);

        let signed = client.sign_contract(7).await.unwrap();
        assert_eq!(signed.message.as_deref(), Some("Contract signed successfully"));

        let completed = client.complete_contract(7).await.unwrap();
        assert_eq!(completed.status, Some(ContractStatus::Completed));

        let disputed = client.dispute_contract(7).await.unwrap();
        assert_eq!(disputed.status, Some(ContractStatus::Disputed));

        let calls = calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                ("PATCH".to_string(), "/api/contracts/7/update/".to_string(), json!({"status": "active"})),
                ("POST".to_string(), "/api/contracts/7/sign/".to_string(), json!({})),
                ("POST".to_string(), "/api/contracts/7/complete/".to_string(), json!({})),
                ("POST".to_string(), "/api/contracts/7/dispute/".to_string(), json!({})),
            ]
        );
    }
}
