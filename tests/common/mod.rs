#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

use pesa_goals::adapters::{InMemoryLedger, InMemoryPaymentRequests};
use pesa_goals::ai::DisabledCollaborator;
use pesa_goals::domain::{Goal, TransactionRecord};
use pesa_goals::ports::{
    CollaboratorError, CommitOutcome, GatewayError, LedgerRepository, PaymentGateway, PushAccepted,
    PushPayment, RepositoryError, RepositoryResult, TextCollaborator,
};
use pesa_goals::{create_app, AppState, Collaborators};

pub const BASE_URL: &str = "https://pesa.example.com";

#[derive(Default)]
pub struct StubGateway {
    pub pushes: Mutex<Vec<PushPayment>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn push_payment(&self, push: &PushPayment) -> Result<PushAccepted, GatewayError> {
        self.pushes.lock().unwrap().push(push.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected("System busy".to_string()));
        }
        Ok(PushAccepted {
            checkout_request_id: format!("ws_CO_{}", push.account_reference),
            merchant_request_id: Some("29115-34620561-1".to_string()),
        })
    }
}

/// In-memory ledger whose commits can be made to fail.
#[derive(Default, Clone)]
pub struct FlakyLedger {
    pub inner: InMemoryLedger,
    pub fail_commits: Arc<AtomicBool>,
}

#[async_trait]
impl LedgerRepository for FlakyLedger {
    async fn find_transaction(&self, external_tx_id: &str) -> RepositoryResult<Option<TransactionRecord>> {
        self.inner.find_transaction(external_tx_id).await
    }

    async fn commit(&self, record: TransactionRecord) -> RepositoryResult<CommitOutcome> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(RepositoryError::Storage("disk full".to_string()));
        }
        self.inner.commit(record).await
    }

    async fn create_goal(&self, goal: &Goal) -> RepositoryResult<()> {
        self.inner.create_goal(goal).await
    }

    async fn get_goal(&self, goal_id: &str) -> RepositoryResult<Option<Goal>> {
        self.inner.get_goal(goal_id).await
    }

    async fn goal_contributions(&self, goal_id: &str) -> RepositoryResult<i64> {
        self.inner.goal_contributions(goal_id).await
    }
}

/// Never answers within any reasonable timeout.
pub struct HangingCollaborator;

#[async_trait]
impl TextCollaborator for HangingCollaborator {
    async fn complete(&self, _prompt: &str) -> Result<String, CollaboratorError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok("Groceries".to_string())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub ledger: FlakyLedger,
    pub requests: InMemoryPaymentRequests,
    pub gateway: Arc<StubGateway>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_classifier(Arc::new(DisabledCollaborator))
    }

    pub fn with_classifier(classifier: Arc<dyn TextCollaborator>) -> Self {
        let ledger = FlakyLedger::default();
        let requests = InMemoryPaymentRequests::new();
        let gateway = Arc::new(StubGateway::default());

        let state = AppState::new(
            Arc::new(requests.clone()),
            Arc::new(ledger.clone()),
            Collaborators {
                gateway: gateway.clone(),
                classifier,
                text_generator: Arc::new(DisabledCollaborator),
                timeout: Duration::from_millis(100),
            },
            BASE_URL.to_string(),
        );

        Self {
            state,
            ledger,
            requests,
            gateway,
        }
    }

    pub fn router(&self) -> Router {
        create_app(self.state.clone())
    }

    pub async fn seed_goal(&self, goal_id: &str, user_id: &str, target: i64) {
        self.ledger
            .create_goal(&Goal::new(
                goal_id.to_string(),
                user_id.to_string(),
                "Emergency Fund".to_string(),
                target,
            ))
            .await
            .unwrap();
    }

    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        self.send_request(request).await
    }

    pub async fn send_request(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn create_payment_request(&self, amount: i64, goal_id: Option<&str>) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/payments/requests",
                Some(json!({
                    "phone": "0712345678",
                    "amount": amount,
                    "purpose": "emergency_fund",
                    "user_id": "user123",
                    "goal_id": goal_id,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create failed: {}", body);
        body["reference"].as_str().unwrap().to_string()
    }
}

pub fn callback_body(external_tx_id: &str, reference: &str, amount: i64) -> Value {
    json!({
        "TransactionType": "Pay Bill",
        "TransID": external_tx_id,
        "TransTime": "20230101120000",
        "TransAmount": amount.to_string(),
        "BusinessShortCode": "123456",
        "BillRefNumber": reference,
        "MSISDN": "254712345678",
        "FirstName": "John",
        "LastName": "Doe"
    })
}
