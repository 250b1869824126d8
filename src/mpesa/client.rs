use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ports::{GatewayError, PaymentGateway, PushAccepted, PushPayment};

const STK_PUSH_PATH: &str = "/mpesa/stkpush/v1/processrequest";

/// Request body of the network's push-payment (STK) endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushRequest<'a> {
    business_short_code: &'a str,
    timestamp: String,
    transaction_type: &'static str,
    amount: i64,
    party_a: &'a str,
    party_b: &'a str,
    phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    callback_url: &'a str,
    account_reference: &'a str,
    transaction_desc: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: Option<String>,
    response_code: Option<String>,
    response_description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StkErrorResponse {
    error_code: Option<String>,
    error_message: Option<String>,
}

/// HTTP client for the mobile-money network's push-payment API.
#[derive(Clone)]
pub struct MpesaClient {
    client: Client,
    base_url: String,
    short_code: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl MpesaClient {
    /// Creates a new MpesaClient with the default circuit breaker (3 failures, 60s reset).
    pub fn new(base_url: String, short_code: String, timeout: Duration) -> Self {
        Self::with_circuit_breaker(base_url, short_code, timeout, 3, 60)
    }

    /// Creates a new MpesaClient with custom circuit breaker configuration
    pub fn with_circuit_breaker(
        base_url: String,
        short_code: String,
        timeout: Duration,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        MpesaClient {
            client,
            base_url,
            short_code,
            circuit_breaker,
        }
    }

    async fn send(client: Client, url: String, body: serde_json::Value) -> Result<PushAccepted, GatewayError> {
        let response = client.post(&url).json(&body).send().await?;
        let status = response.status();

        if status.is_server_error() {
            return Err(GatewayError::InvalidResponse(format!("HTTP {}", status)));
        }

        if !status.is_success() {
            let detail = response
                .json::<StkErrorResponse>()
                .await
                .ok()
                .and_then(|e| e.error_message.or(e.error_code))
                .unwrap_or_else(|| format!("HTTP {}", status));
            return Err(GatewayError::Rejected(detail));
        }

        let parsed = response
            .json::<StkPushResponse>()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        if parsed.response_code.as_deref() != Some("0") {
            return Err(GatewayError::Rejected(
                parsed
                    .response_description
                    .unwrap_or_else(|| "push request not accepted".to_string()),
            ));
        }

        let checkout_request_id = parsed.checkout_request_id.ok_or_else(|| {
            GatewayError::InvalidResponse("missing CheckoutRequestID".to_string())
        })?;

        Ok(PushAccepted {
            checkout_request_id,
            merchant_request_id: parsed.merchant_request_id,
        })
    }
}

#[async_trait]
impl PaymentGateway for MpesaClient {
    async fn push_payment(&self, push: &PushPayment) -> Result<PushAccepted, GatewayError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), STK_PUSH_PATH);
        let body = serde_json::to_value(StkPushRequest {
            business_short_code: &self.short_code,
            timestamp: chrono::Utc::now().format("%Y%m%d%H%M%S").to_string(),
            transaction_type: "CustomerPayBillOnline",
            amount: push.amount,
            party_a: &push.phone,
            party_b: &self.short_code,
            phone_number: &push.phone,
            callback_url: &push.callback_url,
            account_reference: &push.account_reference,
            transaction_desc: &push.description,
        })
        .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        // Business rejections are the payer's problem, not the network's health.
        let result = self
            .circuit_breaker
            .call_with(
                |e: &GatewayError| !matches!(e, GatewayError::Rejected(_)),
                Self::send(self.client.clone(), url, body),
            )
            .await;

        match result {
            Ok(accepted) => Ok(accepted),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitBreakerOpen(
                "payment network circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }

    fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }
}
