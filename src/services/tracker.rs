//! Payment request tracker.
//!
//! Creates push-payment requests, hands them to the payment network and keeps
//! their lifecycle. A request is only ever moved out of `Pending` while its
//! reference lock is held, so the reconciler and the expiry sweep cannot both
//! settle the same request.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{PaymentRequest, PaymentStatus};
use crate::mpesa;
use crate::ports::{GatewayError, PaymentGateway, PaymentRequestRepository, PushPayment, RepositoryError};
use crate::services::locks::ReferenceLocks;
use crate::validation::{
    normalize_phone, validate_identifier, validate_positive_amount, ValidationError,
};

pub const DEFAULT_MODULE: &str = "goals";
const REFERENCE_SUFFIX_LEN: usize = 12;
const MAX_REFERENCE_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("payment request {0} not found")]
    NotFound(String),
    #[error("payment network refused request {reference}: {source}")]
    Gateway {
        reference: String,
        #[source]
        source: GatewayError,
    },
    #[error("could not allocate a unique payment reference")]
    ReferenceExhausted,
    #[error("storage error: {0}")]
    Store(#[from] RepositoryError),
}

/// Input for [`PaymentRequestTracker::create`].
#[derive(Debug, Clone)]
pub struct NewPaymentRequest {
    pub user_id: String,
    pub phone: String,
    pub amount: i64,
    pub purpose: String,
    pub goal_id: Option<String>,
    pub budget_category: Option<String>,
    pub module: Option<String>,
}

pub struct PaymentRequestTracker {
    requests: Arc<dyn PaymentRequestRepository>,
    gateway: Arc<dyn PaymentGateway>,
    locks: Arc<ReferenceLocks>,
    base_url: String,
}

impl PaymentRequestTracker {
    pub fn new(
        requests: Arc<dyn PaymentRequestRepository>,
        gateway: Arc<dyn PaymentGateway>,
        locks: Arc<ReferenceLocks>,
        base_url: String,
    ) -> Self {
        Self {
            requests,
            gateway,
            locks,
            base_url,
        }
    }

    pub fn locks(&self) -> &ReferenceLocks {
        &self.locks
    }

    pub fn gateway_state(&self) -> String {
        self.gateway.circuit_state()
    }

    /// Validates, persists a pending request and dispatches the push prompt.
    /// Returns as soon as the network has accepted the prompt.
    pub async fn create(&self, input: NewPaymentRequest) -> Result<PaymentRequest, TrackerError> {
        validate_identifier("user_id", &input.user_id)?;
        validate_identifier("purpose", &input.purpose)?;
        validate_positive_amount(input.amount)?;
        let phone = normalize_phone(&input.phone)?;
        let module = input
            .module
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODULE.to_string());
        validate_identifier("module", &module)?;
        if let Some(goal_id) = &input.goal_id {
            validate_identifier("goal_id", goal_id)?;
        }
        let budget_category = input
            .budget_category
            .map(|c| crate::validation::sanitize_string(&c))
            .filter(|c| !c.is_empty());

        let template = PaymentRequest::new(
            String::new(),
            input.user_id,
            phone,
            input.amount,
            input.purpose,
            input.goal_id,
            budget_category,
            mpesa::callback_path(&module),
        );
        let request = self.persist_pending(template).await?;

        let push = PushPayment {
            phone: request.phone.clone(),
            amount: request.amount,
            account_reference: request.reference.clone(),
            callback_url: mpesa::callback_url(&self.base_url, &module),
            description: request.purpose.clone(),
        };

        match self.gateway.push_payment(&push).await {
            Ok(accepted) => {
                info!(
                    reference = %request.reference,
                    user_id = %request.user_id,
                    amount = request.amount,
                    checkout_request_id = %accepted.checkout_request_id,
                    "Push payment dispatched"
                );
                Ok(request)
            }
            Err(source) => {
                warn!(reference = %request.reference, error = %source, "Push payment dispatch failed");
                let _guard = self.locks.acquire(&request.reference).await;
                self.requests
                    .transition(&request.reference, PaymentStatus::Pending, PaymentStatus::Failed, Utc::now())
                    .await?;
                Err(TrackerError::Gateway {
                    reference: request.reference,
                    source,
                })
            }
        }
    }

    pub async fn lookup(&self, reference: &str) -> Result<PaymentRequest, TrackerError> {
        self.requests
            .get(reference)
            .await?
            .ok_or_else(|| TrackerError::NotFound(reference.to_string()))
    }

    pub async fn find(&self, reference: &str) -> Result<Option<PaymentRequest>, RepositoryError> {
        self.requests.get(reference).await
    }

    /// Moves a pending request to `to`. The caller must hold the reference lock.
    pub(crate) async fn settle(&self, reference: &str, to: PaymentStatus) -> Result<bool, RepositoryError> {
        self.requests
            .transition(reference, PaymentStatus::Pending, to, Utc::now())
            .await
    }

    /// Expires pending requests created before `now - horizon`. Returns how many moved.
    pub async fn expire_stale(&self, now: DateTime<Utc>, horizon: chrono::Duration) -> Result<usize, TrackerError> {
        let cutoff = now - horizon;
        let stale = self.requests.pending_created_before(cutoff).await?;

        let mut expired = 0;
        for request in stale {
            let _guard = self.locks.acquire(&request.reference).await;
            if self
                .requests
                .transition(&request.reference, PaymentStatus::Pending, PaymentStatus::Expired, now)
                .await?
            {
                info!(reference = %request.reference, created_at = %request.created_at, "Payment request expired");
                expired += 1;
            }
        }

        Ok(expired)
    }

    async fn persist_pending(&self, template: PaymentRequest) -> Result<PaymentRequest, TrackerError> {
        for _ in 0..MAX_REFERENCE_ATTEMPTS {
            let request = PaymentRequest {
                reference: generate_reference(&template.user_id, &template.purpose),
                ..template.clone()
            };
            match self.requests.insert(&request).await {
                Ok(()) => return Ok(request),
                Err(RepositoryError::Conflict(reference)) => {
                    warn!(reference = %reference, "Payment reference collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(TrackerError::ReferenceExhausted)
    }
}

/// `{user_id}_{purpose}_{suffix}`; the random suffix keeps repeated
/// contributions for the same user and purpose apart.
pub fn generate_reference(user_id: &str, purpose: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", user_id, purpose, &suffix[..REFERENCE_SUFFIX_LEN])
}
