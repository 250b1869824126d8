//! Seams between the reconciliation core and the outside world: storage,
//! the payment network and the text collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::domain::{Goal, PaymentRequest, PaymentStatus, TransactionRecord};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("duplicate key: {0}")]
    Conflict(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("row".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(db.message().to_string())
            }
            other => RepositoryError::Storage(other.to_string()),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait PaymentRequestRepository: Send + Sync {
    /// Fails with [`RepositoryError::Conflict`] when the reference is taken.
    async fn insert(&self, request: &PaymentRequest) -> RepositoryResult<()>;

    async fn get(&self, reference: &str) -> RepositoryResult<Option<PaymentRequest>>;

    /// Compare-and-set on status. Returns `false` when the stored status was
    /// not `from` (or the reference is unknown) and nothing changed.
    async fn transition(
        &self,
        reference: &str,
        from: PaymentStatus,
        to: PaymentStatus,
        at: DateTime<Utc>,
    ) -> RepositoryResult<bool>;

    async fn pending_created_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<Vec<PaymentRequest>>;
}

/// Result of a ledger commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Recorded {
        record: TransactionRecord,
        goal: Option<Goal>,
    },
    /// A record with the same external transaction id already existed;
    /// nothing was written.
    Duplicate(TransactionRecord),
}

#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn find_transaction(&self, external_tx_id: &str) -> RepositoryResult<Option<TransactionRecord>>;

    /// Appends `record` and, when it is linked to a goal, adds its amount to
    /// the goal. Both writes land or neither does.
    async fn commit(&self, record: TransactionRecord) -> RepositoryResult<CommitOutcome>;

    async fn create_goal(&self, goal: &Goal) -> RepositoryResult<()>;

    async fn get_goal(&self, goal_id: &str) -> RepositoryResult<Option<Goal>>;

    /// Sum of all transaction amounts linked to `goal_id`.
    async fn goal_contributions(&self, goal_id: &str) -> RepositoryResult<i64>;

    async fn ping(&self) -> RepositoryResult<()> {
        Ok(())
    }
}

/// Push-payment prompt sent to the payer's phone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayment {
    pub phone: String,
    pub amount: i64,
    pub account_reference: String,
    pub callback_url: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushAccepted {
    pub checkout_request_id: String,
    pub merchant_request_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment network request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("payment network rejected the request: {0}")]
    Rejected(String),
    #[error("invalid response from payment network: {0}")]
    InvalidResponse(String),
    #[error("circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn push_payment(&self, push: &PushPayment) -> Result<PushAccepted, GatewayError>;

    fn circuit_state(&self) -> String {
        "closed".to_string()
    }
}

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("collaborator timed out after {0:?}")]
    Timeout(Duration),
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("collaborator failed: {0}")]
    Failed(String),
}

/// Opaque text-in, text-out collaborator (classification or message wording).
#[async_trait]
pub trait TextCollaborator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CollaboratorError>;
}

/// Runs `complete` under `timeout`, folding expiry into [`CollaboratorError::Timeout`].
pub async fn complete_within(
    collaborator: &dyn TextCollaborator,
    prompt: &str,
    timeout: Duration,
) -> Result<String, CollaboratorError> {
    match tokio::time::timeout(timeout, collaborator.complete(prompt)).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout(timeout)),
    }
}
