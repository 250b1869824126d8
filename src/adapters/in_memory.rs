//! In-memory implementations of the storage ports.
//!
//! Used when no `DATABASE_URL` is configured and throughout the test suite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{Goal, PaymentRequest, PaymentStatus, TransactionRecord};
use crate::ports::{
    CommitOutcome, LedgerRepository, PaymentRequestRepository, RepositoryError, RepositoryResult,
};

/// Thread-safe in-memory store of payment requests keyed by reference.
#[derive(Default, Clone)]
pub struct InMemoryPaymentRequests {
    requests: Arc<RwLock<HashMap<String, PaymentRequest>>>,
}

impl InMemoryPaymentRequests {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentRequestRepository for InMemoryPaymentRequests {
    async fn insert(&self, request: &PaymentRequest) -> RepositoryResult<()> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.reference) {
            return Err(RepositoryError::Conflict(request.reference.clone()));
        }
        requests.insert(request.reference.clone(), request.clone());
        Ok(())
    }

    async fn get(&self, reference: &str) -> RepositoryResult<Option<PaymentRequest>> {
        let requests = self.requests.read().await;
        Ok(requests.get(reference).cloned())
    }

    async fn transition(
        &self,
        reference: &str,
        from: PaymentStatus,
        to: PaymentStatus,
        at: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let mut requests = self.requests.write().await;
        match requests.get_mut(reference) {
            Some(request) if request.status == from => Ok(request.transition(to, at).is_ok()),
            _ => Ok(false),
        }
    }

    async fn pending_created_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<Vec<PaymentRequest>> {
        let requests = self.requests.read().await;
        let mut stale: Vec<PaymentRequest> = requests
            .values()
            .filter(|r| r.status == PaymentStatus::Pending && r.created_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|r| r.created_at);
        Ok(stale)
    }
}

#[derive(Default)]
struct LedgerState {
    transactions: HashMap<String, TransactionRecord>,
    goals: HashMap<String, Goal>,
}

/// Transactions and goals share one lock so a commit is observed whole or not at all.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn transaction_count(&self) -> usize {
        self.state.read().await.transactions.len()
    }

    pub async fn transactions(&self) -> Vec<TransactionRecord> {
        let state = self.state.read().await;
        let mut all: Vec<TransactionRecord> = state.transactions.values().cloned().collect();
        all.sort_by_key(|t| t.recorded_at);
        all
    }
}

#[async_trait]
impl LedgerRepository for InMemoryLedger {
    async fn find_transaction(&self, external_tx_id: &str) -> RepositoryResult<Option<TransactionRecord>> {
        let state = self.state.read().await;
        Ok(state.transactions.get(external_tx_id).cloned())
    }

    async fn commit(&self, record: TransactionRecord) -> RepositoryResult<CommitOutcome> {
        let mut state = self.state.write().await;

        if let Some(existing) = state.transactions.get(&record.external_tx_id) {
            return Ok(CommitOutcome::Duplicate(existing.clone()));
        }

        let goal = match &record.goal_id {
            Some(goal_id) => {
                let goal = state
                    .goals
                    .get_mut(goal_id)
                    .ok_or_else(|| RepositoryError::NotFound(format!("goal {}", goal_id)))?;
                goal.current_amount += record.amount;
                goal.updated_at = record.recorded_at;
                Some(goal.clone())
            }
            None => None,
        };

        state
            .transactions
            .insert(record.external_tx_id.clone(), record.clone());

        Ok(CommitOutcome::Recorded { record, goal })
    }

    async fn create_goal(&self, goal: &Goal) -> RepositoryResult<()> {
        let mut state = self.state.write().await;
        if state.goals.contains_key(&goal.goal_id) {
            return Err(RepositoryError::Conflict(goal.goal_id.clone()));
        }
        state.goals.insert(goal.goal_id.clone(), goal.clone());
        Ok(())
    }

    async fn get_goal(&self, goal_id: &str) -> RepositoryResult<Option<Goal>> {
        let state = self.state.read().await;
        Ok(state.goals.get(goal_id).cloned())
    }

    async fn goal_contributions(&self, goal_id: &str) -> RepositoryResult<i64> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .values()
            .filter(|t| t.goal_id.as_deref() == Some(goal_id))
            .map(|t| t.amount)
            .sum())
    }
}
