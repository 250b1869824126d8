//! Postgres implementation of the storage ports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{Goal, PaymentRequest, PaymentStatus, ReconciliationFlag, TransactionRecord};
use crate::ports::{
    CommitOutcome, LedgerRepository, PaymentRequestRepository, RepositoryError, RepositoryResult,
};

const PAYMENT_REQUEST_COLUMNS: &str = "reference, user_id, phone, amount, purpose, goal_id, \
     budget_category, callback_path, status, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, user_id, external_tx_id, reference, amount, description, \
     category, goal_id, flag, expected_amount, recorded_at";

const GOAL_COLUMNS: &str = "goal_id, user_id, name, target_amount, current_amount, updated_at";

/// Postgres-backed payment request and ledger store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PaymentRequestRepository for PostgresStore {
    async fn insert(&self, request: &PaymentRequest) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_requests (
                reference, user_id, phone, amount, purpose, goal_id,
                budget_category, callback_path, status, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&request.reference)
        .bind(&request.user_id)
        .bind(&request.phone)
        .bind(request.amount)
        .bind(&request.purpose)
        .bind(&request.goal_id)
        .bind(&request.budget_category)
        .bind(&request.callback_path)
        .bind(request.status.as_str())
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(())
    }

    async fn get(&self, reference: &str) -> RepositoryResult<Option<PaymentRequest>> {
        let row = sqlx::query_as::<_, PaymentRequestRow>(&format!(
            "SELECT {} FROM payment_requests WHERE reference = $1",
            PAYMENT_REQUEST_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        row.map(PaymentRequestRow::into_domain).transpose()
    }

    async fn transition(
        &self,
        reference: &str,
        from: PaymentStatus,
        to: PaymentStatus,
        at: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        if from.is_terminal() || to == PaymentStatus::Pending {
            return Ok(false);
        }

        let result = sqlx::query(
            "UPDATE payment_requests SET status = $1, updated_at = $2 \
             WHERE reference = $3 AND status = $4",
        )
        .bind(to.as_str())
        .bind(at)
        .bind(reference)
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(result.rows_affected() == 1)
    }

    async fn pending_created_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<Vec<PaymentRequest>> {
        let rows = sqlx::query_as::<_, PaymentRequestRow>(&format!(
            "SELECT {} FROM payment_requests \
             WHERE status = 'pending' AND created_at < $1 ORDER BY created_at ASC",
            PAYMENT_REQUEST_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        rows.into_iter().map(PaymentRequestRow::into_domain).collect()
    }
}

#[async_trait]
impl LedgerRepository for PostgresStore {
    async fn find_transaction(&self, external_tx_id: &str) -> RepositoryResult<Option<TransactionRecord>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM ledger_transactions WHERE external_tx_id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(external_tx_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn commit(&self, record: TransactionRecord) -> RepositoryResult<CommitOutcome> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let (flag, expected_amount) = match &record.flag {
            Some(ReconciliationFlag::AmountMismatch { expected }) => {
                (Some("amount_mismatch"), Some(*expected))
            }
            Some(ReconciliationFlag::Orphan) => (Some("orphan"), None),
            None => (None, None),
        };

        // ON CONFLICT keeps the unique external id as the final dedup guard.
        let inserted = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO ledger_transactions (
                id, user_id, external_tx_id, reference, amount, description,
                category, goal_id, flag, expected_amount, recorded_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (external_tx_id) DO NOTHING
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(record.id)
        .bind(&record.user_id)
        .bind(&record.external_tx_id)
        .bind(&record.reference)
        .bind(record.amount)
        .bind(&record.description)
        .bind(&record.category)
        .bind(&record.goal_id)
        .bind(flag)
        .bind(expected_amount)
        .bind(record.recorded_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(RepositoryError::from)?;

        let Some(row) = inserted else {
            tx.rollback().await.map_err(RepositoryError::from)?;
            let existing = self
                .find_transaction(&record.external_tx_id)
                .await?
                .ok_or_else(|| RepositoryError::NotFound(record.external_tx_id.clone()))?;
            return Ok(CommitOutcome::Duplicate(existing));
        };

        let goal = match &record.goal_id {
            Some(goal_id) => {
                let updated = sqlx::query_as::<_, GoalRow>(&format!(
                    "UPDATE goals SET current_amount = current_amount + $1, updated_at = $2 \
                     WHERE goal_id = $3 RETURNING {}",
                    GOAL_COLUMNS
                ))
                .bind(record.amount)
                .bind(record.recorded_at)
                .bind(goal_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(RepositoryError::from)?;

                match updated {
                    Some(goal) => Some(goal.into_domain()),
                    None => {
                        tx.rollback().await.map_err(RepositoryError::from)?;
                        return Err(RepositoryError::NotFound(format!("goal {}", goal_id)));
                    }
                }
            }
            None => None,
        };

        tx.commit().await.map_err(RepositoryError::from)?;

        Ok(CommitOutcome::Recorded {
            record: row.into_domain()?,
            goal,
        })
    }

    async fn create_goal(&self, goal: &Goal) -> RepositoryResult<()> {
        sqlx::query(
            "INSERT INTO goals (goal_id, user_id, name, target_amount, current_amount, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&goal.goal_id)
        .bind(&goal.user_id)
        .bind(&goal.name)
        .bind(goal.target_amount)
        .bind(goal.current_amount)
        .bind(goal.updated_at)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(())
    }

    async fn get_goal(&self, goal_id: &str) -> RepositoryResult<Option<Goal>> {
        let row = sqlx::query_as::<_, GoalRow>(&format!(
            "SELECT {} FROM goals WHERE goal_id = $1",
            GOAL_COLUMNS
        ))
        .bind(goal_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(row.map(GoalRow::into_domain))
    }

    async fn goal_contributions(&self, goal_id: &str) -> RepositoryResult<i64> {
        let total: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(amount)::BIGINT FROM ledger_transactions WHERE goal_id = $1",
        )
        .bind(goal_id)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(total.unwrap_or(0))
    }

    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(())
    }
}

/// Internal row types for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct PaymentRequestRow {
    reference: String,
    user_id: String,
    phone: String,
    amount: i64,
    purpose: String,
    goal_id: Option<String>,
    budget_category: Option<String>,
    callback_path: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PaymentRequestRow {
    fn into_domain(self) -> RepositoryResult<PaymentRequest> {
        let status = self
            .status
            .parse::<PaymentStatus>()
            .map_err(RepositoryError::Storage)?;

        Ok(PaymentRequest {
            reference: self.reference,
            user_id: self.user_id,
            phone: self.phone,
            amount: self.amount,
            purpose: self.purpose,
            goal_id: self.goal_id,
            budget_category: self.budget_category,
            callback_path: self.callback_path,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    user_id: Option<String>,
    external_tx_id: String,
    reference: Option<String>,
    amount: i64,
    description: String,
    category: String,
    goal_id: Option<String>,
    flag: Option<String>,
    expected_amount: Option<i64>,
    recorded_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<TransactionRecord> {
        let flag = match (self.flag.as_deref(), self.expected_amount) {
            (None, _) => None,
            (Some("orphan"), _) => Some(ReconciliationFlag::Orphan),
            (Some("amount_mismatch"), Some(expected)) => {
                Some(ReconciliationFlag::AmountMismatch { expected })
            }
            (Some(other), _) => {
                return Err(RepositoryError::Storage(format!(
                    "unknown reconciliation flag '{}' on {}",
                    other, self.external_tx_id
                )))
            }
        };

        Ok(TransactionRecord {
            id: self.id,
            user_id: self.user_id,
            external_tx_id: self.external_tx_id,
            reference: self.reference,
            amount: self.amount,
            description: self.description,
            category: self.category,
            goal_id: self.goal_id,
            flag,
            recorded_at: self.recorded_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct GoalRow {
    goal_id: String,
    user_id: String,
    name: String,
    target_amount: i64,
    current_amount: i64,
    updated_at: DateTime<Utc>,
}

impl GoalRow {
    fn into_domain(self) -> Goal {
        Goal {
            goal_id: self.goal_id,
            user_id: self.user_id,
            name: self.name,
            target_amount: self.target_amount,
            current_amount: self.current_amount,
            updated_at: self.updated_at,
        }
    }
}
