//! Ledger transaction entity.
//! Created once per confirmed external transaction id and never modified.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Marks a record that needs manual reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconciliationFlag {
    /// The callback amount differed from the request; `expected` is what was requested.
    AmountMismatch { expected: i64 },
    /// No tracked pending request matched the callback.
    Orphan,
}

impl ReconciliationFlag {
    pub fn kind(&self) -> &'static str {
        match self {
            ReconciliationFlag::AmountMismatch { .. } => "amount_mismatch",
            ReconciliationFlag::Orphan => "orphan",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub external_tx_id: String,
    pub reference: Option<String>,
    pub amount: i64,
    pub description: String,
    pub category: String,
    pub goal_id: Option<String>,
    pub flag: Option<ReconciliationFlag>,
    pub recorded_at: DateTime<Utc>,
}

impl TransactionRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: Option<String>,
        external_tx_id: String,
        reference: Option<String>,
        amount: i64,
        description: String,
        category: String,
        goal_id: Option<String>,
        flag: Option<ReconciliationFlag>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            external_tx_id,
            reference,
            amount,
            description,
            category,
            goal_id,
            flag,
            recorded_at: Utc::now(),
        }
    }

    pub fn is_orphan(&self) -> bool {
        matches!(self.flag, Some(ReconciliationFlag::Orphan))
    }
}
