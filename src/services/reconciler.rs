//! Callback reconciliation.
//!
//! Each payment-network callback is applied at most once:
//!
//! 1. failed results settle the matching pending request as `Failed` and
//!    never touch the ledger;
//! 2. a known `external_tx_id` is a redelivery and is acknowledged without
//!    touching the ledger; if the earlier delivery committed but never
//!    confirmed its request, the redelivery confirms it;
//! 3. otherwise, under the reference lock, the callback is matched to a
//!    pending request (or recorded as an orphan), categorized, committed to
//!    the ledger together with the goal increment, the request is confirmed
//!    and goal progress is published.
//!
//! Only storage failures escape as errors; everything else degrades into a
//! [`ReconcileReport`] carrying the [`CallbackIssue`]s that were seen.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{
    CallbackEvent, Goal, GoalProgressUpdate, PaymentRequest, PaymentStatus, ReconciliationFlag,
    TransactionRecord,
};
use crate::ports::{CommitOutcome, LedgerRepository, RepositoryError};
use crate::services::categorizer::Categorizer;
use crate::services::notifier::GoalProgressNotifier;
use crate::services::tracker::PaymentRequestTracker;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("ledger store failure: {0}")]
    StoreWrite(#[from] RepositoryError),
}

/// Non-fatal conditions noticed while reconciling a callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackIssue {
    #[error("no pending payment request for reference {0:?}")]
    UnmatchedReference(Option<String>),
    #[error("transaction {0} was already recorded")]
    DuplicateDelivery(String),
    #[error("callback amount {received} differs from requested amount {expected}")]
    AmountMismatch { expected: i64, received: i64 },
    #[error("goal {0} is missing or owned by another user")]
    GoalUnavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Recorded and linked to its payment request.
    Applied,
    /// Recorded without a payment request.
    Orphaned,
    /// Redelivery of an already recorded transaction.
    Duplicate,
    /// The payer did not complete the payment.
    PaymentFailed,
    /// Nothing to do (failed result for an unknown or settled request).
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileReport {
    pub disposition: Disposition,
    pub record: Option<TransactionRecord>,
    pub request: Option<PaymentRequest>,
    pub goal: Option<Goal>,
    pub progress: Option<GoalProgressUpdate>,
    pub issues: Vec<CallbackIssue>,
}

impl ReconcileReport {
    fn new(disposition: Disposition) -> Self {
        Self {
            disposition,
            record: None,
            request: None,
            goal: None,
            progress: None,
            issues: Vec::new(),
        }
    }

    fn duplicate(existing: TransactionRecord) -> Self {
        Self {
            issues: vec![CallbackIssue::DuplicateDelivery(existing.external_tx_id.clone())],
            record: Some(existing),
            ..Self::new(Disposition::Duplicate)
        }
    }
}

pub struct CallbackReconciler {
    tracker: Arc<PaymentRequestTracker>,
    ledger: Arc<dyn LedgerRepository>,
    categorizer: Arc<Categorizer>,
    notifier: Arc<GoalProgressNotifier>,
}

impl CallbackReconciler {
    pub fn new(
        tracker: Arc<PaymentRequestTracker>,
        ledger: Arc<dyn LedgerRepository>,
        categorizer: Arc<Categorizer>,
        notifier: Arc<GoalProgressNotifier>,
    ) -> Self {
        Self {
            tracker,
            ledger,
            categorizer,
            notifier,
        }
    }

    pub async fn reconcile(&self, event: CallbackEvent) -> Result<ReconcileReport, ReconcileError> {
        if !event.is_success() {
            return self.reconcile_failure(&event).await;
        }

        let Some(amount) = event.amount else {
            warn!(external_tx_id = %event.external_tx_id, "Successful callback without amount ignored");
            return Ok(ReconcileReport::new(Disposition::Ignored));
        };

        if let Some(existing) = self.ledger.find_transaction(&event.external_tx_id).await? {
            if !self.awaits_confirmation(&existing).await? {
                info!(external_tx_id = %event.external_tx_id, "Duplicate callback delivery ignored");
                return Ok(ReconcileReport::duplicate(existing));
            }
        }

        let lock_key = event
            .account_reference
            .clone()
            .unwrap_or_else(|| format!("tx:{}", event.external_tx_id));
        let _guard = self.tracker.locks().acquire(&lock_key).await;

        // A racing delivery may have committed while we waited for the lock.
        if let Some(existing) = self.ledger.find_transaction(&event.external_tx_id).await? {
            self.confirm_redelivered(&existing, event.account_reference.as_deref())
                .await?;
            info!(external_tx_id = %event.external_tx_id, "Duplicate callback delivery ignored");
            return Ok(ReconcileReport::duplicate(existing));
        }

        let request = match &event.account_reference {
            Some(reference) => self.tracker.find(reference).await?,
            None => None,
        };

        match request {
            Some(request) if request.status == PaymentStatus::Pending => {
                self.apply_matched(&event, amount, request).await
            }
            other => {
                if let Some(request) = &other {
                    warn!(
                        reference = %request.reference,
                        status = %request.status,
                        external_tx_id = %event.external_tx_id,
                        "Callback for settled payment request, recording as orphan"
                    );
                }
                self.apply_orphan(&event, amount).await
            }
        }
    }

    /// True when `existing` was applied to a request that is still pending,
    /// i.e. an earlier delivery committed but did not get to confirm it.
    async fn awaits_confirmation(&self, existing: &TransactionRecord) -> Result<bool, ReconcileError> {
        let Some(reference) = applied_reference(existing) else {
            return Ok(false);
        };
        Ok(self
            .tracker
            .find(reference)
            .await?
            .map_or(false, |request| request.status == PaymentStatus::Pending))
    }

    /// Finishes the confirmation of an already committed transaction. The
    /// caller holds the lock for `locked_reference`.
    async fn confirm_redelivered(
        &self,
        existing: &TransactionRecord,
        locked_reference: Option<&str>,
    ) -> Result<(), ReconcileError> {
        let Some(reference) = applied_reference(existing) else {
            return Ok(());
        };
        if Some(reference) != locked_reference {
            return Ok(());
        }

        if self.tracker.settle(reference, PaymentStatus::Confirmed).await? {
            warn!(
                reference = %reference,
                external_tx_id = %existing.external_tx_id,
                "Payment request confirmed on redelivery"
            );
        }
        Ok(())
    }

    async fn apply_matched(
        &self,
        event: &CallbackEvent,
        amount: i64,
        request: PaymentRequest,
    ) -> Result<ReconcileReport, ReconcileError> {
        let mut issues = Vec::new();

        if request.module() != event.module {
            warn!(
                reference = %request.reference,
                expected_module = %request.module(),
                module = %event.module,
                "Callback arrived on a different module route"
            );
        }

        let flag = if amount != request.amount {
            warn!(
                reference = %request.reference,
                expected = request.amount,
                received = amount,
                "Callback amount mismatch, flagged for manual reconciliation"
            );
            issues.push(CallbackIssue::AmountMismatch {
                expected: request.amount,
                received: amount,
            });
            Some(ReconciliationFlag::AmountMismatch {
                expected: request.amount,
            })
        } else {
            None
        };

        let goal_id = match &request.goal_id {
            Some(goal_id) => match self.ledger.get_goal(goal_id).await? {
                Some(goal) if goal.user_id == request.user_id => Some(goal_id.clone()),
                _ => {
                    warn!(reference = %request.reference, goal_id = %goal_id, "Goal unavailable, recording unlinked");
                    issues.push(CallbackIssue::GoalUnavailable(goal_id.clone()));
                    None
                }
            },
            None => None,
        };

        let category = match &request.budget_category {
            Some(category) => category.clone(),
            None => {
                self.categorizer
                    .categorize(
                        &request.purpose,
                        amount,
                        self.categorizer.merchants().categories(),
                    )
                    .await
            }
        };

        let record = TransactionRecord::new(
            Some(request.user_id.clone()),
            event.external_tx_id.clone(),
            Some(request.reference.clone()),
            amount,
            request.purpose.clone(),
            category,
            goal_id,
            flag,
        );

        let (record, goal) = match self.ledger.commit(record).await? {
            CommitOutcome::Recorded { record, goal } => (record, goal),
            CommitOutcome::Duplicate(existing) => return Ok(ReconcileReport::duplicate(existing)),
        };

        if !self
            .tracker
            .settle(&request.reference, PaymentStatus::Confirmed)
            .await?
        {
            warn!(reference = %request.reference, "Payment request was no longer pending at confirmation");
        }

        info!(
            reference = %request.reference,
            external_tx_id = %record.external_tx_id,
            amount,
            category = %record.category,
            goal_id = ?record.goal_id,
            "Callback applied"
        );

        let progress = match &goal {
            Some(goal) => Some(self.notifier.publish(goal, amount).await),
            None => None,
        };

        let settled = self.tracker.find(&request.reference).await?;

        Ok(ReconcileReport {
            disposition: Disposition::Applied,
            record: Some(record),
            request: Some(settled.unwrap_or(request)),
            goal,
            progress,
            issues,
        })
    }

    async fn apply_orphan(&self, event: &CallbackEvent, amount: i64) -> Result<ReconcileReport, ReconcileError> {
        let description = event.description();
        let category = self
            .categorizer
            .categorize(&description, amount, self.categorizer.merchants().categories())
            .await;

        let record = TransactionRecord::new(
            None,
            event.external_tx_id.clone(),
            event.account_reference.clone(),
            amount,
            description,
            category,
            None,
            Some(ReconciliationFlag::Orphan),
        );

        let record = match self.ledger.commit(record).await? {
            CommitOutcome::Recorded { record, .. } => record,
            CommitOutcome::Duplicate(existing) => return Ok(ReconcileReport::duplicate(existing)),
        };

        warn!(
            external_tx_id = %record.external_tx_id,
            account_reference = ?event.account_reference,
            amount,
            "Unmatched callback recorded as orphan"
        );

        Ok(ReconcileReport {
            issues: vec![CallbackIssue::UnmatchedReference(event.account_reference.clone())],
            record: Some(record),
            ..ReconcileReport::new(Disposition::Orphaned)
        })
    }

    async fn reconcile_failure(&self, event: &CallbackEvent) -> Result<ReconcileReport, ReconcileError> {
        let Some(reference) = &event.account_reference else {
            warn!(result_code = event.result_code, "Failed callback without reference ignored");
            return Ok(ReconcileReport {
                issues: vec![CallbackIssue::UnmatchedReference(None)],
                ..ReconcileReport::new(Disposition::Ignored)
            });
        };

        let _guard = self.tracker.locks().acquire(reference).await;

        if self.tracker.settle(reference, PaymentStatus::Failed).await? {
            info!(
                reference = %reference,
                result_code = event.result_code,
                result_desc = ?event.result_desc,
                "Payment request failed"
            );
            return Ok(ReconcileReport {
                request: self.tracker.find(reference).await?,
                ..ReconcileReport::new(Disposition::PaymentFailed)
            });
        }

        warn!(reference = %reference, result_code = event.result_code, "Failed callback matched no pending request");
        Ok(ReconcileReport {
            issues: vec![CallbackIssue::UnmatchedReference(Some(reference.clone()))],
            ..ReconcileReport::new(Disposition::Ignored)
        })
    }
}

/// Reference of the request a non-orphan record was credited against.
fn applied_reference(record: &TransactionRecord) -> Option<&str> {
    if record.is_orphan() {
        return None;
    }
    record.reference.as_deref()
}
