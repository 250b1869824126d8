mod common;

use chrono::Utc;
use common::{callback_body, HangingCollaborator, TestApp};
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pesa_goals::config::merchants::UNCATEGORIZED;
use pesa_goals::domain::{CallbackEvent, PaymentRequest, PaymentStatus, ReconciliationFlag};
use pesa_goals::ports::{LedgerRepository, PaymentRequestRepository};
use pesa_goals::services::expiry::sweep_once;
use pesa_goals::services::{CallbackIssue, Disposition};

fn event(external_tx_id: &str, reference: &str, amount: i64) -> CallbackEvent {
    let body = callback_body(external_tx_id, reference, amount).to_string();
    CallbackEvent::parse("goals", body.as_bytes()).unwrap()
}

async fn assert_goal_matches_ledger(app: &TestApp, goal_id: &str) {
    let goal = app.ledger.get_goal(goal_id).await.unwrap().unwrap();
    let contributions = app.ledger.goal_contributions(goal_id).await.unwrap();
    assert_eq!(goal.current_amount, contributions);
}

#[tokio::test]
async fn test_concurrent_duplicate_deliveries_apply_once() {
    let app = TestApp::new();
    app.seed_goal("goal1", "user123", 10_000).await;
    let reference = app.create_payment_request(1000, Some("goal1")).await;

    let reconciler = app.state.reconciler.clone();
    let deliveries = (0..10).map(|_| {
        let reconciler = reconciler.clone();
        let event = event("MPESA12345", &reference, 1000);
        tokio::spawn(async move { reconciler.reconcile(event).await })
    });
    let reports: Vec<_> = join_all(deliveries)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    let applied = reports
        .iter()
        .filter(|r| r.disposition == Disposition::Applied)
        .count();
    let duplicates = reports
        .iter()
        .filter(|r| r.disposition == Disposition::Duplicate)
        .count();
    assert_eq!(applied, 1);
    assert_eq!(duplicates, 9);

    let goal = app.ledger.get_goal("goal1").await.unwrap().unwrap();
    assert_eq!(goal.current_amount, 1000);
    assert_eq!(app.ledger.inner.transaction_count().await, 1);
    assert!(app.state.tracker.locks().is_empty());
}

#[tokio::test]
async fn test_goal_total_always_matches_ledger() {
    let app = TestApp::new();
    app.seed_goal("goal1", "user123", 20_000).await;

    let mut deliveries = Vec::new();
    for (i, (requested, paid)) in [(1000, 1000), (2000, 1800), (500, 500), (3000, 3000)]
        .into_iter()
        .enumerate()
    {
        let reference = app.create_payment_request(requested, Some("goal1")).await;
        deliveries.push(event(&format!("TX{}", i), &reference, paid));
        // Redelivery of the same transaction.
        deliveries.push(event(&format!("TX{}", i), &reference, paid));
    }
    deliveries.push(event("ORPHAN1", "unknown_reference", 750));

    let reconciler = app.state.reconciler.clone();
    let results = join_all(
        deliveries
            .into_iter()
            .map(|e| {
                let reconciler = reconciler.clone();
                tokio::spawn(async move { reconciler.reconcile(e).await })
            }),
    )
    .await;
    assert!(results.into_iter().all(|r| r.unwrap().is_ok()));

    let goal = app.ledger.get_goal("goal1").await.unwrap().unwrap();
    assert_eq!(goal.current_amount, 1000 + 1800 + 500 + 3000);
    assert_goal_matches_ledger(&app, "goal1").await;
    assert_eq!(app.ledger.inner.transaction_count().await, 5);
}

#[tokio::test]
async fn test_amount_mismatch_is_flagged_and_credited() {
    let app = TestApp::new();
    app.seed_goal("goal1", "user123", 10_000).await;
    let reference = app.create_payment_request(5000, Some("goal1")).await;

    let report = app
        .state
        .reconciler
        .reconcile(event("MPESA4800", &reference, 4800))
        .await
        .unwrap();

    assert_eq!(report.disposition, Disposition::Applied);
    assert!(report.issues.contains(&CallbackIssue::AmountMismatch {
        expected: 5000,
        received: 4800
    }));
    let record = app.ledger.find_transaction("MPESA4800").await.unwrap().unwrap();
    assert_eq!(record.amount, 4800);
    assert_eq!(record.flag, Some(ReconciliationFlag::AmountMismatch { expected: 5000 }));
    assert_eq!(app.ledger.get_goal("goal1").await.unwrap().unwrap().current_amount, 4800);
}

#[tokio::test]
async fn test_orphan_is_recorded_without_goal_change() {
    let app = TestApp::new();
    app.seed_goal("goal1", "user123", 10_000).await;

    let report = app
        .state
        .reconciler
        .reconcile(event("MPESA999", "user123_goal1", 700))
        .await
        .unwrap();

    assert_eq!(report.disposition, Disposition::Orphaned);
    let record = app.ledger.find_transaction("MPESA999").await.unwrap().unwrap();
    assert_eq!(record.user_id, None);
    assert_eq!(record.goal_id, None);
    assert_eq!(record.flag, Some(ReconciliationFlag::Orphan));
    assert_eq!(app.ledger.get_goal("goal1").await.unwrap().unwrap().current_amount, 0);
}

#[tokio::test]
async fn test_late_callback_after_expiry_is_orphan() {
    let app = TestApp::new();
    app.seed_goal("goal1", "user123", 10_000).await;
    let reference = app.create_payment_request(1000, Some("goal1")).await;

    let expired = app
        .state
        .tracker
        .expire_stale(Utc::now() + chrono::Duration::seconds(1), chrono::Duration::zero())
        .await
        .unwrap();
    assert_eq!(expired, 1);

    let report = app
        .state
        .reconciler
        .reconcile(event("MPESA-LATE", &reference, 1000))
        .await
        .unwrap();

    assert_eq!(report.disposition, Disposition::Orphaned);
    assert_eq!(
        app.state.tracker.lookup(&reference).await.unwrap().status,
        PaymentStatus::Expired
    );
    assert_eq!(app.ledger.get_goal("goal1").await.unwrap().unwrap().current_amount, 0);
    assert_goal_matches_ledger(&app, "goal1").await;
}

#[tokio::test]
async fn test_expiry_and_callback_race_settles_once() {
    for round in 0..20 {
        let app = TestApp::new();
        app.seed_goal("goal1", "user123", 10_000).await;

        let mut request = PaymentRequest::new(
            format!("user123_race_{}", round),
            "user123".to_string(),
            "254712345678".to_string(),
            1000,
            "race".to_string(),
            Some("goal1".to_string()),
            None,
            "/mpesa/goals".to_string(),
        );
        request.created_at = Utc::now() - chrono::Duration::hours(1);
        app.requests.insert(&request).await.unwrap();

        let tracker = app.state.tracker.clone();
        let reconciler = app.state.reconciler.clone();
        let callback = event(&format!("TX-RACE-{}", round), &request.reference, 1000);

        let (swept, report) = tokio::join!(
            tokio::spawn(async move { sweep_once(&tracker, chrono::Duration::minutes(15)).await }),
            tokio::spawn(async move { reconciler.reconcile(callback).await }),
        );
        let swept = swept.unwrap().unwrap();
        let report = report.unwrap().unwrap();

        let status = app.state.tracker.lookup(&request.reference).await.unwrap().status;
        let goal = app.ledger.get_goal("goal1").await.unwrap().unwrap();
        match status {
            PaymentStatus::Confirmed => {
                assert_eq!(swept, 0);
                assert_eq!(report.disposition, Disposition::Applied);
                assert_eq!(goal.current_amount, 1000);
            }
            PaymentStatus::Expired => {
                assert_eq!(swept, 1);
                assert_eq!(report.disposition, Disposition::Orphaned);
                assert_eq!(goal.current_amount, 0);
            }
            other => panic!("unexpected status {:?}", other),
        }
        assert_goal_matches_ledger(&app, "goal1").await;
    }
}

#[tokio::test]
async fn test_categorization_timeout_does_not_block_commit() {
    let app = TestApp::with_classifier(Arc::new(HangingCollaborator));
    app.seed_goal("goal1", "user123", 10_000).await;

    let started = Instant::now();
    let report = app
        .state
        .reconciler
        .reconcile(event("MPESA-KIOSK", "Unknown Kiosk 123", 300))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.disposition, Disposition::Orphaned);
    let record = app.ledger.find_transaction("MPESA-KIOSK").await.unwrap().unwrap();
    assert_eq!(record.category, UNCATEGORIZED);
}

#[tokio::test]
async fn test_failed_payment_result_marks_request_failed() {
    let app = TestApp::new();
    app.seed_goal("goal1", "user123", 10_000).await;
    let reference = app.create_payment_request(1000, Some("goal1")).await;

    let body = serde_json::json!({
        "TransactionType": "Pay Bill",
        "BillRefNumber": reference,
        "ResultCode": 1032,
        "ResultDesc": "Request cancelled by user"
    });
    let failed = CallbackEvent::parse("goals", body.to_string().as_bytes()).unwrap();
    let report = app.state.reconciler.reconcile(failed).await.unwrap();

    assert_eq!(report.disposition, Disposition::PaymentFailed);
    assert_eq!(
        app.state.tracker.lookup(&reference).await.unwrap().status,
        PaymentStatus::Failed
    );
    assert_eq!(app.ledger.inner.transaction_count().await, 0);
    assert_eq!(app.ledger.get_goal("goal1").await.unwrap().unwrap().current_amount, 0);
}
