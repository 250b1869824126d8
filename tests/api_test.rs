mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{callback_body, TestApp};
use serde_json::json;
use std::sync::atomic::Ordering;

#[tokio::test]
async fn test_payment_to_goal_end_to_end() {
    let app = TestApp::new();
    app.seed_goal("goal1", "user123", 10_000).await;

    let reference = app.create_payment_request(1000, Some("goal1")).await;
    assert!(reference.starts_with("user123_emergency_fund_"));

    let pushes = app.gateway.pushes.lock().unwrap().clone();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].phone, "254712345678");
    assert_eq!(pushes[0].callback_url, "https://pesa.example.com/mpesa/goals");

    let (status, body) = app
        .send(Method::POST, "/mpesa/goals", Some(callback_body("MPESA12345", &reference, 1000)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "success" }));

    let (status, goal) = app.send(Method::GET, "/goals/goal1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(goal["current_amount"], 1000);
    assert_eq!(goal["contributions"], 1000);
    assert_eq!(goal["completion_ratio"], 0.1);

    let (_, request) = app
        .send(Method::GET, &format!("/payments/requests/{}", reference), None)
        .await;
    assert_eq!(request["status"], "confirmed");

    let (status, record) = app.send(Method::GET, "/transactions/MPESA12345", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["amount"], 1000);
    assert_eq!(record["goal_id"], "goal1");
    assert_eq!(record["reference"], reference.as_str());
}

#[tokio::test]
async fn test_redelivered_callback_is_acknowledged_once() {
    let app = TestApp::new();
    app.seed_goal("goal1", "user123", 10_000).await;
    let reference = app.create_payment_request(1000, Some("goal1")).await;

    for _ in 0..3 {
        let (status, body) = app
            .send(Method::POST, "/mpesa/goals", Some(callback_body("MPESA12345", &reference, 1000)))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
    }

    assert_eq!(app.ledger.inner.transaction_count().await, 1);
    let (_, goal) = app.send(Method::GET, "/goals/goal1", None).await;
    assert_eq!(goal["current_amount"], 1000);
}

#[tokio::test]
async fn test_malformed_callback_is_acknowledged() {
    let app = TestApp::new();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/mpesa/goals")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = app.send_request(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let (status, _) = app
        .send(Method::POST, "/mpesa/goals", Some(json!({ "TransAmount": "1000" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(app.ledger.inner.transaction_count().await, 0);
}

#[tokio::test]
async fn test_store_failure_is_not_acknowledged() {
    let app = TestApp::new();
    let reference = app.create_payment_request(1000, None).await;
    app.ledger.fail_commits.store(true, Ordering::SeqCst);

    let (status, body) = app
        .send(Method::POST, "/mpesa/goals", Some(callback_body("MPESA12345", &reference, 1000)))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "status": "error" }));

    // The network retries; once storage recovers the delivery lands.
    app.ledger.fail_commits.store(false, Ordering::SeqCst);
    let (status, _) = app
        .send(Method::POST, "/mpesa/goals", Some(callback_body("MPESA12345", &reference, 1000)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.ledger.inner.transaction_count().await, 1);
}

#[tokio::test]
async fn test_numeric_callback_fields_are_accepted() {
    let app = TestApp::new();
    app.seed_goal("goal1", "user123", 5000).await;
    let reference = app.create_payment_request(5000, Some("goal1")).await;

    let body = json!({
        "TransactionType": "Pay Bill",
        "TransID": "MPESA777",
        "TransAmount": 5000,
        "BusinessShortCode": 123456,
        "BillRefNumber": reference,
        "MSISDN": 254712345678u64
    });
    let (status, _) = app.send(Method::POST, "/mpesa/goals", Some(body)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, goal) = app.send(Method::GET, "/goals/goal1", None).await;
    assert_eq!(goal["current_amount"], 5000);
    assert_eq!(goal["completion_ratio"], 1.0);
}

#[tokio::test]
async fn test_create_payment_request_validation() {
    let app = TestApp::new();

    let (status, body) = app
        .send(
            Method::POST,
            "/payments/requests",
            Some(json!({
                "phone": "0712345678",
                "amount": 0,
                "purpose": "emergency_fund",
                "user_id": "user123"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("amount"));

    let (status, body) = app
        .send(
            Method::POST,
            "/payments/requests",
            Some(json!({
                "phone": "12345",
                "amount": 100,
                "purpose": "emergency_fund",
                "user_id": "user123"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("phone"));

    let (status, body) = app
        .send(Method::POST, "/payments/requests", Some(json!({ "amount": 100 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    assert!(app.gateway.pushes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_gateway_failure_returns_bad_gateway_with_reference() {
    let app = TestApp::new();
    app.gateway.fail.store(true, Ordering::SeqCst);

    let (status, body) = app
        .send(
            Method::POST,
            "/payments/requests",
            Some(json!({
                "phone": "+254712345678",
                "amount": 100,
                "purpose": "rent",
                "user_id": "user123"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["status"], "error");

    let reference = body["reference"].as_str().unwrap();
    let (_, request) = app
        .send(Method::GET, &format!("/payments/requests/{}", reference), None)
        .await;
    assert_eq!(request["status"], "failed");
}

#[tokio::test]
async fn test_unknown_resources_return_not_found() {
    let app = TestApp::new();

    let (status, _) = app.send(Method::GET, "/payments/requests/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.send(Method::GET, "/goals/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.send(Method::GET, "/transactions/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_goal() {
    let app = TestApp::new();
    let goal = json!({
        "goal_id": "goal9",
        "user_id": "user123",
        "name": "School Fees",
        "target_amount": 45000
    });

    let (status, body) = app.send(Method::POST, "/goals", Some(goal.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["current_amount"], 0);

    let (status, _) = app.send(Method::POST, "/goals", Some(goal)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_goal_update_message() {
    let app = TestApp::new();

    let (status, body) = app
        .send(
            Method::POST,
            "/goals/update",
            Some(json!({
                "source": "mpesa",
                "amount": 1000,
                "goal_name": "Emergency Fund",
                "current": 2500,
                "target": 10000
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert!(body["message"].as_str().unwrap().contains("Ksh 1000"));

    let (status, body) = app
        .send(Method::POST, "/goals/update", Some(json!({ "source": "bank", "amount": 1000 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "error", "message": "Invalid request" }));
}

#[tokio::test]
async fn test_health_reports_store_and_gateway() {
    let app = TestApp::new();

    let (status, body) = app.send(Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "connected");
    assert_eq!(body["payment_gateway"], "closed");
}

#[tokio::test]
async fn test_progress_stream_is_event_stream() {
    let app = TestApp::new();

    let request = Request::builder()
        .method(Method::GET)
        .uri("/goals/progress/stream?user_id=user123")
        .body(Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.router(), request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
}

#[tokio::test]
async fn test_progress_update_published_after_callback() {
    let app = TestApp::new();
    app.seed_goal("goal1", "user123", 4000).await;
    let mut updates = app.state.notifier.subscribe();
    let reference = app.create_payment_request(1000, Some("goal1")).await;

    app.send(Method::POST, "/mpesa/goals", Some(callback_body("MPESA1", &reference, 1000)))
        .await;

    let update = updates.recv().await.unwrap();
    assert_eq!(update.goal_id, "goal1");
    assert_eq!(update.amount_added, 1000);
    assert_eq!(update.completion_ratio, 0.25);
}
