pub mod callback;
pub mod goals;
pub mod payments;
pub mod progress;
pub mod transactions;

use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub store: String,
    pub payment_gateway: String,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store = match state.ledger.ping().await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "Ledger store health check failed");
            "disconnected"
        }
    };

    let health_response = HealthStatus {
        status: if store == "connected" {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: store.to_string(),
        payment_gateway: state.tracker.gateway_state(),
    };

    let status_code = if store == "connected" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health_response))
}
