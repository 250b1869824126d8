use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, info, warn};

use crate::domain::CallbackEvent;
use crate::utils::sanitize::sanitize_json;
use crate::AppState;

/// Payment network confirmation endpoint.
///
/// The network retries anything that is not a success acknowledgement, so
/// every outcome except a failed ledger write is acknowledged, malformed
/// bodies included.
pub async fn mpesa_callback(
    State(state): State<AppState>,
    Path(module): Path<String>,
    body: Bytes,
) -> Response {
    let event = match CallbackEvent::parse(&module, &body) {
        Ok(event) => event,
        Err(e) => {
            warn!(
                module = %module,
                error = %e,
                payload = %loggable(&body),
                "Malformed callback acknowledged without processing"
            );
            return acknowledge();
        }
    };

    let external_tx_id = event.external_tx_id.clone();
    match state.reconciler.reconcile(event).await {
        Ok(report) => {
            info!(
                module = %module,
                external_tx_id = %external_tx_id,
                disposition = ?report.disposition,
                issues = report.issues.len(),
                "Callback processed"
            );
            acknowledge()
        }
        Err(e) => {
            error!(module = %module, external_tx_id = %external_tx_id, error = %e, "Callback could not be recorded");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error" })),
            )
                .into_response()
        }
    }
}

fn acknowledge() -> Response {
    (StatusCode::OK, Json(json!({ "status": "success" }))).into_response()
}

fn loggable(body: &[u8]) -> String {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => sanitize_json(&value).to_string(),
        Err(_) => format!("[non-json, {} bytes]", body.len()),
    }
}
