use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::domain::PaymentRequest;
use crate::error::AppError;
use crate::services::NewPaymentRequest;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequestBody {
    pub phone: String,
    pub amount: i64,
    pub purpose: String,
    pub user_id: String,
    #[serde(default)]
    pub goal_id: Option<String>,
    #[serde(default)]
    pub budget_category: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
}

impl From<CreatePaymentRequestBody> for NewPaymentRequest {
    fn from(body: CreatePaymentRequestBody) -> Self {
        NewPaymentRequest {
            user_id: body.user_id,
            phone: body.phone,
            amount: body.amount,
            purpose: body.purpose,
            goal_id: body.goal_id.filter(|g| !g.trim().is_empty()),
            budget_category: body.budget_category,
            module: body.module,
        }
    }
}

/// Starts a push payment. Responds as soon as the network has accepted the
/// prompt; the outcome arrives later on the callback route.
pub async fn create_payment_request(
    State(state): State<AppState>,
    payload: Result<Json<CreatePaymentRequestBody>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(body) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    let request = state.tracker.create(body.into()).await?;

    Ok(Json(json!({
        "reference": request.reference,
        "status": request.status,
    })))
}

pub async fn get_payment_request(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<PaymentRequest>, AppError> {
    let request = state.tracker.lookup(&reference).await?;
    Ok(Json(request))
}
