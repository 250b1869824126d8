use axum::{
    extract::{Path, State},
    Json,
};

use crate::domain::TransactionRecord;
use crate::error::AppError;
use crate::AppState;

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(external_tx_id): Path<String>,
) -> Result<Json<TransactionRecord>, AppError> {
    state
        .ledger
        .find_transaction(&external_tx_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("transaction {}", external_tx_id)))
}
