use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::Goal;
use crate::error::AppError;
use crate::validation::{sanitize_string, validate_identifier, validate_max_len, validate_required};
use crate::AppState;

const GOAL_NAME_MAX_LEN: usize = 100;

#[derive(Debug, Deserialize)]
pub struct CreateGoalBody {
    pub goal_id: String,
    pub user_id: String,
    pub name: String,
    pub target_amount: i64,
}

#[derive(Debug, Serialize)]
pub struct GoalView {
    #[serde(flatten)]
    pub goal: Goal,
    pub completion_ratio: f64,
    /// Sum of ledger records linked to this goal.
    pub contributions: i64,
}

pub async fn create_goal(
    State(state): State<AppState>,
    payload: Result<Json<CreateGoalBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Goal>), AppError> {
    let Json(body) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    validate_identifier("goal_id", &body.goal_id)?;
    validate_identifier("user_id", &body.user_id)?;
    let name = sanitize_string(&body.name);
    validate_required("name", &name)?;
    validate_max_len("name", &name, GOAL_NAME_MAX_LEN)?;
    if body.target_amount < 0 {
        return Err(AppError::Validation("target_amount: must not be negative".to_string()));
    }

    let goal = Goal::new(body.goal_id, body.user_id, name, body.target_amount);
    state.ledger.create_goal(&goal).await?;
    tracing::info!(goal_id = %goal.goal_id, user_id = %goal.user_id, target = goal.target_amount, "Goal created");

    Ok((StatusCode::CREATED, Json(goal)))
}

pub async fn get_goal(
    State(state): State<AppState>,
    Path(goal_id): Path<String>,
) -> Result<Json<GoalView>, AppError> {
    let goal = state
        .ledger
        .get_goal(&goal_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("goal {}", goal_id)))?;
    let contributions = state.ledger.goal_contributions(&goal_id).await?;

    Ok(Json(GoalView {
        completion_ratio: goal.completion_ratio(),
        goal,
        contributions,
    }))
}

#[derive(Debug, Deserialize)]
pub struct GoalUpdateBody {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub goal_name: Option<String>,
    #[serde(default)]
    pub current: i64,
    #[serde(default)]
    pub target: i64,
}

/// Stateless progress message for a contribution reported by the caller.
pub async fn update_goal_progress(
    State(state): State<AppState>,
    payload: Result<Json<GoalUpdateBody>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let body = match payload {
        Ok(Json(body)) if body.source.as_deref() == Some("mpesa") => body,
        _ => return invalid_request(),
    };
    if body.amount < 0 || body.current < 0 || body.target < 0 {
        return invalid_request();
    }

    let goal_name = body
        .goal_name
        .map(|n| sanitize_string(&n))
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "Unknown Goal".to_string());
    let goal = Goal {
        current_amount: body.current,
        ..Goal::new(String::new(), String::new(), goal_name, body.target)
    };

    let message = state.notifier.notify(&goal, body.amount).await;
    (StatusCode::OK, Json(json!({ "status": "success", "message": message })))
}

/// Rejections on this route keep a 200 status; callers read `status`.
fn invalid_request() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({ "status": "error", "message": "Invalid request" })),
    )
}
