use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named savings target with a running contributed total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub goal_id: String,
    pub user_id: String,
    pub name: String,
    pub target_amount: i64,
    pub current_amount: i64,
    pub updated_at: DateTime<Utc>,
}

impl Goal {
    pub fn new(goal_id: String, user_id: String, name: String, target_amount: i64) -> Self {
        Self {
            goal_id,
            user_id,
            name,
            target_amount,
            current_amount: 0,
            updated_at: Utc::now(),
        }
    }

    /// Completion ratio clamped to `[0, 1]`. A zero target counts as complete
    /// once anything has been contributed.
    pub fn completion_ratio(&self) -> f64 {
        if self.target_amount <= 0 {
            return if self.current_amount > 0 { 1.0 } else { 0.0 };
        }
        (self.current_amount as f64 / self.target_amount as f64).clamp(0.0, 1.0)
    }

    pub fn remaining(&self) -> i64 {
        (self.target_amount - self.current_amount).max(0)
    }

    pub fn is_reached(&self) -> bool {
        self.target_amount > 0 && self.current_amount >= self.target_amount
    }
}

/// Published after a contribution lands on a goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalProgressUpdate {
    pub goal_id: String,
    pub user_id: String,
    pub amount_added: i64,
    pub current_amount: i64,
    pub target_amount: i64,
    pub completion_ratio: f64,
    pub message: String,
}
