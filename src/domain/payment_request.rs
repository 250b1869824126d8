//! Push-payment request entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Failed,
    Expired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "confirmed" => Ok(PaymentStatus::Confirmed),
            "failed" => Ok(PaymentStatus::Failed),
            "expired" => Ok(PaymentStatus::Expired),
            other => Err(format!("unknown payment status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("payment request {reference} cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub reference: String,
    pub from: PaymentStatus,
    pub to: PaymentStatus,
}

/// An outstanding (or settled) push-payment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub reference: String,
    pub user_id: String,
    pub phone: String,
    pub amount: i64,
    pub purpose: String,
    pub goal_id: Option<String>,
    pub budget_category: Option<String>,
    pub callback_path: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reference: String,
        user_id: String,
        phone: String,
        amount: i64,
        purpose: String,
        goal_id: Option<String>,
        budget_category: Option<String>,
        callback_path: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            reference,
            user_id,
            phone,
            amount,
            purpose,
            goal_id,
            budget_category,
            callback_path,
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves a pending request into `next`. Terminal states never change.
    pub fn transition(&mut self, next: PaymentStatus, at: DateTime<Utc>) -> Result<(), InvalidTransition> {
        if self.status.is_terminal() || next == PaymentStatus::Pending {
            return Err(InvalidTransition {
                reference: self.reference.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = at;
        Ok(())
    }

    /// Routing module the callback URL was built for.
    pub fn module(&self) -> &str {
        self.callback_path
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PaymentRequest {
        PaymentRequest::new(
            "user123_emergency_fund_abc".to_string(),
            "user123".to_string(),
            "254712345678".to_string(),
            1000,
            "emergency_fund".to_string(),
            Some("goal1".to_string()),
            None,
            "/mpesa/goals".to_string(),
        )
    }

    #[test]
    fn new_request_is_pending() {
        let req = request();
        assert_eq!(req.status, PaymentStatus::Pending);
        assert_eq!(req.module(), "goals");
    }

    #[test]
    fn pending_moves_to_each_terminal_state() {
        for next in [PaymentStatus::Confirmed, PaymentStatus::Failed, PaymentStatus::Expired] {
            let mut req = request();
            assert!(req.transition(next, Utc::now()).is_ok());
            assert_eq!(req.status, next);
        }
    }

    #[test]
    fn terminal_states_are_final() {
        let mut req = request();
        req.transition(PaymentStatus::Expired, Utc::now()).unwrap();

        let err = req.transition(PaymentStatus::Confirmed, Utc::now()).unwrap_err();
        assert_eq!(err.from, PaymentStatus::Expired);
        assert_eq!(req.status, PaymentStatus::Expired);
    }

    #[test]
    fn cannot_transition_back_to_pending() {
        let mut req = request();
        assert!(req.transition(PaymentStatus::Pending, Utc::now()).is_err());
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Confirmed,
            PaymentStatus::Failed,
            PaymentStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<PaymentStatus>().unwrap(), status);
        }
        assert!("settled".parse::<PaymentStatus>().is_err());
    }
}
