use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::{Goal, GoalProgressUpdate};
use crate::ports::{complete_within, TextCollaborator};

/// Turns goal state into a progress message and publishes it.
pub struct GoalProgressNotifier {
    writer: Arc<dyn TextCollaborator>,
    timeout: Duration,
    updates: broadcast::Sender<GoalProgressUpdate>,
}

impl GoalProgressNotifier {
    pub fn new(
        writer: Arc<dyn TextCollaborator>,
        timeout: Duration,
        updates: broadcast::Sender<GoalProgressUpdate>,
    ) -> Self {
        Self {
            writer,
            timeout,
            updates,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GoalProgressUpdate> {
        self.updates.subscribe()
    }

    /// Message for a contribution of `amount_just_added` to `goal`. Falls back
    /// to a fixed template when the text collaborator does not answer.
    pub async fn notify(&self, goal: &Goal, amount_just_added: i64) -> String {
        // Only numbers go into the prompt; goal names are user-supplied text.
        let prompt = progress_prompt(goal, amount_just_added);
        match complete_within(self.writer.as_ref(), &prompt, self.timeout).await {
            Ok(message) => message,
            Err(e) => {
                warn!(goal_id = %goal.goal_id, error = %e, "Text generator unavailable, using template");
                fallback_message(goal, amount_just_added)
            }
        }
    }

    /// Builds the message and broadcasts the update to any listeners.
    pub async fn publish(&self, goal: &Goal, amount_just_added: i64) -> GoalProgressUpdate {
        let message = self.notify(goal, amount_just_added).await;
        let update = GoalProgressUpdate {
            goal_id: goal.goal_id.clone(),
            user_id: goal.user_id.clone(),
            amount_added: amount_just_added,
            current_amount: goal.current_amount,
            target_amount: goal.target_amount,
            completion_ratio: goal.completion_ratio(),
            message,
        };

        if self.updates.send(update.clone()).is_err() {
            debug!(goal_id = %goal.goal_id, "No progress listeners");
        }
        update
    }
}

fn percent(goal: &Goal) -> u32 {
    (goal.completion_ratio() * 100.0).round() as u32
}

fn progress_prompt(goal: &Goal, amount_just_added: i64) -> String {
    format!(
        "A user deposited Ksh {} toward a savings goal.\n\
         Saved so far: Ksh {} of Ksh {} ({}% complete, Ksh {} remaining).\n\
         Write one short, encouraging Kenyan-style progress message.",
        amount_just_added,
        goal.current_amount,
        goal.target_amount,
        percent(goal),
        goal.remaining()
    )
}

pub fn fallback_message(goal: &Goal, amount_just_added: i64) -> String {
    if goal.is_reached() {
        format!(
            "Hongera! Your Ksh {} deposit completed {} (Ksh {} of Ksh {}).",
            amount_just_added, goal.name, goal.current_amount, goal.target_amount
        )
    } else {
        format!(
            "Great job! Ksh {} added to {}. You're {}% of the way to Ksh {}, only Ksh {} to go.",
            amount_just_added,
            goal.name,
            percent(goal),
            goal.target_amount,
            goal.remaining()
        )
    }
}
