//! Best-effort transaction categorization.
//!
//! Merchant keywords are tried first; the classification collaborator is only
//! asked when no keyword matches. Every failure path ends in
//! [`UNCATEGORIZED`], so categorization can never hold up a ledger commit.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::merchants::{MerchantTable, UNCATEGORIZED};
use crate::ports::{complete_within, TextCollaborator};

pub struct Categorizer {
    merchants: Arc<MerchantTable>,
    classifier: Arc<dyn TextCollaborator>,
    timeout: Duration,
}

impl Categorizer {
    pub fn new(merchants: Arc<MerchantTable>, classifier: Arc<dyn TextCollaborator>, timeout: Duration) -> Self {
        Self {
            merchants,
            classifier,
            timeout,
        }
    }

    pub fn merchants(&self) -> &MerchantTable {
        &self.merchants
    }

    pub async fn categorize(&self, description: &str, amount: i64, candidate_categories: &[String]) -> String {
        if let Some(category) = self.merchants.lookup(description) {
            debug!(description, category, "Matched merchant keyword");
            return category.to_string();
        }

        if candidate_categories.is_empty() {
            return UNCATEGORIZED.to_string();
        }

        let prompt = classification_prompt(description, amount, candidate_categories);
        match complete_within(self.classifier.as_ref(), &prompt, self.timeout).await {
            Ok(answer) => match pick_candidate(&answer, candidate_categories) {
                Some(category) => category,
                None => {
                    warn!(description, answer = %answer, "Classifier answered outside the candidate list");
                    UNCATEGORIZED.to_string()
                }
            },
            Err(e) => {
                warn!(description, error = %e, "Classifier unavailable, leaving transaction uncategorized");
                UNCATEGORIZED.to_string()
            }
        }
    }
}

fn classification_prompt(description: &str, amount: i64, candidates: &[String]) -> String {
    format!(
        "Categorize this M-Pesa transaction for a Kenyan user.\n\
         Description: {}\n\
         Amount: Ksh {}\n\
         Possible categories: {}\n\
         Answer with exactly one category from the list.",
        description,
        amount,
        candidates.join(", ")
    )
}

/// Accepts the answer only when it names one of the candidates.
fn pick_candidate(answer: &str, candidates: &[String]) -> Option<String> {
    let answer = answer
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.')
        .to_lowercase();
    candidates
        .iter()
        .find(|candidate| candidate.to_lowercase() == answer)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::CollaboratorError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedAnswer(&'static str, AtomicUsize);

    #[async_trait]
    impl TextCollaborator for FixedAnswer {
        async fn complete(&self, _prompt: &str) -> Result<String, CollaboratorError> {
            self.1.fetch_add(1, Ordering::SeqCst);
            Ok(self.0.to_string())
        }
    }

    struct Hanging;

    #[async_trait]
    impl TextCollaborator for Hanging {
        async fn complete(&self, _prompt: &str) -> Result<String, CollaboratorError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("Groceries".to_string())
        }
    }

    struct Broken;

    #[async_trait]
    impl TextCollaborator for Broken {
        async fn complete(&self, _prompt: &str) -> Result<String, CollaboratorError> {
            Err(CollaboratorError::Failed("HTTP 500".to_string()))
        }
    }

    fn categorizer(classifier: Arc<dyn TextCollaborator>) -> Categorizer {
        Categorizer::new(
            Arc::new(MerchantTable::kenyan_defaults()),
            classifier,
            Duration::from_millis(50),
        )
    }

    fn candidates() -> Vec<String> {
        MerchantTable::kenyan_defaults().categories().to_vec()
    }

    #[tokio::test]
    async fn test_merchant_match_skips_classifier() {
        let classifier = Arc::new(FixedAnswer("Entertainment", AtomicUsize::new(0)));
        let cat = categorizer(classifier.clone());

        let category = cat.categorize("Payment to Naivas", 2500, &candidates()).await;

        assert_eq!(category, "Groceries");
        assert_eq!(classifier.1.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_classifier_answer_used_when_in_candidates() {
        let cat = categorizer(Arc::new(FixedAnswer(" transport. ", AtomicUsize::new(0))));
        assert_eq!(cat.categorize("Matatu fare", 100, &candidates()).await, "Transport");
    }

    #[tokio::test]
    async fn test_classifier_answer_outside_candidates_is_uncategorized() {
        let cat = categorizer(Arc::new(FixedAnswer("Gambling", AtomicUsize::new(0))));
        assert_eq!(cat.categorize("Matatu fare", 100, &candidates()).await, UNCATEGORIZED);
    }

    #[tokio::test]
    async fn test_timeout_falls_back_to_uncategorized() {
        let cat = categorizer(Arc::new(Hanging));
        assert_eq!(
            cat.categorize("Unknown Kiosk 123", 300, &candidates()).await,
            UNCATEGORIZED
        );
    }

    #[tokio::test]
    async fn test_classifier_error_falls_back_to_uncategorized() {
        let cat = categorizer(Arc::new(Broken));
        assert_eq!(
            cat.categorize("Unknown Kiosk 123", 300, &candidates()).await,
            UNCATEGORIZED
        );
    }

    #[test]
    fn test_prompt_lists_candidates() {
        let prompt = classification_prompt("KPLC Tokens", 1000, &candidates());
        assert!(prompt.contains("Ksh 1000"));
        assert!(prompt.contains("Groceries, Utilities"));
    }
}
