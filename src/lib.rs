pub mod adapters;
pub mod ai;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod mpesa;
pub mod ports;
pub mod services;
pub mod startup;
pub mod utils;
pub mod validation;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::config::merchants::MerchantTable;
use crate::ports::{LedgerRepository, PaymentGateway, PaymentRequestRepository, TextCollaborator};
use crate::services::{
    CallbackReconciler, Categorizer, GoalProgressNotifier, PaymentRequestTracker, ReferenceLocks,
};

const PROGRESS_CHANNEL_CAPACITY: usize = 256;

/// External collaborators the services talk to.
pub struct Collaborators {
    pub gateway: Arc<dyn PaymentGateway>,
    pub classifier: Arc<dyn TextCollaborator>,
    pub text_generator: Arc<dyn TextCollaborator>,
    /// Bound on every classifier and text-generator call.
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<PaymentRequestTracker>,
    pub reconciler: Arc<CallbackReconciler>,
    pub ledger: Arc<dyn LedgerRepository>,
    pub notifier: Arc<GoalProgressNotifier>,
}

impl AppState {
    pub fn new(
        requests: Arc<dyn PaymentRequestRepository>,
        ledger: Arc<dyn LedgerRepository>,
        collaborators: Collaborators,
        base_url: String,
    ) -> Self {
        let tracker = Arc::new(PaymentRequestTracker::new(
            requests,
            collaborators.gateway,
            Arc::new(ReferenceLocks::new()),
            base_url,
        ));
        let categorizer = Arc::new(Categorizer::new(
            Arc::new(MerchantTable::kenyan_defaults()),
            collaborators.classifier,
            collaborators.timeout,
        ));
        let (updates, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        let notifier = Arc::new(GoalProgressNotifier::new(
            collaborators.text_generator,
            collaborators.timeout,
            updates,
        ));
        let reconciler = Arc::new(CallbackReconciler::new(
            tracker.clone(),
            ledger.clone(),
            categorizer,
            notifier.clone(),
        ));

        Self {
            tracker,
            reconciler,
            ledger,
            notifier,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/payments/requests", post(handlers::payments::create_payment_request))
        .route("/payments/requests/:reference", get(handlers::payments::get_payment_request))
        .route(
            &format!("{}/:module", mpesa::CALLBACK_PREFIX),
            post(handlers::callback::mpesa_callback),
        )
        .route("/goals", post(handlers::goals::create_goal))
        .route("/goals/update", post(handlers::goals::update_goal_progress))
        .route("/goals/progress/stream", get(handlers::progress::progress_stream))
        .route("/goals/:goal_id", get(handlers::goals::get_goal))
        .route("/transactions/:external_tx_id", get(handlers::transactions::get_transaction))
        .layer(axum::middleware::from_fn(middleware::request_logger_middleware))
        .with_state(state)
}
