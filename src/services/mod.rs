pub mod categorizer;
pub mod expiry;
pub mod locks;
pub mod notifier;
pub mod reconciler;
pub mod tracker;

pub use categorizer::Categorizer;
pub use expiry::run_expiry_sweeper;
pub use locks::ReferenceLocks;
pub use notifier::GoalProgressNotifier;
pub use reconciler::{CallbackIssue, CallbackReconciler, Disposition, ReconcileError, ReconcileReport};
pub use tracker::{NewPaymentRequest, PaymentRequestTracker, TrackerError};
