//! Domain entities, free of HTTP and storage concerns.

pub mod callback;
pub mod goal;
pub mod payment_request;
pub mod transaction;

pub use callback::{CallbackEvent, CallbackParseError, CallbackPayload};
pub use goal::{Goal, GoalProgressUpdate};
pub use payment_request::{InvalidTransition, PaymentRequest, PaymentStatus};
pub use transaction::{ReconciliationFlag, TransactionRecord};
