//! API handlers for the TrustLend backend

mod contract;
mod guarantor;
mod health;
mod loan_request;
mod payment;

pub use contract::*;
pub use guarantor::*;
pub use health::health_check;
pub use loan_request::*;
pub use payment::{payment_webhook, WebhookAck};
