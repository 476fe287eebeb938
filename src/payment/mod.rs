//! Payment gateway integration and reconciliation

pub mod gateway;
pub mod model;
pub mod reconciliation;
pub mod verifier;

pub use gateway::{order_reference, CheckoutOrder, HttpPaymentGateway, PaymentGateway, SimulatedGateway};
pub use model::*;
pub use reconciliation::{ReconciliationEngine, ReconciliationOutcome};
pub use verifier::{AcceptAllVerifier, CallbackVerifier, Sha256CredentialVerifier};
