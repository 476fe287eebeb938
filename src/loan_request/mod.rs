//! Loan request domain module
//!
//! A receiver's loan request and the guarantor request backing it.

mod model;
mod service;

pub use model::*;
pub use service::LoanRequestService;
