//! TrustLend Backend Library
//!
//! Peer-to-peer lending core: eligibility, loan and guarantor requests, the
//! contract state machine, EMI schedules and payment reconciliation.

pub mod config;
pub mod contract;
pub mod error;
pub mod handlers;
pub mod loan_request;
pub mod middleware;
pub mod models;
pub mod payment;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
