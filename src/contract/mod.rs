//! Contract domain module
//!
//! Contains the contract state machine, EMI schedule generation and the
//! contract service.

mod model;
pub mod schedule;
mod service;

pub use model::*;
pub use schedule::{EmiInstallment, EmiStatus, EmiView, ScheduleTerms, ScheduleView};
pub use service::{delinquency_sweeper, ContractService};
