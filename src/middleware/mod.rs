//! Middleware for the TrustLend API
//!
//! Request tracing, security headers and acting-user extraction.

pub mod actor;
mod security;
mod tracing;

pub use actor::{ACTING_ROLE_HEADER, USER_ID_HEADER};
pub use security::{hsts_header, security_headers};
pub use tracing::{request_tracing, REQUEST_ID_HEADER};
