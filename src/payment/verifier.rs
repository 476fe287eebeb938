//! Webhook callback verification
//!
//! The verifier is picked once at startup and injected into the handler.

use sha2::{Digest, Sha256};

use crate::error::{LendingError, LendingResult};

pub trait CallbackVerifier: Send + Sync {
    /// Check the `Authorization` header (and, if needed, the raw body) of a
    /// gateway callback
    fn verify(&self, authorization: Option<&str>, body: &[u8]) -> LendingResult<()>;
}

/// The gateway sends `SHA256(username:password)` as hex in `Authorization`
pub struct Sha256CredentialVerifier {
    expected: String,
}

impl Sha256CredentialVerifier {
    pub fn new(username: &str, password: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}:{}", username, password).as_bytes());
        Self {
            expected: hex::encode(hasher.finalize()),
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl CallbackVerifier for Sha256CredentialVerifier {
    fn verify(&self, authorization: Option<&str>, _body: &[u8]) -> LendingResult<()> {
        let header = authorization
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| LendingError::Unauthorized("Missing callback authorization".into()))?;

        let presented = header
            .strip_prefix("SHA256 ")
            .unwrap_or(header)
            .trim()
            .to_ascii_lowercase();

        if constant_time_eq(presented.as_bytes(), self.expected.as_bytes()) {
            Ok(())
        } else {
            Err(LendingError::Unauthorized(
                "Invalid callback authorization".into(),
            ))
        }
    }
}

/// Accepts every callback. Only for tests and local development.
pub struct AcceptAllVerifier;

impl CallbackVerifier for AcceptAllVerifier {
    fn verify(&self, _authorization: Option<&str>, _body: &[u8]) -> LendingResult<()> {
        Ok(())
    }
}
