//! Shared data models for the TrustLend backend

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{LendingError, LendingResult};

/// Roles a user can act in. A user picks one per request; it is never stored
/// as ambient state on the user record.
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "user_role", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Receiver,
    Lender,
    Guarantor,
}

impl UserRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "RECEIVER" => Some(UserRole::Receiver),
            "LENDER" => Some(UserRole::Lender),
            "GUARANTOR" => Some(UserRole::Guarantor),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Receiver => "RECEIVER",
            UserRole::Lender => "LENDER",
            UserRole::Guarantor => "GUARANTOR",
        }
    }
}

/// The user performing an operation together with the role they act in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl Actor {
    pub fn new(user_id: Uuid, role: UserRole) -> Self {
        Self { user_id, role }
    }

    pub fn receiver(user_id: Uuid) -> Self {
        Self::new(user_id, UserRole::Receiver)
    }

    pub fn lender(user_id: Uuid) -> Self {
        Self::new(user_id, UserRole::Lender)
    }

    pub fn guarantor(user_id: Uuid) -> Self {
        Self::new(user_id, UserRole::Guarantor)
    }

    /// Fail with a role error unless acting as `role`
    pub fn require_role(&self, role: UserRole) -> LendingResult<()> {
        if self.role != role {
            return Err(LendingError::role(format!(
                "You must be in the {} role to perform this action (current role: {})",
                role.as_str(),
                self.role.as_str()
            )));
        }
        Ok(())
    }
}

/// User model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub trust_index: i32,
    /// Payout identifier such as a UPI handle
    pub payout_handle: Option<String>,
    /// Users who have endorsed this user
    pub endorsed_by: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: impl Into<String>, trust_index: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            trust_index,
            payout_handle: None,
            endorsed_by: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_endorsement_from(mut self, endorser: Uuid) -> Self {
        if !self.endorsed_by.contains(&endorser) {
            self.endorsed_by.push(endorser);
        }
        self
    }

    pub fn is_endorsed_by(&self, user_id: Uuid) -> bool {
        self.endorsed_by.contains(&user_id)
    }
}

/// Lender-published loan offer
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct LoanBrochure {
    pub id: Uuid,
    pub lender_id: Uuid,
    /// Principal in whole currency units
    pub amount: i64,
    /// Flat interest over the full tenor, in basis points
    pub interest_rate_bps: i32,
    pub tenor_days: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl LoanBrochure {
    pub fn new(lender_id: Uuid, amount: i64, interest_rate_bps: i32, tenor_days: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            lender_id,
            amount,
            interest_rate_bps,
            tenor_days,
            active: true,
            created_at: Utc::now(),
        }
    }
}

/// Standard API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}
