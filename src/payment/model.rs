//! Payment ledger and gateway event models

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{LendingError, LendingResult};

/// Ledger entry status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "transaction_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Acknowledged,
    Disbursed,
    Failed,
}

/// What a payment settles
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Default)]
#[sqlx(type_name = "payment_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    Disbursal,
    #[default]
    Emi,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Disbursal => "DISBURSAL",
            PaymentType::Emi => "EMI",
        }
    }
}

/// Ledger entry. Never deleted.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub amount: i64,
    pub status: TransactionStatus,
    pub payment_type: PaymentType,
    /// Merchant order reference assigned when the payment was initiated
    pub gateway_ref: String,
    pub emi_number: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        contract_id: Uuid,
        from_user_id: Uuid,
        to_user_id: Uuid,
        amount: i64,
        status: TransactionStatus,
        payment_type: PaymentType,
        gateway_ref: impl Into<String>,
        emi_number: Option<i32>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            contract_id,
            from_user_id,
            to_user_id,
            amount,
            status,
            payment_type,
            gateway_ref: gateway_ref.into(),
            emi_number,
            created_at: now,
        }
    }
}

/// Outcome reported by the gateway
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentEventType {
    Completed,
    Failed,
}

/// A verified, structurally valid gateway event
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEvent {
    pub event_type: PaymentEventType,
    pub contract_id: Uuid,
    pub payment_type: PaymentType,
    pub gateway_order_ref: String,
    /// Installment the payment was initiated for, when the gateway echoes it
    pub emi_number: Option<i32>,
}

impl PaymentEvent {
    pub fn completed(contract_id: Uuid, payment_type: PaymentType, gateway_order_ref: &str) -> Self {
        Self {
            event_type: PaymentEventType::Completed,
            contract_id,
            payment_type,
            gateway_order_ref: gateway_order_ref.to_string(),
            emi_number: None,
        }
    }

    pub fn failed(contract_id: Uuid, payment_type: PaymentType, gateway_order_ref: &str) -> Self {
        Self {
            event_type: PaymentEventType::Failed,
            ..Self::completed(contract_id, payment_type, gateway_order_ref)
        }
    }

    pub fn for_emi(mut self, emi_number: i32) -> Self {
        self.emi_number = Some(emi_number);
        self
    }
}

/// Event type as sent on the wire
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventType {
    #[serde(rename = "COMPLETED", alias = "CHECKOUT_ORDER_COMPLETED")]
    Completed,
    #[serde(rename = "FAILED", alias = "CHECKOUT_ORDER_FAILED")]
    Failed,
    #[serde(other)]
    Unsupported,
}

/// Webhook payload structure for payment callbacks
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    #[serde(alias = "type")]
    pub event_type: WebhookEventType,
    pub payload: WebhookOrder,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookOrder {
    #[serde(alias = "originalMerchantOrderId", alias = "merchantOrderId")]
    pub gateway_order_ref: String,
    pub meta_info: WebhookMetaInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookMetaInfo {
    pub contract_id: Uuid,
    #[serde(default)]
    pub payment_type: PaymentType,
    #[serde(default)]
    pub emi_number: Option<i32>,
}

impl WebhookPayload {
    /// Structural validation. `Ok(None)` means an event type this service
    /// does not act on.
    pub fn into_event(self) -> LendingResult<Option<PaymentEvent>> {
        let event_type = match self.event_type {
            WebhookEventType::Completed => PaymentEventType::Completed,
            WebhookEventType::Failed => PaymentEventType::Failed,
            WebhookEventType::Unsupported => return Ok(None),
        };

        let gateway_order_ref = self.payload.gateway_order_ref.trim().to_string();
        if gateway_order_ref.is_empty() {
            return Err(LendingError::validation("gatewayOrderRef must not be empty"));
        }

        let meta = self.payload.meta_info;
        if let Some(n) = meta.emi_number {
            if n < 1 {
                return Err(LendingError::validation("emiNumber must be at least 1"));
            }
        }

        Ok(Some(PaymentEvent {
            event_type,
            contract_id: meta.contract_id,
            payment_type: meta.payment_type,
            gateway_order_ref,
            emi_number: meta.emi_number,
        }))
    }
}

/// Where to send the payer to complete a checkout
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRedirect {
    pub merchant_order_id: String,
    pub redirect_url: String,
    pub amount: i64,
    pub payment_type: PaymentType,
}
