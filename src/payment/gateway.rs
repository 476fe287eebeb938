//! Checkout initiation against the external payment gateway

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::PaymentType;
use crate::error::{LendingError, LendingResult};

/// Gateway amounts are in the smallest currency unit
const MINOR_UNITS_PER_UNIT: i64 = 100;

/// A checkout the gateway should open for a payer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutOrder {
    pub merchant_order_id: String,
    pub contract_id: Uuid,
    pub payer_id: Uuid,
    pub payment_type: PaymentType,
    /// Whole currency units
    pub amount: i64,
    pub emi_number: Option<i32>,
}

impl CheckoutOrder {
    pub fn new(
        contract_id: Uuid,
        payer_id: Uuid,
        payment_type: PaymentType,
        amount: i64,
        emi_number: Option<i32>,
    ) -> Self {
        Self {
            merchant_order_id: order_reference(payment_type, contract_id),
            contract_id,
            payer_id,
            payment_type,
            amount,
            emi_number,
        }
    }
}

/// `{TYPE}_{contractId}_{8 hex chars}`
pub fn order_reference(payment_type: PaymentType, contract_id: Uuid) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", payment_type.as_str(), contract_id, &suffix[..8])
}

fn status_page_url(frontend_url: &str, order: &CheckoutOrder) -> String {
    format!(
        "{}/payment-status?merchantOrderId={}&type={}",
        frontend_url.trim_end_matches('/'),
        order.merchant_order_id,
        order.payment_type.as_str()
    )
}

/// Opens checkouts and returns the URL the payer is redirected to
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout(&self, order: &CheckoutOrder) -> LendingResult<String>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutRequest<'a> {
    merchant_order_id: &'a str,
    amount: i64,
    meta_info: CheckoutMetaInfo,
    payment_flow: PaymentFlow,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutMetaInfo {
    contract_id: Uuid,
    payer_id: Uuid,
    payment_type: PaymentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    emi_number: Option<i32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentFlow {
    #[serde(rename = "type")]
    flow_type: &'static str,
    merchant_urls: MerchantUrls,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MerchantUrls {
    redirect_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutResponse {
    redirect_url: String,
}

/// HTTP client for a hosted checkout API
pub struct HttpPaymentGateway {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    frontend_url: String,
}

impl HttpPaymentGateway {
    pub fn new(
        base_url: String,
        client_id: String,
        client_secret: String,
        frontend_url: String,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url,
            client_id,
            client_secret,
            frontend_url,
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_checkout(&self, order: &CheckoutOrder) -> LendingResult<String> {
        let body = CheckoutRequest {
            merchant_order_id: &order.merchant_order_id,
            amount: order.amount * MINOR_UNITS_PER_UNIT,
            meta_info: CheckoutMetaInfo {
                contract_id: order.contract_id,
                payer_id: order.payer_id,
                payment_type: order.payment_type,
                emi_number: order.emi_number,
            },
            payment_flow: PaymentFlow {
                flow_type: "PG_CHECKOUT",
                merchant_urls: MerchantUrls {
                    redirect_url: status_page_url(&self.frontend_url, order),
                },
            },
        };

        let url = format!("{}/checkout/pay", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!(
                merchant_order_id = %order.merchant_order_id,
                status = %status,
                body = %text,
                "Payment gateway rejected checkout"
            );
            return Err(LendingError::Gateway(format!(
                "Checkout initiation failed with status {}",
                status
            )));
        }

        let checkout: CheckoutResponse = response.json().await?;
        tracing::info!(
            merchant_order_id = %order.merchant_order_id,
            contract_id = %order.contract_id,
            payment_type = order.payment_type.as_str(),
            "Checkout created"
        );
        Ok(checkout.redirect_url)
    }
}

/// Local stand-in that skips the gateway and sends the payer straight to the
/// status page. Completion has to be delivered to the webhook by hand.
pub struct SimulatedGateway {
    frontend_url: String,
}

impl SimulatedGateway {
    pub fn new(frontend_url: String) -> Self {
        Self { frontend_url }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn create_checkout(&self, order: &CheckoutOrder) -> LendingResult<String> {
        tracing::warn!(
            merchant_order_id = %order.merchant_order_id,
            amount = order.amount,
            "Simulated gateway: no real checkout opened"
        );
        Ok(status_page_url(&self.frontend_url, order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_reference_format() {
        let contract_id = Uuid::new_v4();
        let reference = order_reference(PaymentType::Disbursal, contract_id);
        let prefix = format!("DISBURSAL_{}_", contract_id);
        assert!(reference.starts_with(&prefix));
        let suffix = &reference[prefix.len()..];
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_order_references_are_unique() {
        let contract_id = Uuid::new_v4();
        assert_ne!(
            order_reference(PaymentType::Emi, contract_id),
            order_reference(PaymentType::Emi, contract_id)
        );
    }

    #[tokio::test]
    async fn test_simulated_gateway_points_at_status_page() {
        let gateway = SimulatedGateway::new("http://localhost:5174/".to_string());
        let order = CheckoutOrder::new(Uuid::new_v4(), Uuid::new_v4(), PaymentType::Emi, 500, Some(1));
        let url = gateway.create_checkout(&order).await.unwrap();
        assert_eq!(
            url,
            format!(
                "http://localhost:5174/payment-status?merchantOrderId={}&type=EMI",
                order.merchant_order_id
            )
        );
    }
}
