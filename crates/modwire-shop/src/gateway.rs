//! # Payment Gateway
//!
//! [`PaymentGateway`] is the seam to an external card processor. The shop ships
//! with [`FakeGateway`], which settles everything in memory and recognises a
//! few test payment methods:
//!
//! | payment method       | outcome                          |
//! |----------------------|----------------------------------|
//! | `pm_card_declined`   | intent fails                     |
//! | `pm_card_3ds`        | intent requires customer action  |
//! | anything else        | intent succeeds                  |

use crate::error::ShopError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

pub const DECLINED_METHOD: &str = "pm_card_declined";
pub const ACTION_REQUIRED_METHOD: &str = "pm_card_3ds";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRequest {
    /// Amount in cents.
    pub amount: u64,
    pub currency: String,
    pub payment_method_id: String,
    pub description: String,
    pub reference: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Succeeded,
    RequiresAction,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: u64,
    pub status: IntentStatus,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub intent_id: String,
    pub amount: u64,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, request: IntentRequest) -> Result<PaymentIntent, ShopError>;

    async fn intent(&self, id: &str) -> Result<PaymentIntent, ShopError>;

    /// Refunds `amount` cents, or the full intent when `None`.
    async fn refund(&self, intent_id: &str, amount: Option<u64>) -> Result<Refund, ShopError>;
}

#[derive(Debug, Default)]
struct Ledger {
    intents: HashMap<String, PaymentIntent>,
    refunds: Vec<Refund>,
    next_id: u64,
}

#[derive(Debug)]
pub struct FakeGateway {
    secret_key: String,
    ledger: Mutex<Ledger>,
}

impl FakeGateway {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            ledger: Mutex::default(),
        }
    }

    pub fn is_test_mode(&self) -> bool {
        self.secret_key.starts_with("sk_test_")
    }

    pub async fn refunds(&self) -> Vec<Refund> {
        self.ledger.lock().await.refunds.clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    #[instrument(skip(self, request), fields(reference = %request.reference))]
    async fn create_intent(&self, request: IntentRequest) -> Result<PaymentIntent, ShopError> {
        if request.amount == 0 {
            return Err(ShopError::PaymentFailed("amount must be positive".to_string()));
        }
        let mut ledger = self.ledger.lock().await;
        ledger.next_id += 1;
        let id = format!("pi_{}", ledger.next_id);
        let status = match request.payment_method_id.as_str() {
            DECLINED_METHOD => IntentStatus::Failed,
            ACTION_REQUIRED_METHOD => IntentStatus::RequiresAction,
            _ => IntentStatus::Succeeded,
        };
        let intent = PaymentIntent {
            client_secret: (status == IntentStatus::RequiresAction)
                .then(|| format!("{id}_secret")),
            id: id.clone(),
            amount: request.amount,
            status,
        };
        ledger.intents.insert(id, intent.clone());

        match status {
            IntentStatus::Failed => warn!(intent = %intent.id, "Card declined"),
            _ => info!(intent = %intent.id, amount = intent.amount, ?status, "Intent created"),
        }
        Ok(intent)
    }

    async fn intent(&self, id: &str) -> Result<PaymentIntent, ShopError> {
        self.ledger
            .lock()
            .await
            .intents
            .get(id)
            .cloned()
            .ok_or_else(|| ShopError::NotFound(format!("Payment intent {id}")))
    }

    async fn refund(&self, intent_id: &str, amount: Option<u64>) -> Result<Refund, ShopError> {
        let mut ledger = self.ledger.lock().await;
        let intent = ledger
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| ShopError::NotFound(format!("Payment intent {intent_id}")))?;
        if intent.status != IntentStatus::Succeeded {
            return Err(ShopError::BadRequest(format!(
                "intent {intent_id} cannot be refunded"
            )));
        }
        let amount = amount.unwrap_or(intent.amount).min(intent.amount);
        if amount == intent.amount {
            intent.status = IntentStatus::Refunded;
        }

        let refund = Refund {
            id: format!("re_{}", ledger.refunds.len() + 1),
            intent_id: intent_id.to_string(),
            amount,
        };
        ledger.refunds.push(refund.clone());
        info!(intent = intent_id, amount, "Refund issued");
        Ok(refund)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: &str) -> IntentRequest {
        IntentRequest {
            amount: 1250,
            currency: "usd".into(),
            payment_method_id: method.into(),
            description: "Order order_1".into(),
            reference: "order_1".into(),
        }
    }

    #[tokio::test]
    async fn test_intent_outcomes() {
        let gateway = FakeGateway::new("sk_test_x");
        assert!(gateway.is_test_mode());

        let ok = gateway.create_intent(request("pm_card_visa")).await.unwrap();
        assert_eq!(ok.status, IntentStatus::Succeeded);
        let declined = gateway.create_intent(request(DECLINED_METHOD)).await.unwrap();
        assert_eq!(declined.status, IntentStatus::Failed);
        let pending = gateway.create_intent(request(ACTION_REQUIRED_METHOD)).await.unwrap();
        assert_eq!(pending.client_secret.as_deref(), Some("pi_3_secret"));
    }

    #[tokio::test]
    async fn test_full_refund_marks_intent() {
        let gateway = FakeGateway::new("sk_test_x");
        let intent = gateway.create_intent(request("pm_card_visa")).await.unwrap();

        let refund = gateway.refund(&intent.id, None).await.unwrap();
        assert_eq!(refund.amount, 1250);
        assert_eq!(gateway.intent(&intent.id).await.unwrap().status, IntentStatus::Refunded);
        assert!(gateway.refund(&intent.id, None).await.is_err());
        assert_eq!(gateway.refunds().await.len(), 1);
    }
}
