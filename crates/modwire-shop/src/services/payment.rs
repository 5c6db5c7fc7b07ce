//! # Payments
//!
//! Thin layer over the [`PaymentGateway`]: charges orders, issues refunds and
//! accepts gateway webhooks.

use crate::app::{App, Request};
use crate::error::ShopError;
use crate::gateway::{IntentRequest, IntentStatus, PaymentGateway, PaymentIntent};
use crate::model::{OrderId, PaymentStatus};
use crate::services::auth::Authenticate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Amount in cents.
    pub amount: u64,
    pub currency: String,
    pub payment_method_id: String,
    pub order_id: OrderId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentResult {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub payment_id: String,
}

#[derive(Clone)]
pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
}

impl std::fmt::Debug for PaymentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentService").finish_non_exhaustive()
    }
}

impl PaymentService {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }

    pub async fn process_payment(&self, request: PaymentRequest) -> Result<PaymentResult, ShopError> {
        let intent = self
            .gateway
            .create_intent(IntentRequest {
                amount: request.amount,
                currency: request.currency,
                payment_method_id: request.payment_method_id,
                description: format!("Order {}", request.order_id),
                reference: request.order_id.to_string(),
            })
            .await?;

        match intent.status {
            IntentStatus::Succeeded => Ok(PaymentResult {
                payment_id: intent.id,
                status: PaymentStatus::Succeeded,
                client_secret: None,
            }),
            IntentStatus::RequiresAction => Ok(PaymentResult {
                payment_id: intent.id,
                status: PaymentStatus::Pending,
                client_secret: intent.client_secret,
            }),
            IntentStatus::Failed | IntentStatus::Refunded => Err(ShopError::PaymentFailed(
                format!("intent {} ended as {:?}", intent.id, intent.status),
            )),
        }
    }

    pub async fn refund(&self, payment_id: &str, amount: Option<u64>) -> Result<u64, ShopError> {
        let refund = self.gateway.refund(payment_id, amount).await?;
        Ok(refund.amount)
    }

    pub async fn payment(&self, payment_id: &str) -> Result<PaymentIntent, ShopError> {
        self.gateway.intent(payment_id).await
    }

    /// Acknowledges a gateway event after checking it refers to a known intent.
    pub async fn handle_webhook(&self, event: WebhookEvent) -> Result<(), ShopError> {
        let intent = self.gateway.intent(&event.payment_id).await?;
        match event.kind.as_str() {
            "payment_intent.succeeded" => info!(payment = %intent.id, "Payment confirmed"),
            "payment_intent.payment_failed" => warn!(payment = %intent.id, "Payment failed"),
            other => info!(payment = %intent.id, event = other, "Unhandled webhook event"),
        }
        Ok(())
    }
}

pub fn routes(app: &App, payments: Arc<PaymentService>, authenticate: Authenticate) {
    let service = Arc::clone(&payments);
    app.post("/webhooks/payments", move |req| webhook(Arc::clone(&service), req));
    app.get("/payments/:payment_id", move |req| {
        status(Arc::clone(&payments), authenticate.clone(), req)
    });
}

async fn webhook(payments: Arc<PaymentService>, req: Request) -> Result<Value, ShopError> {
    payments.handle_webhook(req.json()?).await?;
    Ok(json!({ "received": true }))
}

async fn status(
    payments: Arc<PaymentService>,
    authenticate: Authenticate,
    req: Request,
) -> Result<PaymentIntent, ShopError> {
    authenticate.user(&req).await?;
    let payment_id: String = req.param("payment_id")?;
    payments.payment(&payment_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{FakeGateway, DECLINED_METHOD};

    fn request(method: &str) -> PaymentRequest {
        PaymentRequest {
            amount: 9900,
            currency: "usd".into(),
            payment_method_id: method.into(),
            order_id: OrderId(1),
        }
    }

    #[tokio::test]
    async fn test_declined_card_is_an_error() {
        let payments = PaymentService::new(Arc::new(FakeGateway::new("sk_test_x")));
        let ok = payments.process_payment(request("pm_card_visa")).await.unwrap();
        assert_eq!(ok.status, PaymentStatus::Succeeded);

        let err = payments.process_payment(request(DECLINED_METHOD)).await.unwrap_err();
        assert!(matches!(err, ShopError::PaymentFailed(_)));

        assert_eq!(payments.refund(&ok.payment_id, Some(100)).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_webhook_requires_known_intent() {
        let payments = PaymentService::new(Arc::new(FakeGateway::new("sk_test_x")));
        let event = WebhookEvent {
            kind: "payment_intent.succeeded".into(),
            payment_id: "pi_404".into(),
        };
        assert!(matches!(
            payments.handle_webhook(event).await,
            Err(ShopError::NotFound(_))
        ));
    }
}
