//! Stripe payment provider implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use stripe::{
    CheckoutSession, CheckoutSessionMode, CheckoutSessionUiMode, Client, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CreateCheckoutSessionLineItemsPriceData,
    CreateCheckoutSessionLineItemsPriceDataProductData, CreateRefund, Currency, EventObject, EventType, Refund, Webhook,
};

use crate::config::StripeConfig;
use crate::payment_providers::{CompletedCheckout, HostedCheckout, PaymentError, PaymentProvider, Result};
use crate::store::models::{Customer, Slot};

/// Stripe payment provider
pub struct StripeProvider {
    api_key: String,
    webhook_secret: String,
    currency: Currency,
}

impl From<StripeConfig> for StripeProvider {
    fn from(config: StripeConfig) -> Self {
        let currency = parse_currency(&config.currency).unwrap_or_else(|| {
            tracing::warn!("Unknown currency code {:?} in Stripe config, falling back to usd", config.currency);
            Currency::USD
        });
        Self {
            api_key: config.api_key,
            webhook_secret: config.webhook_secret,
            currency,
        }
    }
}

impl StripeProvider {
    /// Get a Stripe client
    fn client(&self) -> Client {
        Client::new(&self.api_key)
    }
}

/// Parse an ISO currency code into a Stripe currency.
fn parse_currency(code: &str) -> Option<Currency> {
    serde_json::from_value(serde_json::Value::String(code.to_lowercase())).ok()
}

/// One line the customer sees on the hosted checkout page.
fn line_item_name(slot: &Slot) -> String {
    format!(
        "{} tennis lesson at {}, {} to {}",
        slot.category,
        slot.location,
        slot.start.format("%Y-%m-%d %H:%M"),
        slot.end.format("%H:%M"),
    )
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    async fn create_checkout_session(
        &self,
        slot: &Slot,
        customer: &Customer,
        success_url: &str,
        cancel_url: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<HostedCheckout> {
        let client = self.client();

        let slot_id = slot.id.to_string();
        let description = line_item_name(slot);

        // Correlation metadata the webhook reconciler reads back out
        let mut metadata = stripe::Metadata::new();
        metadata.insert("slot_id".to_string(), slot_id.clone());
        metadata.insert("slot_time".to_string(), format!("{} to {}", slot.start.format("%Y-%m-%d %H:%M"), slot.end.format("%H:%M")));
        metadata.insert("location".to_string(), slot.location.as_str().to_string());
        metadata.insert("source".to_string(), "courtbook".to_string());
        metadata.insert("created_ts".to_string(), Utc::now().timestamp().to_string());
        metadata.insert("email".to_string(), customer.email.clone());
        if let Some(user_id) = customer.user_id {
            metadata.insert("user_id".to_string(), user_id.to_string());
        }

        let checkout_params = CreateCheckoutSession {
            cancel_url: Some(cancel_url),
            success_url: Some(success_url),
            client_reference_id: Some(&slot_id),
            currency: Some(self.currency),
            customer_email: Some(&customer.email),
            expires_at: Some(expires_at.timestamp()),
            line_items: Some(vec![CreateCheckoutSessionLineItems {
                quantity: Some(1),
                price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                    currency: self.currency,
                    // Prices are stored in major units; Stripe takes minor units
                    unit_amount: Some(slot.price * 100),
                    product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                        name: description.clone(),
                        description: Some(description),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            metadata: Some(metadata),
            mode: Some(CheckoutSessionMode::Payment),
            ui_mode: Some(CheckoutSessionUiMode::Hosted),
            ..Default::default()
        };

        let checkout_session = CheckoutSession::create(&client, checkout_params).await.map_err(|e| {
            tracing::error!("Failed to create Stripe checkout session: {:?}", e);
            PaymentError::ProviderApi(e.to_string())
        })?;

        tracing::info!("Created checkout session {} for slot {}", checkout_session.id, slot_id);

        let url = checkout_session.url.ok_or_else(|| {
            tracing::error!("Checkout session missing URL");
            PaymentError::ProviderApi("Checkout session missing URL".to_string())
        })?;

        Ok(HostedCheckout {
            session_id: checkout_session.id.to_string(),
            url,
        })
    }

    async fn refund(&self, session_id: &str) -> Result<()> {
        let client = self.client();

        let session_id: stripe::CheckoutSessionId = session_id
            .parse()
            .map_err(|_| PaymentError::InvalidData("Invalid Stripe session ID".to_string()))?;

        // The refund targets the payment intent behind the session
        let checkout_session = CheckoutSession::retrieve(&client, &session_id, &[]).await.map_err(|e| {
            tracing::error!("Failed to retrieve Stripe checkout session: {:?}", e);
            PaymentError::ProviderApi(e.to_string())
        })?;

        let payment_intent = checkout_session
            .payment_intent
            .ok_or_else(|| PaymentError::InvalidData(format!("Session {} has no payment intent to refund", session_id)))?;

        let refund = Refund::create(
            &client,
            CreateRefund {
                payment_intent: Some(payment_intent.id()),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| {
            tracing::error!("Failed to create Stripe refund for session {}: {:?}", session_id, e);
            PaymentError::ProviderApi(e.to_string())
        })?;

        tracing::info!("Issued refund {} for session {}", refund.id, session_id);
        Ok(())
    }

    async fn verify_webhook(&self, headers: &axum::http::HeaderMap, body: &str) -> Result<Option<CompletedCheckout>> {
        let signature = headers
            .get("stripe-signature")
            .ok_or_else(|| PaymentError::Verification("Missing stripe-signature header".to_string()))?
            .to_str()
            .map_err(|_| PaymentError::Verification("Invalid stripe-signature header".to_string()))?;

        let event = Webhook::construct_event(body, signature, &self.webhook_secret)
            .map_err(|e| PaymentError::Verification(format!("Webhook validation failed: {e}")))?;

        tracing::trace!("Validated Stripe webhook event: {:?}", event.type_);

        match event.type_ {
            EventType::CheckoutSessionCompleted | EventType::CheckoutSessionAsyncPaymentSucceeded => {
                let session = match event.data.object {
                    EventObject::CheckoutSession(session) => session,
                    other => {
                        tracing::error!("Expected CheckoutSession object, got {:?}", other);
                        return Err(PaymentError::InvalidData("Event object is not a checkout session".to_string()));
                    }
                };

                let metadata = session.metadata.clone().unwrap_or_default();

                let slot_id = metadata
                    .get("slot_id")
                    .map(String::as_str)
                    .or(session.client_reference_id.as_deref())
                    .and_then(|raw| uuid::Uuid::from_str(raw).ok());

                let email = metadata
                    .get("email")
                    .cloned()
                    .or_else(|| session.customer_details.as_ref().and_then(|details| details.email.clone()))
                    .unwrap_or_default();

                let user_id = metadata.get("user_id").and_then(|raw| uuid::Uuid::from_str(raw).ok());

                Ok(Some(CompletedCheckout {
                    session_id: session.id.to_string(),
                    slot_id,
                    customer: Customer { user_id, email },
                }))
            }
            _ => {
                tracing::debug!("Ignoring webhook event type: {:?}", event.type_);
                Ok(None)
            }
        }
    }
}
