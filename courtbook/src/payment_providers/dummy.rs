//! Dummy payment provider implementation
//!
//! Stands in for a real provider in development and tests: checkout sessions
//! are fabricated locally (no money moves), refunds are recorded in memory,
//! and webhook deliveries are verified with a Standard-Webhooks HMAC
//! signature so the endpoint's verification path is exercised for real.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Mutex;

use crate::config::DummyConfig;
use crate::payment_providers::{CompletedCheckout, HostedCheckout, PaymentError, PaymentProvider, Result, signing};
use crate::store::models::{Customer, Slot};
use crate::types::{SlotId, UserId};

/// Dummy payment provider backed by in-memory bookkeeping
pub struct DummyProvider {
    webhook_secret: String,
    refunds: Mutex<Vec<String>>,
}

/// Webhook payload format the dummy provider accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DummyEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub session_id: String,
    pub slot_id: Option<String>,
    pub user_id: Option<UserId>,
    pub email: String,
}

impl DummyEvent {
    /// Event type the reconciler acts on.
    pub const CHECKOUT_COMPLETED: &'static str = "checkout.completed";

    pub fn completed(session_id: &str, slot_id: Option<SlotId>, customer: &Customer) -> Self {
        Self {
            event_type: Self::CHECKOUT_COMPLETED.to_string(),
            session_id: session_id.to_string(),
            slot_id: slot_id.map(|id| id.to_string()),
            user_id: customer.user_id,
            email: customer.email.clone(),
        }
    }
}

impl From<DummyConfig> for DummyProvider {
    fn from(config: DummyConfig) -> Self {
        Self::new(config.webhook_secret)
    }
}

impl DummyProvider {
    pub fn new(webhook_secret: String) -> Self {
        Self {
            webhook_secret,
            refunds: Mutex::new(Vec::new()),
        }
    }

    /// Session ids refunded so far, oldest first.
    pub fn refunded_sessions(&self) -> Vec<String> {
        self.refunds.lock().expect("refund log poisoned").clone()
    }
}

#[async_trait]
impl PaymentProvider for DummyProvider {
    async fn create_checkout_session(
        &self,
        slot: &Slot,
        _customer: &Customer,
        success_url: &str,
        _cancel_url: &str,
        _expires_at: DateTime<Utc>,
    ) -> Result<HostedCheckout> {
        let session_id = format!("cs_dummy_{}", uuid::Uuid::new_v4().simple());

        // The dummy checkout page is the success redirect itself
        let url = success_url.replace("{CHECKOUT_SESSION_ID}", &session_id);

        tracing::info!("Dummy provider created checkout session {} for slot {}", session_id, slot.id);

        Ok(HostedCheckout { session_id, url })
    }

    async fn refund(&self, session_id: &str) -> Result<()> {
        if !session_id.starts_with("cs_dummy_") {
            return Err(PaymentError::InvalidData("Invalid dummy session ID format".to_string()));
        }
        self.refunds.lock().expect("refund log poisoned").push(session_id.to_string());
        tracing::info!("Dummy provider refunded session {}", session_id);
        Ok(())
    }

    async fn verify_webhook(&self, headers: &axum::http::HeaderMap, body: &str) -> Result<Option<CompletedCheckout>> {
        let header = |name: &str| -> Result<&str> {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| PaymentError::Verification(format!("Missing {name} header")))
        };

        let msg_id = header("webhook-id")?;
        let timestamp: i64 = header("webhook-timestamp")?
            .parse()
            .map_err(|_| PaymentError::Verification("Invalid webhook-timestamp header".to_string()))?;
        let signature = header("webhook-signature")?;

        if !signing::verify_signature(msg_id, timestamp, body, signature, &self.webhook_secret) {
            return Err(PaymentError::Verification("Webhook signature mismatch".to_string()));
        }

        let event: DummyEvent =
            serde_json::from_str(body).map_err(|e| PaymentError::InvalidData(format!("Malformed event payload: {e}")))?;

        if event.event_type != DummyEvent::CHECKOUT_COMPLETED {
            tracing::debug!("Ignoring webhook event type: {}", event.event_type);
            return Ok(None);
        }

        let slot_id = event.slot_id.as_deref().and_then(|raw| uuid::Uuid::from_str(raw).ok());

        Ok(Some(CompletedCheckout {
            session_id: event.session_id,
            slot_id,
            customer: Customer {
                user_id: event.user_id,
                email: event.email,
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::{LessonCategory, Location, SlotCreate};
    use chrono::TimeZone;

    fn test_slot() -> Slot {
        Slot::new(SlotCreate {
            start: Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 6, 1, 11, 0, 0).unwrap(),
            capacity: 1,
            price: 40,
            location: Location::CentreCourt,
            category: LessonCategory::Private,
        })
    }

    fn guest() -> Customer {
        Customer {
            user_id: None,
            email: "guest@example.com".to_string(),
        }
    }

    /// Build signed webhook headers for a payload, the way the provider would.
    fn signed_headers(body: &str, secret: &str) -> axum::http::HeaderMap {
        let msg_id = format!("msg_{}", uuid::Uuid::new_v4().simple());
        let timestamp = Utc::now().timestamp();
        let signature = signing::sign_payload(&msg_id, timestamp, body, secret).expect("should sign");

        let mut headers = axum::http::HeaderMap::new();
        headers.insert("webhook-id", msg_id.parse().unwrap());
        headers.insert("webhook-timestamp", timestamp.to_string().parse().unwrap());
        headers.insert("webhook-signature", signature.parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn test_create_session_fills_placeholder() {
        let provider = DummyProvider::new(signing::generate_secret());
        let checkout = provider
            .create_checkout_session(
                &test_slot(),
                &guest(),
                "http://localhost:8080/confirmation?session_id={CHECKOUT_SESSION_ID}",
                "http://localhost:8080/checkout/cancel",
                Utc::now(),
            )
            .await
            .unwrap();

        assert!(checkout.session_id.starts_with("cs_dummy_"));
        assert!(checkout.url.contains(&checkout.session_id));
        assert!(!checkout.url.contains("{CHECKOUT_SESSION_ID}"));
    }

    #[tokio::test]
    async fn test_webhook_round_trip() {
        let secret = signing::generate_secret();
        let provider = DummyProvider::new(secret.clone());
        let slot = test_slot();

        let event = DummyEvent::completed("cs_dummy_abc", Some(slot.id), &guest());
        let body = serde_json::to_string(&event).unwrap();
        let headers = signed_headers(&body, &secret);

        let completed = provider.verify_webhook(&headers, &body).await.unwrap().unwrap();
        assert_eq!(completed.session_id, "cs_dummy_abc");
        assert_eq!(completed.slot_id, Some(slot.id));
        assert_eq!(completed.customer.email, "guest@example.com");
    }

    #[tokio::test]
    async fn test_webhook_rejects_bad_signature() {
        let provider = DummyProvider::new(signing::generate_secret());
        let body = r#"{"type":"checkout.completed","session_id":"cs_dummy_abc","email":"guest@example.com"}"#;

        // Headers signed with a different secret
        let headers = signed_headers(body, &signing::generate_secret());
        let result = provider.verify_webhook(&headers, body).await;
        assert!(matches!(result, Err(PaymentError::Verification(_))));

        // Missing headers entirely
        let result = provider.verify_webhook(&axum::http::HeaderMap::new(), body).await;
        assert!(matches!(result, Err(PaymentError::Verification(_))));
    }

    #[tokio::test]
    async fn test_webhook_ignores_other_event_types() {
        let secret = signing::generate_secret();
        let provider = DummyProvider::new(secret.clone());

        let body = r#"{"type":"checkout.expired","session_id":"cs_dummy_abc","email":"guest@example.com"}"#;
        let headers = signed_headers(body, &secret);

        let result = provider.verify_webhook(&headers, body).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_refund_is_recorded() {
        let provider = DummyProvider::new(signing::generate_secret());
        provider.refund("cs_dummy_abc").await.unwrap();
        assert_eq!(provider.refunded_sessions(), vec!["cs_dummy_abc".to_string()]);

        let err = provider.refund("cs_live_nope").await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidData(_)));
    }
}
