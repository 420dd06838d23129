use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

use crate::payment_providers::PaymentError;
use crate::store::StoreError;
use crate::types::SlotId;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Admin credentials required but not provided or wrong
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// The requested slot cannot be reserved or paid for right now
    #[error("Slot {slot_id} is not available")]
    SlotUnavailable { slot_id: SlotId },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Webhook payload failed signature verification
    #[error("Webhook verification failed: {message}")]
    SignatureVerification { message: String },

    /// No payment provider configured for payment-dependent endpoints
    #[error("No payment provider configured")]
    PaymentNotConfigured,

    /// Store operation error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Payment provider error
    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::SlotUnavailable { .. } => StatusCode::BAD_REQUEST,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::SignatureVerification { .. } => StatusCode::BAD_REQUEST,
            Error::PaymentNotConfigured => StatusCode::NOT_IMPLEMENTED,
            Error::Store(store_err) => match store_err {
                StoreError::NotFound => StatusCode::NOT_FOUND,
                StoreError::Conflict { .. } => StatusCode::CONFLICT,
                StoreError::Corrupt { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                StoreError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Payment(payment_err) => StatusCode::from(payment_err),
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable error tag for the response body
    pub fn error_tag(&self) -> &'static str {
        match self {
            Error::Unauthenticated { .. } => "unauthenticated",
            Error::SlotUnavailable { .. } => "slot_unavailable",
            Error::BadRequest { .. } => "bad_request",
            Error::NotFound { .. } => "not_found",
            Error::SignatureVerification { .. } => "verification_failed",
            Error::PaymentNotConfigured => "payment_not_configured",
            Error::Store(_) | Error::Other(_) => "internal",
            Error::Payment(PaymentError::Verification(_)) => "verification_failed",
            Error::Payment(_) => "payment",
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::SlotUnavailable { slot_id } => {
                format!("Slot {slot_id} is no longer available, please pick another time")
            }
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
            Error::SignatureVerification { .. } => "Webhook signature verification failed".to_string(),
            Error::PaymentNotConfigured => "Sorry, there's no payment provider setup. Please contact support.".to_string(),
            Error::Store(store_err) => match store_err {
                StoreError::NotFound => "Resource not found".to_string(),
                StoreError::Conflict { .. } => "Resource already exists".to_string(),
                StoreError::Corrupt { .. } | StoreError::Other(_) => "Internal server error".to_string(),
            },
            Error::Payment(PaymentError::Verification(_)) => "Webhook signature verification failed".to_string(),
            Error::Payment(PaymentError::InvalidData(message)) => message.clone(),
            Error::Payment(PaymentError::ProviderApi(_)) => "Payment provider error".to_string(),
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging, with severity matched to the class of failure
        match &self {
            Error::Store(StoreError::Other(_)) | Error::Store(StoreError::Corrupt { .. }) | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Payment(PaymentError::ProviderApi(_)) => {
                tracing::error!("Payment provider error: {:#}", self);
            }
            Error::SignatureVerification { .. } | Error::Payment(PaymentError::Verification(_)) => {
                tracing::warn!("Webhook verification failure: {}", self);
            }
            Error::Store(_) => {
                tracing::warn!("Store constraint error: {}", self);
            }
            Error::Unauthenticated { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::SlotUnavailable { .. } | Error::BadRequest { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
            Error::PaymentNotConfigured => {
                tracing::warn!("Payment endpoint hit but no provider is configured");
            }
            Error::Payment(_) => {
                tracing::warn!("Payment error: {}", self);
            }
        }

        let status = self.status_code();
        let body = json!({
            "error": self.error_tag(),
            "details": self.user_message(),
        });

        (status, axum::response::Json(body)).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_codes() {
        let slot_id = Uuid::new_v4();
        assert_eq!(Error::SlotUnavailable { slot_id }.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::SignatureVerification {
                message: "bad".to_string()
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(Error::Other(anyhow::anyhow!("boom")).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(Error::PaymentNotConfigured.status_code(), StatusCode::NOT_IMPLEMENTED);
    }

    #[test]
    fn test_internal_details_do_not_leak() {
        let err = Error::Store(StoreError::Other(anyhow::anyhow!("connection refused to 10.0.0.3:5432")));
        assert!(!err.user_message().contains("10.0.0.3"));
    }
}
