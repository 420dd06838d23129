//! Minimal admin gate for slot management endpoints.
//!
//! Full account authentication is out of scope for this service (the booking
//! flow supports guest checkout); slot creation and booking cancellation are
//! protected by a static bearer token from configuration instead.

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};

use crate::AppState;
use crate::errors::Error;
use crate::payment_providers::signing::constant_time_eq;

/// Extractor that proves the request carried the configured admin token.
pub struct AdminToken;

impl FromRequestParts<AppState> for AdminToken {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.admin_token.as_deref() else {
            return Err(Error::Unauthenticated {
                message: Some("Admin endpoints are disabled (no admin_token configured)".to_string()),
            });
        };

        let provided = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| Error::Unauthenticated {
                message: Some("Missing admin bearer token".to_string()),
            })?;

        if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
            return Err(Error::Unauthenticated {
                message: Some("Invalid admin token".to_string()),
            });
        }

        Ok(AdminToken)
    }
}
