use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::store::models::Customer;
use crate::types::{SlotId, UserId};

// Request models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    /// The slot to reserve and pay for
    #[schema(value_type = String, format = "uuid")]
    pub slot_id: SlotId,
    /// Account id when the customer is signed in; guests omit it
    #[schema(value_type = Option<String>, format = "uuid")]
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Customer email, always required (payment receipts and booking lookup)
    pub email: String,
}

impl CheckoutRequest {
    pub fn customer(&self) -> Customer {
        Customer {
            user_id: self.user_id,
            email: self.email.clone(),
        }
    }
}

// Response models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutResponse {
    /// Hosted payment page to redirect the customer to
    pub url: String,
}

/// Query parameters for the cancel/abandon redirect target
#[derive(Debug, Deserialize, IntoParams)]
pub struct CancelQuery {
    /// The slot whose reservation should be released
    pub slot_id: SlotId,
}
