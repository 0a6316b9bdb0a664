//! # Payment Gateway Seam
//!
//! The one trait the checkout core needs from an external payment processor:
//! open a hosted checkout session, resolve a charge back to its session, and
//! authenticate + decode webhook deliveries into [`GatewayEvent`].
//!
//! Gateway payloads are decoded exactly once, at this boundary, into a closed
//! tagged union; everything past the boundary matches on variants, never on
//! raw JSON.

use crate::error::ShopResult;
use crate::money::Price;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// One line of a session-creation request
#[derive(Debug, Clone, Serialize)]
pub struct SessionLineItem {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Discounted unit price in minor units
    pub unit_amount: Price,
    pub quantity: u32,
}

/// Checkout context carried as session metadata, so the webhook path can
/// recover it without a second database join key
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutContext {
    pub user_id: Uuid,
    pub address_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion_code_id: Option<Uuid>,
}

/// Everything the gateway needs to open a hosted checkout session
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub line_items: Vec<SessionLineItem>,
    pub success_url: String,
    pub cancel_url: String,
    pub context: CheckoutContext,
}

/// A freshly opened gateway session
#[derive(Debug, Clone)]
pub struct GatewaySession {
    /// Opaque gateway reference; becomes the order's `payment_ref`
    pub session_id: String,
    /// Where to send the shopper
    pub redirect_url: String,
}

/// Gateway webhook deliveries, decoded once at the boundary.
/// Unknown types land in `Unhandled` instead of breaking the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// The shopper completed the hosted checkout; authoritative for payment
    CheckoutCompleted {
        session_id: String,
        payment_status: String,
    },
    /// The session lapsed without payment
    CheckoutExpired { session_id: String },
    /// The gateway reported the session's payment as failed
    PaymentFailed { session_id: String },
    /// A charge changed state; informational mirror only
    ChargeUpdated { charge_id: String, status: String },
    /// Anything this system does not recognize
    Unhandled { raw_type: String },
}

impl GatewayEvent {
    /// Short label for logging
    pub fn kind(&self) -> &str {
        match self {
            GatewayEvent::CheckoutCompleted { .. } => "checkout_completed",
            GatewayEvent::CheckoutExpired { .. } => "checkout_expired",
            GatewayEvent::PaymentFailed { .. } => "payment_failed",
            GatewayEvent::ChargeUpdated { .. } => "charge_updated",
            GatewayEvent::Unhandled { .. } => "unhandled",
        }
    }
}

/// Core trait for the external payment processor
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted checkout session and return its redirect handle.
    /// Implementations must bound this call with a timeout; a timeout is a
    /// failure of the step, not a hung checkout.
    async fn create_checkout_session(&self, request: &SessionRequest)
        -> ShopResult<GatewaySession>;

    /// Resolve a charge id back to the checkout-session id it paid for,
    /// if the gateway knows of one
    async fn session_for_charge(&self, charge_id: &str) -> ShopResult<Option<String>>;

    /// Verify a webhook delivery's signature and decode the event
    fn verify_webhook(&self, payload: &[u8], signature: &str) -> ShopResult<GatewayEvent>;

    /// Get the provider name (for logging and routing)
    fn name(&self) -> &'static str;
}

/// Type alias for an injected gateway handle (dynamic dispatch)
pub type BoxedPaymentGateway = Arc<dyn PaymentGateway>;

/// Redirect URLs handed to the gateway at session creation
#[derive(Debug, Clone)]
pub struct CheckoutUrls {
    /// Base URL of the storefront (e.g., "https://shop.example.com")
    pub base_url: String,
    /// Success page path
    pub success_path: String,
    /// Cancel page path
    pub cancel_path: String,
}

impl CheckoutUrls {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            success_path: "/checkout/success".to_string(),
            cancel_path: "/checkout/cancel".to_string(),
        }
    }

    pub fn success_url(&self) -> String {
        format!("{}{}", self.base_url, self.success_path)
    }

    pub fn cancel_url(&self) -> String {
        format!("{}{}", self.base_url, self.cancel_path)
    }
}

impl Default for CheckoutUrls {
    fn default() -> Self {
        Self::new("http://localhost:3000")
    }
}
