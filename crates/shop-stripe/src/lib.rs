//! # shop-stripe
//!
//! Stripe payment gateway client for shopflow-rs.
//!
//! Implements `shop_core::PaymentGateway` over the Checkout Sessions API:
//!
//! - **Session creation** with dynamic `price_data` line items and metadata
//!   carrying the checkout context
//! - **Webhook authentication** (HMAC-SHA256 signature, bounded timestamp,
//!   constant-time compare) and decoding into the `GatewayEvent` union
//! - **Charge resolution** for `charge.updated` reconciliation
//!   (charge -> payment intent -> checkout session)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shop_stripe::StripeGateway;
//! use shop_core::PaymentGateway;
//!
//! // Reads STRIPE_SECRET_KEY / STRIPE_WEBHOOK_SECRET
//! let gateway = StripeGateway::from_env()?;
//!
//! let session = gateway.create_checkout_session(&request).await?;
//! // Redirect the shopper to session.redirect_url
//! ```

pub mod checkout;
pub mod config;
pub mod webhook;

// Re-exports
pub use checkout::StripeGateway;
pub use config::StripeConfig;
pub use webhook::{decode_event, verify_and_decode, verify_signature};
