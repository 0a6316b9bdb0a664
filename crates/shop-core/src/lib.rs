//! # shop-core
//!
//! Core checkout and payment-reconciliation logic for shopflow.
//!
//! This crate provides:
//! - `CheckoutOrchestrator` for the cart -> reserved, priced order -> gateway
//!   session sequence, with reverse-order compensation on failure
//! - `InventoryLedger` and `OrderLedger` over injected data-access traits
//! - `PromotionValidator` for discount-code rules and idempotent usage marks
//! - `WebhookReconciler` for idempotent settlement from gateway events
//! - `PaymentGateway` trait and the decoded `GatewayEvent` union
//! - `MemoryStore`, an in-process implementation of the store traits
//!
//! ## Example
//!
//! ```rust,ignore
//! use shop_core::{CheckoutOrchestrator, CheckoutRequest, CheckoutUrls};
//!
//! let orchestrator = CheckoutOrchestrator::new(
//!     carts, inventory, orders, promotions, gateway,
//!     CheckoutUrls::new("https://shop.example.com"),
//! );
//!
//! let receipt = orchestrator.checkout(request).await?;
//! // Redirect the shopper to receipt.redirect_url; the webhook path
//! // settles the order later, keyed by the gateway session id.
//! ```

pub mod checkout;
pub mod error;
pub mod gateway;
pub mod inventory;
pub mod memory;
pub mod model;
pub mod money;
pub mod orders;
pub mod promotion;
pub mod reconcile;
pub mod saga;
pub mod store;

// Re-exports for convenience
pub use checkout::{CheckoutOrchestrator, CheckoutReceipt, CheckoutRequest, PromotionOutcome};
pub use error::{ShopError, ShopResult};
pub use gateway::{
    BoxedPaymentGateway, CheckoutContext, CheckoutUrls, GatewayEvent, GatewaySession,
    PaymentGateway, SessionLineItem, SessionRequest,
};
pub use inventory::InventoryLedger;
pub use memory::{MemoryStore, SeedData};
pub use model::{
    CartLine, InventoryRecord, Order, OrderItem, OrderStatus, PromotionCode, PromotionStatus,
    PromotionUsage,
};
pub use money::{Currency, Price};
pub use orders::OrderLedger;
pub use promotion::{PromotionValidator, ValidPromotion};
pub use reconcile::{Ack, WebhookReconciler};
pub use saga::Compensations;
pub use store::{
    CartStore, InventoryStore, OrderStore, OrderTransition, PromotionStore, StockDecrement,
    UsageInsert,
};
