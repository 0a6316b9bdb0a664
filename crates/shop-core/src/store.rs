//! # Data-Access Traits
//!
//! The seam between the checkout core and whatever transactional store backs
//! it. Components receive these as injected `Arc<dyn …>` handles; nothing in
//! the core reaches for a global connection.
//!
//! The contended operations are specified as *conditional updates* with an
//! explicit outcome enum ("decrement stock only if enough remains", "set
//! status only while still pending", "insert usage only if the pair is new").
//! An implementation must evaluate and apply them atomically, never as a
//! read-then-write pair.

use crate::error::ShopResult;
use crate::model::{CartLine, InventoryRecord, Order, OrderItem, OrderStatus, PromotionCode};
use async_trait::async_trait;
use uuid::Uuid;

/// Outcome of a conditional stock decrement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockDecrement {
    /// Stock was sufficient and has been decremented
    Reserved,
    /// Stock was short; nothing changed
    Insufficient,
    /// No such inventory record
    NotFound,
}

/// Outcome of a conditional order-status transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderTransition {
    /// The order was pending and has been moved to the requested state
    Applied,
    /// The order had already left `Pending`; nothing changed
    AlreadySettled(OrderStatus),
    /// No such order
    NotFound,
}

/// Outcome of recording a promotion usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageInsert {
    /// First usage for this (code, user) pair
    Recorded,
    /// The pair already existed; nothing changed
    AlreadyUsed,
}

/// Cart lines awaiting checkout
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Load the given cart lines, keeping only those owned by `user_id`.
    /// Ids that do not exist or belong to someone else are silently dropped.
    async fn lines_for_user(&self, user_id: Uuid, line_ids: &[Uuid]) -> ShopResult<Vec<CartLine>>;

    /// Delete cart lines that have been converted into order items
    async fn remove_lines(&self, line_ids: &[Uuid]) -> ShopResult<()>;
}

/// Per-SKU stock
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Fetch an inventory record (price, display fields, current stock)
    async fn record(&self, inventory_id: Uuid) -> ShopResult<Option<InventoryRecord>>;

    /// Atomically decrement stock by `quantity` iff `stock >= quantity`
    async fn decrement_stock_if_available(
        &self,
        inventory_id: Uuid,
        quantity: u32,
    ) -> ShopResult<StockDecrement>;

    /// Add `quantity` back to stock (compensation for a prior decrement)
    async fn restore_stock(&self, inventory_id: Uuid, quantity: u32) -> ShopResult<()>;
}

/// Orders and their line items
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist an order together with its items in one transaction, so a
    /// reader never observes the order without its lines
    async fn insert_order(&self, order: Order, items: Vec<OrderItem>) -> ShopResult<()>;

    /// Look an order up by its gateway session id
    async fn order_by_payment_ref(&self, payment_ref: &str) -> ShopResult<Option<Order>>;

    /// Atomically move an order out of `Pending` into `to`, setting
    /// `is_paid` when `to` is `Paid` and mirroring `payment_status`.
    /// A no-op unless the order is still pending.
    async fn transition_from_pending(
        &self,
        order_id: Uuid,
        to: OrderStatus,
        payment_status: &str,
    ) -> ShopResult<OrderTransition>;

    /// Overwrite only the mirrored gateway payment-status string
    async fn mirror_payment_status(&self, order_id: Uuid, payment_status: &str) -> ShopResult<()>;
}

/// Promotion codes and usage marks
#[async_trait]
pub trait PromotionStore: Send + Sync {
    async fn promotion_by_code(&self, code: &str) -> ShopResult<Option<PromotionCode>>;

    async fn usage_exists(&self, promotion_code_id: Uuid, user_id: Uuid) -> ShopResult<bool>;

    /// Record that `user_id` consumed the code; idempotent on replay
    async fn insert_usage(&self, promotion_code_id: Uuid, user_id: Uuid)
        -> ShopResult<UsageInsert>;
}
