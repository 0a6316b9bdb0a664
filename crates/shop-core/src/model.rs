//! # Domain Records
//!
//! The persisted shapes the checkout pipeline works over: cart lines,
//! inventory, promotion codes and their usage marks, orders and order items.

use crate::money::Price;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A line the shopper has placed in their cart but not yet checked out.
/// Deleted once it has been converted into an [`OrderItem`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    pub id: Uuid,

    /// Owning user; selections are always scoped to this id
    pub user_id: Uuid,

    pub product_id: String,

    /// The stock record this line draws from
    pub inventory_id: Uuid,

    pub quantity: u32,
}

/// Per-SKU stock record. `stock` is mutated only through the reserve/release
/// operations on the inventory store and can never go negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub id: Uuid,

    pub product_id: String,

    /// Display name (denormalized, forwarded to gateway line items)
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    pub unit_price: Price,

    pub stock: u32,
}

/// Whether a promotion code is currently switched on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionStatus {
    Active,
    Inactive,
}

/// A discount code. Read-only during checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionCode {
    pub id: Uuid,

    /// Unique, user-facing code string
    pub code: String,

    /// Whole-number percentage, 0..=100
    pub discount_percentage: u8,

    pub starts_at: DateTime<Utc>,

    pub ends_at: DateTime<Utc>,

    pub status: PromotionStatus,
}

/// Marks that a user has consumed a promotion code. At most one row
/// exists per (code, user) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PromotionUsage {
    pub promotion_code_id: Uuid,
    pub user_id: Uuid,
}

/// Order lifecycle. `Pending` is the only initial state; the other three
/// are terminal. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// An order created by a checkout. `payment_ref` is the gateway session id
/// and the unique join key the reconciler uses to find the order again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,

    pub user_id: Uuid,

    pub address_id: Uuid,

    /// Gateway checkout-session id; unique across orders
    pub payment_ref: String,

    /// Flipped false -> true at most once, by the reconciler only
    pub is_paid: bool,

    pub status: OrderStatus,

    /// Free-text mirror of the gateway's payment status string
    pub payment_status: String,

    /// Authoritative total computed server-side at checkout time
    pub total: Price,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion_code_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Create a fresh pending order for a newly opened gateway session
    pub fn pending(
        user_id: Uuid,
        address_id: Uuid,
        payment_ref: impl Into<String>,
        total: Price,
        promotion_code_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            address_id,
            payment_ref: payment_ref.into(),
            is_paid: false,
            status: OrderStatus::Pending,
            payment_status: "unpaid".to_string(),
            total,
            promotion_code_id,
            created_at: Utc::now(),
        }
    }
}

/// A priced line inside an order. Immutable once created; `unit_price` is
/// captured at checkout time and never re-derived from inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub order_id: Uuid,
    pub product_id: String,
    pub inventory_id: Uuid,
    pub quantity: u32,
    pub unit_price: Price,
}

impl OrderItem {
    /// Total for this line
    pub fn line_total(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;

    #[test]
    fn test_pending_order_defaults() {
        let order = Order::pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "cs_test_123",
            Price::from_minor(9_000, Currency::USD),
            None,
        );

        assert_eq!(order.status, OrderStatus::Pending);
        assert!(!order.is_paid);
        assert_eq!(order.payment_status, "unpaid");
        assert_eq!(order.payment_ref, "cs_test_123");
    }

    #[test]
    fn test_terminal_states() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(OrderStatus::Paid.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
    }

    #[test]
    fn test_order_item_line_total() {
        let item = OrderItem {
            order_id: Uuid::new_v4(),
            product_id: "sku-1".into(),
            inventory_id: Uuid::new_v4(),
            quantity: 3,
            unit_price: Price::from_minor(1_000, Currency::USD),
        };
        assert_eq!(item.line_total().amount, 3_000);
    }
}
