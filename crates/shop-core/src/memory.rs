//! # In-Memory Store
//!
//! The in-process implementation of the data-access traits. One mutex guards
//! all tables, so every conditional update the traits specify is atomic here
//! exactly as it would be under a serializable transaction in a relational
//! store. Seed data loads from TOML the same way the catalog config does.

use crate::error::{ShopError, ShopResult};
use crate::model::{
    CartLine, InventoryRecord, Order, OrderItem, OrderStatus, PromotionCode, PromotionUsage,
};
use crate::store::{
    CartStore, InventoryStore, OrderStore, OrderTransition, PromotionStore, StockDecrement,
    UsageInsert,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Seed file shape (`config/shop.toml`)
#[derive(Debug, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub inventory: Vec<InventoryRecord>,
    #[serde(default)]
    pub promotions: Vec<PromotionCode>,
    #[serde(default)]
    pub cart_lines: Vec<CartLine>,
}

#[derive(Default)]
struct Tables {
    cart_lines: HashMap<Uuid, CartLine>,
    inventory: HashMap<Uuid, InventoryRecord>,
    promotions: HashMap<Uuid, PromotionCode>,
    usages: HashSet<PromotionUsage>,
    orders: HashMap<Uuid, Order>,
    order_items: Vec<OrderItem>,
}

/// In-memory transactional store
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated from a TOML seed document
    pub fn from_toml(toml_str: &str) -> ShopResult<Self> {
        let seed: SeedData = toml::from_str(toml_str)
            .map_err(|e| ShopError::Serialization(format!("invalid seed data: {}", e)))?;
        let store = Self::new();
        store.seed(seed)?;
        Ok(store)
    }

    /// Load a [`SeedData`] batch into the tables
    pub fn seed(&self, seed: SeedData) -> ShopResult<()> {
        let mut t = self.lock()?;
        for record in seed.inventory {
            t.inventory.insert(record.id, record);
        }
        for promo in seed.promotions {
            t.promotions.insert(promo.id, promo);
        }
        for line in seed.cart_lines {
            t.cart_lines.insert(line.id, line);
        }
        Ok(())
    }

    pub fn add_inventory(&self, record: InventoryRecord) -> ShopResult<()> {
        self.lock()?.inventory.insert(record.id, record);
        Ok(())
    }

    pub fn add_promotion(&self, promo: PromotionCode) -> ShopResult<()> {
        self.lock()?.promotions.insert(promo.id, promo);
        Ok(())
    }

    pub fn add_cart_line(&self, line: CartLine) -> ShopResult<()> {
        self.lock()?.cart_lines.insert(line.id, line);
        Ok(())
    }

    // ---- inspection (used by tests and startup logging) ----

    pub fn stock_of(&self, inventory_id: Uuid) -> ShopResult<Option<u32>> {
        Ok(self.lock()?.inventory.get(&inventory_id).map(|r| r.stock))
    }

    pub fn order(&self, order_id: Uuid) -> ShopResult<Option<Order>> {
        Ok(self.lock()?.orders.get(&order_id).cloned())
    }

    pub fn items_for_order(&self, order_id: Uuid) -> ShopResult<Vec<OrderItem>> {
        Ok(self
            .lock()?
            .order_items
            .iter()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }

    pub fn cart_line_exists(&self, line_id: Uuid) -> ShopResult<bool> {
        Ok(self.lock()?.cart_lines.contains_key(&line_id))
    }

    pub fn order_count(&self) -> ShopResult<usize> {
        Ok(self.lock()?.orders.len())
    }

    pub fn inventory_count(&self) -> ShopResult<usize> {
        Ok(self.lock()?.inventory.len())
    }

    pub fn promotion_count(&self) -> ShopResult<usize> {
        Ok(self.lock()?.promotions.len())
    }

    pub fn cart_line_count(&self) -> ShopResult<usize> {
        Ok(self.lock()?.cart_lines.len())
    }

    fn lock(&self) -> ShopResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| ShopError::Storage("store lock poisoned".to_string()))
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn lines_for_user(&self, user_id: Uuid, line_ids: &[Uuid]) -> ShopResult<Vec<CartLine>> {
        let t = self.lock()?;
        Ok(line_ids
            .iter()
            .filter_map(|id| t.cart_lines.get(id))
            .filter(|line| line.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn remove_lines(&self, line_ids: &[Uuid]) -> ShopResult<()> {
        let mut t = self.lock()?;
        for id in line_ids {
            t.cart_lines.remove(id);
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn record(&self, inventory_id: Uuid) -> ShopResult<Option<InventoryRecord>> {
        Ok(self.lock()?.inventory.get(&inventory_id).cloned())
    }

    async fn decrement_stock_if_available(
        &self,
        inventory_id: Uuid,
        quantity: u32,
    ) -> ShopResult<StockDecrement> {
        let mut t = self.lock()?;
        match t.inventory.get_mut(&inventory_id) {
            None => Ok(StockDecrement::NotFound),
            Some(record) if record.stock >= quantity => {
                record.stock -= quantity;
                Ok(StockDecrement::Reserved)
            }
            Some(_) => Ok(StockDecrement::Insufficient),
        }
    }

    async fn restore_stock(&self, inventory_id: Uuid, quantity: u32) -> ShopResult<()> {
        let mut t = self.lock()?;
        match t.inventory.get_mut(&inventory_id) {
            Some(record) => {
                record.stock += quantity;
                Ok(())
            }
            None => Err(ShopError::InventoryNotFound { inventory_id }),
        }
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: Order, items: Vec<OrderItem>) -> ShopResult<()> {
        let mut t = self.lock()?;
        if t.orders
            .values()
            .any(|o| o.payment_ref == order.payment_ref)
        {
            return Err(ShopError::Storage(format!(
                "duplicate payment ref: {}",
                order.payment_ref
            )));
        }
        t.order_items.extend(items);
        t.orders.insert(order.id, order);
        Ok(())
    }

    async fn order_by_payment_ref(&self, payment_ref: &str) -> ShopResult<Option<Order>> {
        Ok(self
            .lock()?
            .orders
            .values()
            .find(|o| o.payment_ref == payment_ref)
            .cloned())
    }

    async fn transition_from_pending(
        &self,
        order_id: Uuid,
        to: OrderStatus,
        payment_status: &str,
    ) -> ShopResult<OrderTransition> {
        let mut t = self.lock()?;
        match t.orders.get_mut(&order_id) {
            None => Ok(OrderTransition::NotFound),
            Some(order) if order.status == OrderStatus::Pending => {
                order.status = to;
                order.is_paid = to == OrderStatus::Paid;
                order.payment_status = payment_status.to_string();
                Ok(OrderTransition::Applied)
            }
            Some(order) => Ok(OrderTransition::AlreadySettled(order.status)),
        }
    }

    async fn mirror_payment_status(&self, order_id: Uuid, payment_status: &str) -> ShopResult<()> {
        let mut t = self.lock()?;
        match t.orders.get_mut(&order_id) {
            Some(order) => {
                order.payment_status = payment_status.to_string();
                Ok(())
            }
            None => Err(ShopError::OrderNotFound {
                payment_ref: order_id.to_string(),
            }),
        }
    }
}

#[async_trait]
impl PromotionStore for MemoryStore {
    async fn promotion_by_code(&self, code: &str) -> ShopResult<Option<PromotionCode>> {
        Ok(self
            .lock()?
            .promotions
            .values()
            .find(|p| p.code == code)
            .cloned())
    }

    async fn usage_exists(&self, promotion_code_id: Uuid, user_id: Uuid) -> ShopResult<bool> {
        Ok(self.lock()?.usages.contains(&PromotionUsage {
            promotion_code_id,
            user_id,
        }))
    }

    async fn insert_usage(
        &self,
        promotion_code_id: Uuid,
        user_id: Uuid,
    ) -> ShopResult<UsageInsert> {
        let mut t = self.lock()?;
        if t.usages.insert(PromotionUsage {
            promotion_code_id,
            user_id,
        }) {
            Ok(UsageInsert::Recorded)
        } else {
            Ok(UsageInsert::AlreadyUsed)
        }
    }
}
