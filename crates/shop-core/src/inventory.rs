//! # Inventory Ledger
//!
//! Reservation and release of per-SKU stock. A reservation is a conditional
//! decrement evaluated against current persisted state: no in-process stock
//! cache to go stale, and no read-then-write window for two checkouts to
//! slip through.

use crate::error::{ShopError, ShopResult};
use crate::model::InventoryRecord;
use crate::store::{InventoryStore, StockDecrement};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct InventoryLedger {
    store: Arc<dyn InventoryStore>,
}

impl InventoryLedger {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    /// Fetch the inventory record backing a cart line
    pub async fn record(&self, inventory_id: Uuid) -> ShopResult<InventoryRecord> {
        self.store
            .record(inventory_id)
            .await?
            .ok_or(ShopError::InventoryNotFound { inventory_id })
    }

    /// Reserve `quantity` units: decrement stock iff enough remains
    pub async fn reserve(&self, inventory_id: Uuid, quantity: u32) -> ShopResult<()> {
        match self
            .store
            .decrement_stock_if_available(inventory_id, quantity)
            .await?
        {
            StockDecrement::Reserved => {
                debug!(%inventory_id, quantity, "reserved stock");
                Ok(())
            }
            StockDecrement::Insufficient => Err(ShopError::InsufficientStock { inventory_id }),
            StockDecrement::NotFound => Err(ShopError::InventoryNotFound { inventory_id }),
        }
    }

    /// Compensating action for [`Self::reserve`]
    pub async fn release(&self, inventory_id: Uuid, quantity: u32) -> ShopResult<()> {
        debug!(%inventory_id, quantity, "releasing reserved stock");
        self.store.restore_stock(inventory_id, quantity).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::money::{Currency, Price};

    fn ledger_with_stock(stock: u32) -> (InventoryLedger, Arc<MemoryStore>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let record = InventoryRecord {
            id: Uuid::new_v4(),
            product_id: "sku-1".into(),
            name: "Test SKU".into(),
            image_url: None,
            unit_price: Price::from_minor(1_000, Currency::USD),
            stock,
        };
        let id = record.id;
        store.add_inventory(record).unwrap();
        let ledger = InventoryLedger::new(Arc::clone(&store) as Arc<dyn InventoryStore>);
        (ledger, store, id)
    }

    #[tokio::test]
    async fn test_reserve_then_release_round_trips() {
        let (ledger, store, id) = ledger_with_stock(5);

        ledger.reserve(id, 3).await.unwrap();
        assert_eq!(store.stock_of(id).unwrap(), Some(2));

        ledger.release(id, 3).await.unwrap();
        assert_eq!(store.stock_of(id).unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_reserve_refuses_short_stock() {
        let (ledger, store, id) = ledger_with_stock(2);

        let err = ledger.reserve(id, 3).await.unwrap_err();
        assert!(matches!(err, ShopError::InsufficientStock { .. }));
        // refused reservation leaves stock untouched
        assert_eq!(store.stock_of(id).unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_reserve_unknown_inventory() {
        let (ledger, _store, _id) = ledger_with_stock(1);
        let err = ledger.reserve(Uuid::new_v4(), 1).await.unwrap_err();
        assert!(matches!(err, ShopError::InventoryNotFound { .. }));
    }
}
