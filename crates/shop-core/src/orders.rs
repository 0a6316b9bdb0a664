//! # Order Ledger
//!
//! Owns order records and their status lifecycle:
//! `Pending -> Paid | Cancelled | Failed`, all three terminal. Settling is a
//! conditional update ("set X where status is pending") so duplicate and
//! out-of-order webhook deliveries converge on the same end state.

use crate::error::{ShopError, ShopResult};
use crate::model::{Order, OrderItem, OrderStatus};
use crate::store::{OrderStore, OrderTransition};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct OrderLedger {
    store: Arc<dyn OrderStore>,
}

impl OrderLedger {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Persist a pending order and its items in one transaction
    pub async fn create(&self, order: Order, items: Vec<OrderItem>) -> ShopResult<()> {
        if order.status != OrderStatus::Pending {
            return Err(ShopError::Internal(format!(
                "orders are created pending, got {}",
                order.status
            )));
        }
        let order_id = order.id;
        let payment_ref = order.payment_ref.clone();
        self.store.insert_order(order, items).await?;
        info!(%order_id, %payment_ref, "order created");
        Ok(())
    }

    /// Look an order up by the gateway session id it was checked out under
    pub async fn by_payment_ref(&self, payment_ref: &str) -> ShopResult<Option<Order>> {
        self.store.order_by_payment_ref(payment_ref).await
    }

    /// Drive a pending order into a terminal state, mirroring the gateway's
    /// payment-status string. Safe to replay: an order that already settled
    /// reports its current state instead of transitioning again.
    pub async fn settle(
        &self,
        order_id: Uuid,
        to: OrderStatus,
        payment_status: &str,
    ) -> ShopResult<OrderTransition> {
        if !to.is_terminal() {
            return Err(ShopError::Internal(
                "settle only moves orders into terminal states".to_string(),
            ));
        }
        let outcome = self
            .store
            .transition_from_pending(order_id, to, payment_status)
            .await?;
        if outcome == OrderTransition::Applied {
            info!(%order_id, status = %to, payment_status, "order settled");
        }
        Ok(outcome)
    }

    /// Update only the mirrored gateway status string; never touches
    /// `status` or `is_paid`
    pub async fn mirror_payment_status(
        &self,
        order_id: Uuid,
        payment_status: &str,
    ) -> ShopResult<()> {
        self.store
            .mirror_payment_status(order_id, payment_status)
            .await
    }
}
