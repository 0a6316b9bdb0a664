//! # Webhook Reconciler
//!
//! Brings internal order state in line with the gateway's view, one decoded
//! event at a time. Deliveries may be late, duplicated or out of order;
//! everything here converges instead of erroring. The only failure a caller
//! should turn into a non-acknowledgement is infrastructure trouble (store or
//! gateway unreachable). Business outcomes like "no such order" are
//! acknowledged so the sender stops redelivering something this system can
//! never apply.

use crate::error::ShopResult;
use crate::gateway::{BoxedPaymentGateway, GatewayEvent, PaymentGateway};
use crate::model::OrderStatus;
use crate::orders::OrderLedger;
use crate::store::OrderTransition;
use tracing::{debug, info, instrument, warn};

/// How a delivery was disposed of. All variants are acknowledgements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// The event changed order state
    Processed,
    /// The order had already settled; replay converged as a no-op
    AlreadySettled,
    /// The event referenced a session/charge no order matches
    Orphaned,
    /// Event type this system does not act on
    Ignored,
}

#[derive(Clone)]
pub struct WebhookReconciler {
    orders: OrderLedger,
    gateway: BoxedPaymentGateway,
}

impl WebhookReconciler {
    pub fn new(orders: OrderLedger, gateway: BoxedPaymentGateway) -> Self {
        Self { orders, gateway }
    }

    /// Apply one decoded gateway event to the order ledger
    #[instrument(skip(self, event), fields(kind = event.kind()))]
    pub async fn handle(&self, event: GatewayEvent) -> ShopResult<Ack> {
        match event {
            GatewayEvent::CheckoutCompleted {
                session_id,
                payment_status,
            } => {
                self.settle(&session_id, OrderStatus::Paid, &payment_status)
                    .await
            }
            GatewayEvent::CheckoutExpired { session_id } => {
                self.settle(&session_id, OrderStatus::Cancelled, "expired")
                    .await
            }
            GatewayEvent::PaymentFailed { session_id } => {
                self.settle(&session_id, OrderStatus::Failed, "failed").await
            }
            GatewayEvent::ChargeUpdated { charge_id, status } => {
                self.mirror_charge(&charge_id, &status).await
            }
            GatewayEvent::Unhandled { raw_type } => {
                info!(raw_type, "unhandled gateway event type acknowledged");
                Ok(Ack::Ignored)
            }
        }
    }

    /// Conditional settle keyed by the gateway session id. A session no
    /// order matches is an orphaned payment: logged, acknowledged, done.
    /// The sender cannot undo a completed payment.
    async fn settle(
        &self,
        session_id: &str,
        to: OrderStatus,
        payment_status: &str,
    ) -> ShopResult<Ack> {
        let Some(order) = self.orders.by_payment_ref(session_id).await? else {
            warn!(session_id, target = %to, "orphaned payment: no order matches session");
            return Ok(Ack::Orphaned);
        };

        match self.orders.settle(order.id, to, payment_status).await? {
            OrderTransition::Applied => Ok(Ack::Processed),
            OrderTransition::AlreadySettled(current) if current == to => {
                debug!(order_id = %order.id, status = %current, "duplicate delivery converged");
                Ok(Ack::AlreadySettled)
            }
            OrderTransition::AlreadySettled(current) => {
                warn!(
                    order_id = %order.id,
                    current = %current,
                    requested = %to,
                    "conflicting delivery for settled order ignored"
                );
                Ok(Ack::AlreadySettled)
            }
            OrderTransition::NotFound => {
                warn!(session_id, "order vanished between lookup and settle");
                Ok(Ack::Orphaned)
            }
        }
    }

    /// `charge.updated` only refreshes the mirrored payment-status string;
    /// it never moves the state machine. The charge is resolved back to a
    /// session id through the gateway.
    async fn mirror_charge(&self, charge_id: &str, status: &str) -> ShopResult<Ack> {
        let Some(session_id) = self.gateway.session_for_charge(charge_id).await? else {
            warn!(charge_id, "charge resolves to no checkout session");
            return Ok(Ack::Orphaned);
        };
        let Some(order) = self.orders.by_payment_ref(&session_id).await? else {
            warn!(charge_id, session_id, "charge's session matches no order");
            return Ok(Ack::Orphaned);
        };

        self.orders.mirror_payment_status(order.id, status).await?;
        debug!(order_id = %order.id, status, "mirrored charge status");
        Ok(Ack::Processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ShopError, ShopResult};
    use crate::gateway::{GatewaySession, PaymentGateway, SessionRequest};
    use crate::memory::MemoryStore;
    use crate::model::Order;
    use crate::money::{Currency, Price};
    use crate::store::OrderStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    /// Gateway stub that only answers charge lookups
    struct LookupGateway {
        charges: Mutex<HashMap<String, String>>,
    }

    impl LookupGateway {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                charges: Mutex::new(HashMap::new()),
            })
        }

        fn map_charge(&self, charge_id: &str, session_id: &str) {
            self.charges
                .lock()
                .unwrap()
                .insert(charge_id.into(), session_id.into());
        }
    }

    #[async_trait]
    impl PaymentGateway for LookupGateway {
        async fn create_checkout_session(
            &self,
            _request: &SessionRequest,
        ) -> ShopResult<GatewaySession> {
            Err(ShopError::Internal("lookup stub cannot create sessions".into()))
        }

        async fn session_for_charge(&self, charge_id: &str) -> ShopResult<Option<String>> {
            Ok(self.charges.lock().unwrap().get(charge_id).cloned())
        }

        fn verify_webhook(&self, _payload: &[u8], _signature: &str) -> ShopResult<GatewayEvent> {
            Err(ShopError::Internal("lookup stub has no webhooks".into()))
        }

        fn name(&self) -> &'static str {
            "stub"
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        gateway: Arc<LookupGateway>,
        reconciler: WebhookReconciler,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let gateway = LookupGateway::new();
        let reconciler = WebhookReconciler::new(
            OrderLedger::new(Arc::clone(&store) as Arc<dyn OrderStore>),
            Arc::clone(&gateway) as BoxedPaymentGateway,
        );
        Fixture {
            store,
            gateway,
            reconciler,
        }
    }

    async fn seed_pending(store: &Arc<MemoryStore>, session_id: &str) -> Uuid {
        let order = Order::pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            session_id,
            Price::from_minor(9_000, Currency::USD),
            None,
        );
        let id = order.id;
        store.insert_order(order, Vec::new()).await.unwrap();
        id
    }

    fn completed(session_id: &str) -> GatewayEvent {
        GatewayEvent::CheckoutCompleted {
            session_id: session_id.into(),
            payment_status: "paid".into(),
        }
    }

    #[tokio::test]
    async fn test_completed_marks_order_paid() {
        let f = fixture();
        let order_id = seed_pending(&f.store, "cs_1").await;

        let ack = f.reconciler.handle(completed("cs_1")).await.unwrap();
        assert_eq!(ack, Ack::Processed);

        let order = f.store.order(order_id).unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        assert!(order.is_paid);
        assert_eq!(order.payment_status, "paid");
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_idempotent() {
        let f = fixture();
        let order_id = seed_pending(&f.store, "cs_1").await;

        assert_eq!(
            f.reconciler.handle(completed("cs_1")).await.unwrap(),
            Ack::Processed
        );
        assert_eq!(
            f.reconciler.handle(completed("cs_1")).await.unwrap(),
            Ack::AlreadySettled
        );

        let order = f.store.order(order_id).unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        assert!(order.is_paid);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicates_converge() {
        let f = fixture();
        let order_id = seed_pending(&f.store, "cs_1").await;

        let r1 = f.reconciler.clone();
        let r2 = f.reconciler.clone();
        let (a, b) = tokio::join!(
            tokio::spawn(async move { r1.handle(completed("cs_1")).await }),
            tokio::spawn(async move { r2.handle(completed("cs_1")).await }),
        );
        let acks = [a.unwrap().unwrap(), b.unwrap().unwrap()];

        assert_eq!(acks.iter().filter(|a| **a == Ack::Processed).count(), 1);
        assert_eq!(
            acks.iter().filter(|a| **a == Ack::AlreadySettled).count(),
            1
        );
        assert!(f.store.order(order_id).unwrap().unwrap().is_paid);
    }

    #[tokio::test]
    async fn test_orphaned_completion_is_acknowledged() {
        let f = fixture();
        let ack = f.reconciler.handle(completed("cs_nobody")).await.unwrap();
        assert_eq!(ack, Ack::Orphaned);
        assert_eq!(f.store.order_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_cancels_pending_order() {
        let f = fixture();
        let order_id = seed_pending(&f.store, "cs_1").await;

        let ack = f
            .reconciler
            .handle(GatewayEvent::CheckoutExpired {
                session_id: "cs_1".into(),
            })
            .await
            .unwrap();
        assert_eq!(ack, Ack::Processed);

        let order = f.store.order(order_id).unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(!order.is_paid);
    }

    #[tokio::test]
    async fn test_late_expiry_cannot_unpay_an_order() {
        let f = fixture();
        let order_id = seed_pending(&f.store, "cs_1").await;

        f.reconciler.handle(completed("cs_1")).await.unwrap();
        let ack = f
            .reconciler
            .handle(GatewayEvent::CheckoutExpired {
                session_id: "cs_1".into(),
            })
            .await
            .unwrap();
        assert_eq!(ack, Ack::AlreadySettled);

        let order = f.store.order(order_id).unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        assert!(order.is_paid);
    }

    #[tokio::test]
    async fn test_charge_update_mirrors_without_settling() {
        let f = fixture();
        let order_id = seed_pending(&f.store, "cs_1").await;
        f.gateway.map_charge("ch_1", "cs_1");

        let ack = f
            .reconciler
            .handle(GatewayEvent::ChargeUpdated {
                charge_id: "ch_1".into(),
                status: "succeeded".into(),
            })
            .await
            .unwrap();
        assert_eq!(ack, Ack::Processed);

        let order = f.store.order(order_id).unwrap().unwrap();
        assert_eq!(order.payment_status, "succeeded");
        // mirror only: the state machine did not move
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(!order.is_paid);
    }

    #[tokio::test]
    async fn test_unresolvable_charge_is_acknowledged() {
        let f = fixture();
        let ack = f
            .reconciler
            .handle(GatewayEvent::ChargeUpdated {
                charge_id: "ch_unknown".into(),
                status: "succeeded".into(),
            })
            .await
            .unwrap();
        assert_eq!(ack, Ack::Orphaned);
    }

    #[tokio::test]
    async fn test_unhandled_event_is_acknowledged() {
        let f = fixture();
        let ack = f
            .reconciler
            .handle(GatewayEvent::Unhandled {
                raw_type: "invoice.paid".into(),
            })
            .await
            .unwrap();
        assert_eq!(ack, Ack::Ignored);
    }
}
