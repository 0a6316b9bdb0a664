//! # Checkout Orchestrator
//!
//! Turns a shopper's selected cart lines into a reserved, priced, pending
//! order plus a gateway redirect handle. The sequence is all-or-nothing up to
//! session creation: every mutation registers its compensation, and the first
//! failure unwinds them newest-first so no checkout is left half-applied.
//!
//! The client's `amount_to_pay` is a display-consistency check only; the
//! charge amount is always recomputed here from inventory price, quantity and
//! discount.

use crate::error::{ShopError, ShopResult};
use crate::gateway::{
    BoxedPaymentGateway, CheckoutContext, CheckoutUrls, PaymentGateway, SessionLineItem,
    SessionRequest,
};
use crate::inventory::InventoryLedger;
use crate::model::{CartLine, InventoryRecord, Order, OrderItem};
use crate::money::Price;
use crate::orders::OrderLedger;
use crate::promotion::{PromotionValidator, ValidPromotion};
use crate::saga::Compensations;
use crate::store::{CartStore, UsageInsert};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

/// Inbound checkout request
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: Uuid,
    pub address_id: Uuid,
    pub selected_item_ids: Vec<Uuid>,
    #[serde(default)]
    pub promotion_code: Option<String>,
    /// Client-computed total in minor units; checked against the server
    /// total for display consistency, never trusted for charging
    #[serde(default)]
    pub amount_to_pay: Option<i64>,
}

/// What happened to the promotion code the shopper supplied.
/// A rejected code does not abort the checkout; it checks out at full price
/// and the rejection is surfaced here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PromotionOutcome {
    NotRequested,
    Applied { code: String, discount_percentage: u8 },
    Rejected { code: String, reason: String },
}

/// Successful checkout result
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReceipt {
    pub order_id: Uuid,
    /// Where to send the shopper to pay
    pub redirect_url: String,
    /// Authoritative server-side total
    pub total: Price,
    pub promotion: PromotionOutcome,
}

#[derive(Clone)]
pub struct CheckoutOrchestrator {
    carts: Arc<dyn CartStore>,
    inventory: InventoryLedger,
    orders: OrderLedger,
    promotions: PromotionValidator,
    gateway: BoxedPaymentGateway,
    urls: CheckoutUrls,
}

impl CheckoutOrchestrator {
    pub fn new(
        carts: Arc<dyn CartStore>,
        inventory: InventoryLedger,
        orders: OrderLedger,
        promotions: PromotionValidator,
        gateway: BoxedPaymentGateway,
        urls: CheckoutUrls,
    ) -> Self {
        Self {
            carts,
            inventory,
            orders,
            promotions,
            gateway,
            urls,
        }
    }

    /// Run a full checkout for one request
    #[instrument(skip(self, request), fields(user_id = %request.user_id, lines = request.selected_item_ids.len()))]
    pub async fn checkout(&self, request: CheckoutRequest) -> ShopResult<CheckoutReceipt> {
        // Selection is scoped to the requesting user; foreign line ids
        // simply do not match.
        let lines = self
            .carts
            .lines_for_user(request.user_id, &request.selected_item_ids)
            .await?;
        if lines.is_empty() {
            return Err(ShopError::EmptySelection);
        }

        let (promotion, applied) = self
            .resolve_promotion(request.promotion_code.as_deref())
            .await?;
        let discount = applied.as_ref().map(|v| v.discount_percentage).unwrap_or(0);

        let mut comp = Compensations::new();

        // Reserve every line or none of them.
        let mut priced: Vec<(CartLine, InventoryRecord)> = Vec::with_capacity(lines.len());
        for line in lines {
            let record = match self.inventory.record(line.inventory_id).await {
                Ok(record) => record,
                Err(err) => {
                    comp.unwind().await;
                    return Err(err);
                }
            };
            if let Err(err) = self.inventory.reserve(line.inventory_id, line.quantity).await {
                comp.unwind().await;
                return Err(err);
            }
            let ledger = self.inventory.clone();
            let (inventory_id, quantity) = (line.inventory_id, line.quantity);
            comp.push("release reserved stock", async move {
                if let Err(err) = ledger.release(inventory_id, quantity).await {
                    error!(%inventory_id, quantity, error = %err, "failed to release reservation");
                }
            });
            priced.push((line, record));
        }

        // Authoritative pricing: discounted unit price per line, half-up.
        let currency = priced[0].1.unit_price.currency;
        let mut line_items = Vec::with_capacity(priced.len());
        let mut total = Price::from_minor(0, currency);
        for (line, record) in &priced {
            if record.unit_price.currency != currency {
                comp.unwind().await;
                return Err(ShopError::Validation(
                    "cart mixes currencies; one currency per checkout".to_string(),
                ));
            }
            let unit = record.unit_price.with_discount_percent(discount);
            total.amount += unit.times(line.quantity).amount;
            line_items.push(SessionLineItem {
                name: record.name.clone(),
                image_url: record.image_url.clone(),
                unit_amount: unit,
                quantity: line.quantity,
            });
        }
        if let Some(claimed) = request.amount_to_pay {
            if claimed != total.amount {
                warn!(
                    claimed,
                    computed = total.amount,
                    "client-computed amount differs from server total; server total wins"
                );
            }
        }

        let session_request = SessionRequest {
            line_items,
            success_url: self.urls.success_url(),
            cancel_url: self.urls.cancel_url(),
            context: CheckoutContext {
                user_id: request.user_id,
                address_id: request.address_id,
                promotion_code_id: applied.as_ref().map(|v| v.id),
            },
        };
        let session = match self.gateway.create_checkout_session(&session_request).await {
            Ok(session) => session,
            Err(err) => {
                comp.unwind().await;
                return Err(err);
            }
        };

        // From here the gateway session exists and cannot be un-created; a
        // persistence failure leaves it to surface as an orphaned payment.
        let order = Order::pending(
            request.user_id,
            request.address_id,
            session.session_id.clone(),
            total.clone(),
            applied.as_ref().map(|v| v.id),
        );
        let order_id = order.id;
        let items: Vec<OrderItem> = priced
            .iter()
            .map(|(line, record)| OrderItem {
                order_id,
                product_id: line.product_id.clone(),
                inventory_id: line.inventory_id,
                quantity: line.quantity,
                unit_price: record.unit_price.with_discount_percent(discount),
            })
            .collect();
        if let Err(err) = self.orders.create(order, items).await {
            warn!(
                session_id = %session.session_id,
                "order persistence failed after session creation; the session may surface later as an orphaned payment"
            );
            comp.unwind().await;
            return Err(err);
        }

        // Advisory from here on: the order exists and the shopper has a
        // redirect, so failures log instead of failing the checkout.
        if let Some(valid) = &applied {
            match self.promotions.record_usage(valid.id, request.user_id).await {
                Ok(UsageInsert::Recorded) => {}
                Ok(UsageInsert::AlreadyUsed) => {
                    debug!(code = %valid.code, "promotion usage already recorded")
                }
                Err(err) => {
                    warn!(code = %valid.code, error = %err, "failed to record promotion usage")
                }
            }
        }

        let consumed: Vec<Uuid> = priced.iter().map(|(line, _)| line.id).collect();
        if let Err(err) = self.carts.remove_lines(&consumed).await {
            warn!(error = %err, "failed to delete consumed cart lines");
        }

        Ok(CheckoutReceipt {
            order_id,
            redirect_url: session.redirect_url,
            total,
            promotion,
        })
    }

    /// Validate the supplied code, absorbing validation failures as
    /// "no discount applied" while surfacing them in the outcome
    async fn resolve_promotion(
        &self,
        code: Option<&str>,
    ) -> ShopResult<(PromotionOutcome, Option<ValidPromotion>)> {
        let Some(code) = code else {
            return Ok((PromotionOutcome::NotRequested, None));
        };
        match self.promotions.validate(code, Utc::now()).await {
            Ok(valid) => Ok((
                PromotionOutcome::Applied {
                    code: valid.code.clone(),
                    discount_percentage: valid.discount_percentage,
                },
                Some(valid),
            )),
            Err(err) if err.is_promotion_rejection() => {
                debug!(code, reason = %err, "promotion rejected; checking out at full price");
                Ok((
                    PromotionOutcome::Rejected {
                        code: code.to_string(),
                        reason: err.to_string(),
                    },
                    None,
                ))
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayEvent, GatewaySession, PaymentGateway};
    use crate::memory::MemoryStore;
    use crate::model::{OrderStatus, PromotionCode, PromotionStatus};
    use crate::money::Currency;
    use crate::store::{InventoryStore, OrderStore, PromotionStore};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Gateway stub: hands out session ids, optionally fails, captures
    /// every request it sees
    struct StubGateway {
        fail: AtomicBool,
        counter: AtomicUsize,
        requests: Mutex<Vec<SessionRequest>>,
    }

    impl StubGateway {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                fail: AtomicBool::new(false),
                counter: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn fail_next(&self) {
            self.fail.store(true, Ordering::SeqCst);
        }

        fn captured(&self) -> Vec<SessionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PaymentGateway for StubGateway {
        async fn create_checkout_session(
            &self,
            request: &SessionRequest,
        ) -> ShopResult<GatewaySession> {
            if self.fail.swap(false, Ordering::SeqCst) {
                return Err(ShopError::Gateway {
                    provider: "stub".into(),
                    message: "session creation refused".into(),
                });
            }
            self.requests.lock().unwrap().push(request.clone());
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(GatewaySession {
                session_id: format!("cs_stub_{}", n),
                redirect_url: format!("https://pay.stub.test/session/{}", n),
            })
        }

        async fn session_for_charge(&self, _charge_id: &str) -> ShopResult<Option<String>> {
            Ok(None)
        }

        fn verify_webhook(&self, _payload: &[u8], _signature: &str) -> ShopResult<GatewayEvent> {
            Err(ShopError::Internal("stub gateway has no webhooks".into()))
        }

        fn name(&self) -> &'static str {
            "stub"
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        gateway: Arc<StubGateway>,
        orchestrator: CheckoutOrchestrator,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let gateway = StubGateway::new();
        let orchestrator = CheckoutOrchestrator::new(
            Arc::clone(&store) as Arc<dyn CartStore>,
            InventoryLedger::new(Arc::clone(&store) as Arc<dyn InventoryStore>),
            OrderLedger::new(Arc::clone(&store) as Arc<dyn OrderStore>),
            PromotionValidator::new(Arc::clone(&store) as Arc<dyn PromotionStore>),
            Arc::clone(&gateway) as BoxedPaymentGateway,
            CheckoutUrls::new("https://shop.test"),
        );
        Fixture {
            store,
            gateway,
            orchestrator,
        }
    }

    fn seed_inventory(store: &MemoryStore, minor: i64, stock: u32) -> Uuid {
        let record = InventoryRecord {
            id: Uuid::new_v4(),
            product_id: "sku-1".into(),
            name: "Test SKU".into(),
            image_url: None,
            unit_price: Price::from_minor(minor, Currency::USD),
            stock,
        };
        let id = record.id;
        store.add_inventory(record).unwrap();
        id
    }

    fn seed_line(store: &MemoryStore, user_id: Uuid, inventory_id: Uuid, quantity: u32) -> Uuid {
        let line = CartLine {
            id: Uuid::new_v4(),
            user_id,
            product_id: "sku-1".into(),
            inventory_id,
            quantity,
        };
        let id = line.id;
        store.add_cart_line(line).unwrap();
        id
    }

    fn seed_save10(store: &MemoryStore) -> Uuid {
        let now = Utc::now();
        let promo = PromotionCode {
            id: Uuid::new_v4(),
            code: "SAVE10".into(),
            discount_percentage: 10,
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(1),
            status: PromotionStatus::Active,
        };
        let id = promo.id;
        store.add_promotion(promo).unwrap();
        id
    }

    fn request(user_id: Uuid, line_ids: Vec<Uuid>, code: Option<&str>) -> CheckoutRequest {
        CheckoutRequest {
            user_id,
            address_id: Uuid::new_v4(),
            selected_item_ids: line_ids,
            promotion_code: code.map(String::from),
            amount_to_pay: None,
        }
    }

    #[tokio::test]
    async fn test_discounted_checkout_scenario() {
        // stock=3, qty=1, $100.00, SAVE10 at 10% -> $90.00 total
        let f = fixture();
        let user = Uuid::new_v4();
        let inventory_id = seed_inventory(&f.store, 10_000, 3);
        let line_id = seed_line(&f.store, user, inventory_id, 1);
        let promo_id = seed_save10(&f.store);

        let receipt = f
            .orchestrator
            .checkout(request(user, vec![line_id], Some("SAVE10")))
            .await
            .unwrap();

        assert_eq!(receipt.total.amount, 9_000);
        assert!(matches!(
            receipt.promotion,
            PromotionOutcome::Applied { discount_percentage: 10, .. }
        ));
        assert_eq!(f.store.stock_of(inventory_id).unwrap(), Some(2));
        assert!(!f.store.cart_line_exists(line_id).unwrap());

        let order = f.store.order(receipt.order_id).unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(!order.is_paid);
        assert_eq!(order.total.amount, 9_000);
        assert_eq!(order.promotion_code_id, Some(promo_id));

        let items = f.store.items_for_order(receipt.order_id).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].unit_price.amount, 9_000);

        assert!(f.store.usage_exists(promo_id, user).await.unwrap());

        // gateway saw the discounted line and the checkout context
        let captured = f.gateway.captured();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].line_items[0].unit_amount.amount, 9_000);
        assert_eq!(captured[0].context.promotion_code_id, Some(promo_id));
    }

    #[tokio::test]
    async fn test_empty_selection_rejected() {
        let f = fixture();
        let err = f
            .orchestrator
            .checkout(request(Uuid::new_v4(), vec![Uuid::new_v4()], None))
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::EmptySelection));
    }

    #[tokio::test]
    async fn test_foreign_cart_lines_do_not_match() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let inventory_id = seed_inventory(&f.store, 1_000, 5);
        let line_id = seed_line(&f.store, owner, inventory_id, 1);

        // another user submits the owner's line id
        let err = f
            .orchestrator
            .checkout(request(Uuid::new_v4(), vec![line_id], None))
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::EmptySelection));
        assert_eq!(f.store.stock_of(inventory_id).unwrap(), Some(5));
        assert!(f.store.cart_line_exists(line_id).unwrap());
    }

    #[tokio::test]
    async fn test_invalid_promotion_checks_out_at_full_price() {
        let f = fixture();
        let user = Uuid::new_v4();
        let inventory_id = seed_inventory(&f.store, 10_000, 3);
        let line_id = seed_line(&f.store, user, inventory_id, 1);

        let receipt = f
            .orchestrator
            .checkout(request(user, vec![line_id], Some("NO-SUCH-CODE")))
            .await
            .unwrap();

        assert_eq!(receipt.total.amount, 10_000);
        assert!(matches!(
            receipt.promotion,
            PromotionOutcome::Rejected { .. }
        ));
        let order = f.store.order(receipt.order_id).unwrap().unwrap();
        assert_eq!(order.promotion_code_id, None);
    }

    #[tokio::test]
    async fn test_reservation_failure_rolls_back_all_lines() {
        let f = fixture();
        let user = Uuid::new_v4();
        let plentiful = seed_inventory(&f.store, 1_000, 10);
        let scarce = seed_inventory(&f.store, 2_000, 1);
        let line_a = seed_line(&f.store, user, plentiful, 2);
        let line_b = seed_line(&f.store, user, scarce, 3);

        let err = f
            .orchestrator
            .checkout(request(user, vec![line_a, line_b], None))
            .await
            .unwrap_err();

        assert!(matches!(err, ShopError::InsufficientStock { .. }));
        assert_eq!(f.store.stock_of(plentiful).unwrap(), Some(10));
        assert_eq!(f.store.stock_of(scarce).unwrap(), Some(1));
        assert_eq!(f.store.order_count().unwrap(), 0);
        assert!(f.store.cart_line_exists(line_a).unwrap());
        assert!(f.store.cart_line_exists(line_b).unwrap());
    }

    #[tokio::test]
    async fn test_gateway_failure_restores_stock_and_creates_nothing() {
        let f = fixture();
        let user = Uuid::new_v4();
        let inventory_id = seed_inventory(&f.store, 10_000, 3);
        let line_id = seed_line(&f.store, user, inventory_id, 2);

        f.gateway.fail_next();
        let err = f
            .orchestrator
            .checkout(request(user, vec![line_id], None))
            .await
            .unwrap_err();

        assert!(matches!(err, ShopError::Gateway { .. }));
        assert_eq!(f.store.stock_of(inventory_id).unwrap(), Some(3));
        assert_eq!(f.store.order_count().unwrap(), 0);
        assert!(f.store.cart_line_exists(line_id).unwrap());
    }

    #[tokio::test]
    async fn test_promotion_used_once_across_two_checkouts() {
        let f = fixture();
        let user = Uuid::new_v4();
        let inventory_id = seed_inventory(&f.store, 5_000, 10);
        let promo_id = seed_save10(&f.store);

        let first = seed_line(&f.store, user, inventory_id, 1);
        f.orchestrator
            .checkout(request(user, vec![first], Some("SAVE10")))
            .await
            .unwrap();

        let second = seed_line(&f.store, user, inventory_id, 1);
        let receipt = f
            .orchestrator
            .checkout(request(user, vec![second], Some("SAVE10")))
            .await
            .unwrap();

        // second checkout still succeeds; the usage row is not duplicated
        assert!(f.store.usage_exists(promo_id, user).await.unwrap());
        assert!(matches!(
            receipt.promotion,
            PromotionOutcome::Applied { .. }
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_race_for_the_last_unit() {
        let f = fixture();
        let inventory_id = seed_inventory(&f.store, 7_500, 1);

        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();
        let line_a = seed_line(&f.store, user_a, inventory_id, 1);
        let line_b = seed_line(&f.store, user_b, inventory_id, 1);

        let orch_a = f.orchestrator.clone();
        let orch_b = f.orchestrator.clone();
        let (res_a, res_b) = tokio::join!(
            tokio::spawn(async move { orch_a.checkout(request(user_a, vec![line_a], None)).await }),
            tokio::spawn(async move { orch_b.checkout(request(user_b, vec![line_b], None)).await }),
        );
        let results = [res_a.unwrap(), res_b.unwrap()];

        let wins = results.iter().filter(|r| r.is_ok()).count();
        let losses = results
            .iter()
            .filter(|r| matches!(r, Err(ShopError::InsufficientStock { .. })))
            .count();
        assert_eq!(wins, 1);
        assert_eq!(losses, 1);
        assert_eq!(f.store.stock_of(inventory_id).unwrap(), Some(0));
        assert_eq!(f.store.order_count().unwrap(), 1);
    }
}
