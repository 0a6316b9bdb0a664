//! # Application State
//!
//! Shared state for the axum application. The store client, ledgers,
//! orchestrator and reconciler are all constructed here and injected;
//! lifecycle belongs to the process entry point, nothing is ambient.

use shop_core::{
    BoxedPaymentGateway, CartStore, CheckoutOrchestrator, CheckoutUrls, InventoryLedger,
    InventoryStore, MemoryStore, OrderLedger, OrderStore, PromotionStore, PromotionValidator,
    WebhookReconciler,
};
use shop_stripe::StripeGateway;
use std::sync::Arc;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Base URL for redirect callbacks
    pub base_url: String,
    /// Environment (development, staging, production)
    pub environment: String,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            base_url: std::env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Checkout pipeline entry point
    pub orchestrator: CheckoutOrchestrator,
    /// Webhook settlement
    pub reconciler: WebhookReconciler,
    /// Promotion lookups (pure reads)
    pub promotions: PromotionValidator,
    /// Payment gateway handle
    pub gateway: BoxedPaymentGateway,
    /// Store handle, kept for startup logging
    pub store: Arc<MemoryStore>,
    /// Application config
    pub config: AppConfig,
}

impl AppState {
    /// Create state with the Stripe gateway and seed data from config
    pub fn new() -> anyhow::Result<Self> {
        let config = AppConfig::from_env();
        let store = Arc::new(load_seed_data()?);
        let gateway: BoxedPaymentGateway = Arc::new(
            StripeGateway::from_env()
                .map_err(|e| anyhow::anyhow!("Failed to initialize Stripe: {}", e))?,
        );
        Ok(Self::assemble(store, gateway, config))
    }

    /// Wire the components over an explicit store and gateway
    pub fn assemble(
        store: Arc<MemoryStore>,
        gateway: BoxedPaymentGateway,
        config: AppConfig,
    ) -> Self {
        let urls = CheckoutUrls::new(&config.base_url);
        let inventory = InventoryLedger::new(Arc::clone(&store) as Arc<dyn InventoryStore>);
        let orders = OrderLedger::new(Arc::clone(&store) as Arc<dyn OrderStore>);
        let promotions = PromotionValidator::new(Arc::clone(&store) as Arc<dyn PromotionStore>);

        let orchestrator = CheckoutOrchestrator::new(
            Arc::clone(&store) as Arc<dyn CartStore>,
            inventory,
            orders.clone(),
            promotions.clone(),
            Arc::clone(&gateway),
            urls,
        );
        let reconciler = WebhookReconciler::new(orders, Arc::clone(&gateway));

        Self {
            orchestrator,
            reconciler,
            promotions,
            gateway,
            store,
            config,
        }
    }
}

/// Load seed data from the config file
fn load_seed_data() -> anyhow::Result<MemoryStore> {
    let config_paths = [
        "config/shop.toml",
        "../config/shop.toml",
        "../../config/shop.toml",
    ];

    for path in config_paths {
        if let Ok(content) = std::fs::read_to_string(path) {
            let store = MemoryStore::from_toml(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
            tracing::info!(
                "Loaded {} inventory records, {} promotions, {} cart lines from {}",
                store.inventory_count().unwrap_or(0),
                store.promotion_count().unwrap_or(0),
                store.cart_line_count().unwrap_or(0),
                path
            );
            return Ok(store);
        }
    }

    tracing::warn!("No seed data found, starting with an empty store");
    Ok(MemoryStore::new())
}
