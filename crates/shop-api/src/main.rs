//! # Shopflow
//!
//! Checkout, payment hand-off and webhook reconciliation service.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export STRIPE_SECRET_KEY=sk_test_...
//! export STRIPE_WEBHOOK_SECRET=whsec_...
//!
//! # Run the server
//! shopflow
//! ```

use shop_api::{routes, state::AppState};
use shop_core::PaymentGateway;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    print_banner();

    // Initialize application state
    let state = AppState::new()?;

    let addr = state.config.socket_addr()?;
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!(
        "Seeded: {} inventory records, {} promotions",
        state.store.inventory_count().unwrap_or(0),
        state.store.promotion_count().unwrap_or(0)
    );
    info!("Payment gateway: {}", state.gateway.name());

    // Create router
    let app = routes::create_router(state);

    // Start server
    info!("Shopflow starting on http://{}", addr);

    if !is_prod {
        info!("Checkout: POST http://{}/api/v1/checkout", addr);
        info!("Webhook:  POST http://{}/webhook/stripe", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
  Shopflow RS
  ━━━━━━━━━━━━━━━━━━━━━━━
  Checkout & reconciliation service
  Version: {}

"#,
        env!("CARGO_PKG_VERSION")
    );
}
