//! # Routes
//!
//! Axum router configuration for the shopflow API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - API:
///   - POST /api/v1/checkout - Run a checkout, returns the redirect URL
///   - GET  /api/v1/promotions/{code} - Validate a promotion code
///   - GET  /api/v1/promotions/{code}/usage?user_id= - Usage pre-flight
///
/// - Webhooks:
///   - POST /webhook/stripe - Stripe webhook handler (raw body)
///
/// - Static pages:
///   - GET /checkout/success - Success page
///   - GET /checkout/cancel - Cancel page
pub fn create_router(state: AppState) -> Router {
    // CORS is wide open; the storefront origin list belongs in deployment config
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Static success/cancel pages the gateway redirects back to
    let checkout_pages = Router::new()
        .route("/success", get(handlers::checkout_success))
        .route("/cancel", get(handlers::checkout_cancel));

    let api_routes = Router::new()
        .route("/checkout", post(handlers::create_checkout))
        .route("/promotions/{code}", get(handlers::validate_promotion))
        .route(
            "/promotions/{code}/usage",
            get(handlers::check_promotion_usage),
        );

    // Webhook routes (no CORS concerns, must accept raw body)
    let webhook_routes = Router::new().route("/stripe", post(handlers::stripe_webhook));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .nest("/checkout", checkout_pages)
        .nest("/api/v1", api_routes)
        .nest("/webhook", webhook_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
