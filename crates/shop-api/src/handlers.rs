//! # Request Handlers
//!
//! Axum request handlers for checkout, promotion lookups and the Stripe
//! webhook. Handlers translate `ShopError` into HTTP via its status mapping;
//! the webhook handler acknowledges every business outcome and reserves
//! non-2xx responses for verification failures and infrastructure trouble,
//! so the gateway's redelivery is only triggered when a retry can help.

use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use shop_core::{CheckoutReceipt, CheckoutRequest, PaymentGateway, ShopError};
use tracing::{error, info, instrument};
use uuid::Uuid;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Details returned by the promotion validate endpoint
#[derive(Debug, Serialize)]
pub struct PromotionDetails {
    pub code: String,
    pub discount_percentage: u8,
}

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub user_id: Uuid,
}

/// Usage pre-flight response
#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub code: String,
    pub user_id: Uuid,
    pub used: bool,
}

fn shop_error_response(err: ShopError) -> (StatusCode, Json<ErrorResponse>) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorResponse::new(err.to_string())))
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "shopflow",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Run a checkout: reserve stock, price the order, open a gateway session
#[instrument(skip(state, request), fields(user_id = %request.user_id, lines = request.selected_item_ids.len()))]
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutReceipt>, (StatusCode, Json<ErrorResponse>)> {
    let receipt = state.orchestrator.checkout(request).await.map_err(|e| {
        error!("Checkout failed: {}", e);
        shop_error_response(e)
    })?;

    info!(order_id = %receipt.order_id, "checkout complete, handing off to gateway");
    Ok(Json(receipt))
}

/// Validate a promotion code right now (pure read)
#[instrument(skip(state))]
pub async fn validate_promotion(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<PromotionDetails>, (StatusCode, Json<ErrorResponse>)> {
    let valid = state
        .promotions
        .validate(&code, Utc::now())
        .await
        .map_err(shop_error_response)?;

    Ok(Json(PromotionDetails {
        code: valid.code,
        discount_percentage: valid.discount_percentage,
    }))
}

/// Pre-flight: has this user already consumed the code? (pure read)
#[instrument(skip(state))]
pub async fn check_promotion_usage(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<UsageResponse>, (StatusCode, Json<ErrorResponse>)> {
    let used = state
        .promotions
        .check_usage(&code, query.user_id)
        .await
        .map_err(shop_error_response)?;

    Ok(Json(UsageResponse {
        code,
        user_id: query.user_id,
        used,
    }))
}

/// Handle a Stripe webhook delivery
#[instrument(skip(state, headers, body))]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Missing Stripe-Signature header")),
            )
        })?;

    let event = state
        .gateway
        .verify_webhook(&body, signature)
        .map_err(|e| {
            error!("Webhook verification failed: {}", e);
            shop_error_response(e)
        })?;

    info!(kind = event.kind(), "received webhook");

    let ack = state.reconciler.handle(event).await.map_err(|e| {
        // store/gateway trouble: not acknowledged, the sender should retry
        error!("Webhook processing failed: {}", e);
        shop_error_response(e)
    })?;

    info!(?ack, "webhook acknowledged");
    Ok(StatusCode::OK)
}

/// Checkout success page
pub async fn checkout_success(
    Query(params): Query<std::collections::HashMap<String, String>>,
) -> impl IntoResponse {
    let session_id = params
        .get("session_id")
        .map(|s| s.as_str())
        .unwrap_or("unknown");
    axum::response::Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Payment Successful</title></head>
<body style="font-family: system-ui; text-align: center; padding-top: 10vh;">
    <h1>Payment received</h1>
    <p>Session: <code>{}</code></p>
    <p>Your order will be confirmed as soon as the payment settles.</p>
</body>
</html>
"#,
        session_id
    ))
}

/// Checkout cancel page
pub async fn checkout_cancel() -> impl IntoResponse {
    axum::response::Html(
        r#"<!DOCTYPE html>
<html>
<head><title>Payment Cancelled</title></head>
<body style="font-family: system-ui; text-align: center; padding-top: 10vh;">
    <h1>Payment cancelled</h1>
    <p>No charges were made. Your cart is untouched.</p>
</body>
</html>
"#,
    )
}
