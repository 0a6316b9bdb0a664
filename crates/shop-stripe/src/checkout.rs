//! # Stripe Checkout Sessions
//!
//! Implementation of [`PaymentGateway`] over Stripe's Checkout Sessions API.
//! Sessions are created with dynamic `price_data` line items (the authoritative
//! discounted unit amounts computed by the orchestrator) and metadata carrying
//! the checkout context, so the webhook path can recover it without a second
//! database join key.

use crate::config::StripeConfig;
use crate::webhook;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use shop_core::{
    GatewayEvent, GatewaySession, PaymentGateway, SessionRequest, ShopError, ShopResult,
};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// Stripe Checkout Session gateway
///
/// Uses Stripe's hosted checkout page for secure payments.
pub struct StripeGateway {
    config: StripeConfig,
    client: Client,
}

impl StripeGateway {
    /// Create a new Stripe gateway. The client timeout bounds every call;
    /// a timed-out session creation fails that checkout step rather than
    /// leaving it hanging.
    pub fn new(config: StripeConfig) -> ShopResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ShopError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env() -> ShopResult<Self> {
        let config = StripeConfig::from_env()?;
        Self::new(config)
    }

    /// Build form data for the Checkout Sessions API
    fn build_form_params(&self, request: &SessionRequest) -> Vec<(String, String)> {
        let mut form_params: Vec<(String, String)> = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
        ];

        for (i, item) in request.line_items.iter().enumerate() {
            form_params.push((
                format!("line_items[{}][price_data][currency]", i),
                item.unit_amount.currency.as_str().to_string(),
            ));
            form_params.push((
                format!("line_items[{}][price_data][unit_amount]", i),
                item.unit_amount.amount.to_string(),
            ));
            form_params.push((
                format!("line_items[{}][price_data][product_data][name]", i),
                item.name.clone(),
            ));
            if let Some(ref url) = item.image_url {
                form_params.push((
                    format!("line_items[{}][price_data][product_data][images][0]", i),
                    url.clone(),
                ));
            }
            form_params.push((
                format!("line_items[{}][quantity]", i),
                item.quantity.to_string(),
            ));
        }

        form_params.push((
            "metadata[user_id]".to_string(),
            request.context.user_id.to_string(),
        ));
        form_params.push((
            "metadata[address_id]".to_string(),
            request.context.address_id.to_string(),
        ));
        if let Some(promotion_code_id) = request.context.promotion_code_id {
            form_params.push((
                "metadata[promotion_code_id]".to_string(),
                promotion_code_id.to_string(),
            ));
        }

        form_params
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> ShopResult<T> {
        let response = self
            .client
            .get(url)
            .header("Authorization", self.config.auth_header())
            .header("Stripe-Version", &self.config.api_version)
            .send()
            .await
            .map_err(|e| ShopError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ShopError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(provider_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            ShopError::Serialization(format!("Failed to parse Stripe response: {}", e))
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(lines = request.line_items.len()))]
    async fn create_checkout_session(
        &self,
        request: &SessionRequest,
    ) -> ShopResult<GatewaySession> {
        if request.line_items.is_empty() {
            return Err(ShopError::Validation("Session has no line items".to_string()));
        }

        let form_params = self.build_form_params(request);
        debug!(lines = request.line_items.len(), "creating Stripe checkout session");

        let url = format!("{}/v1/checkout/sessions", self.config.api_base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", self.config.auth_header())
            .header("Stripe-Version", &self.config.api_version)
            .header("Idempotency-Key", Uuid::new_v4().to_string())
            .form(&form_params)
            .send()
            .await
            .map_err(|e| ShopError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ShopError::Network(e.to_string()))?;

        if !status.is_success() {
            error!("Stripe API error: status={}, body={}", status, body);
            return Err(provider_error(status.as_u16(), &body));
        }

        let session: StripeCheckoutSessionResponse = serde_json::from_str(&body).map_err(|e| {
            ShopError::Serialization(format!("Failed to parse Stripe response: {}", e))
        })?;

        info!(session_id = %session.id, "created Stripe checkout session");

        Ok(GatewaySession {
            session_id: session.id,
            redirect_url: session.url,
        })
    }

    /// Resolve a charge to its checkout session: charge -> payment intent ->
    /// session list filtered by that intent
    #[instrument(skip(self))]
    async fn session_for_charge(&self, charge_id: &str) -> ShopResult<Option<String>> {
        let charge: StripeCharge = self
            .get_json(&format!(
                "{}/v1/charges/{}",
                self.config.api_base_url, charge_id
            ))
            .await?;

        let Some(payment_intent) = charge.payment_intent else {
            debug!(charge_id, "charge carries no payment intent");
            return Ok(None);
        };

        let sessions: StripeSessionList = self
            .get_json(&format!(
                "{}/v1/checkout/sessions?payment_intent={}&limit=1",
                self.config.api_base_url, payment_intent
            ))
            .await?;

        Ok(sessions.data.into_iter().next().map(|s| s.id))
    }

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> ShopResult<GatewayEvent> {
        webhook::verify_and_decode(&self.config.webhook_secret, payload, signature)
    }

    fn name(&self) -> &'static str {
        "stripe"
    }
}

fn provider_error(status: u16, body: &str) -> ShopError {
    if let Ok(error_response) = serde_json::from_str::<StripeErrorResponse>(body) {
        return ShopError::Gateway {
            provider: "stripe".to_string(),
            message: error_response.error.message,
        };
    }
    ShopError::Gateway {
        provider: "stripe".to_string(),
        message: format!("HTTP {}: {}", status, body),
    }
}

// =============================================================================
// Stripe API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct StripeCheckoutSessionResponse {
    id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct StripeCharge {
    #[serde(default)]
    payment_intent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeSessionList {
    #[serde(default)]
    data: Vec<StripeSessionRef>,
}

#[derive(Debug, Deserialize)]
struct StripeSessionRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: String,
}
