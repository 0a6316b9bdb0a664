//! # Shop Error Types
//!
//! Typed error handling for the checkout and reconciliation core.
//! All fallible operations return `Result<T, ShopError>`.

use thiserror::Error;
use uuid::Uuid;

/// Core error type for checkout, inventory and reconciliation operations
#[derive(Debug, Error)]
pub enum ShopError {
    /// Configuration errors (missing keys, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    Validation(String),

    /// None of the selected cart lines belong to the requesting user
    #[error("No cart lines matched the selection")]
    EmptySelection,

    /// Promotion code unknown
    #[error("Promotion code not found: {code}")]
    PromotionNotFound { code: String },

    /// Promotion code exists but its window has not opened yet
    #[error("Promotion code not yet active: {code}")]
    PromotionNotYetActive { code: String },

    /// Promotion code exists but its window has closed
    #[error("Promotion code expired: {code}")]
    PromotionExpired { code: String },

    /// Promotion code has been disabled
    #[error("Promotion code inactive: {code}")]
    PromotionInactive { code: String },

    /// Inventory record missing for a cart line
    #[error("Inventory not found: {inventory_id}")]
    InventoryNotFound { inventory_id: Uuid },

    /// Conditional stock decrement lost the race or stock was short
    #[error("Insufficient stock for inventory {inventory_id}")]
    InsufficientStock { inventory_id: Uuid },

    /// Order lookup failed during reconciliation
    #[error("Order not found for payment reference: {payment_ref}")]
    OrderNotFound { payment_ref: String },

    /// Payment gateway API error
    #[error("Gateway error [{provider}]: {message}")]
    Gateway { provider: String, message: String },

    /// Network/HTTP error communicating with the gateway
    #[error("Network error: {0}")]
    Network(String),

    /// Webhook signature verification failed
    #[error("Webhook verification failed: {0}")]
    WebhookVerificationFailed(String),

    /// Webhook payload parsing error
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Data store unavailable or misbehaving
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShopError {
    /// Returns true if the caller may retry the same request as-is
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ShopError::Network(_) | ShopError::Storage(_) | ShopError::Gateway { .. }
        )
    }

    /// Returns true for the promotion-validation failures that a checkout
    /// absorbs as "no discount applied" instead of aborting
    pub fn is_promotion_rejection(&self) -> bool {
        matches!(
            self,
            ShopError::PromotionNotFound { .. }
                | ShopError::PromotionNotYetActive { .. }
                | ShopError::PromotionExpired { .. }
                | ShopError::PromotionInactive { .. }
        )
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            ShopError::Configuration(_) => 500,
            ShopError::Validation(_) => 400,
            ShopError::EmptySelection => 404,
            ShopError::PromotionNotFound { .. } => 404,
            ShopError::PromotionNotYetActive { .. } => 400,
            ShopError::PromotionExpired { .. } => 400,
            ShopError::PromotionInactive { .. } => 400,
            ShopError::InventoryNotFound { .. } => 404,
            ShopError::InsufficientStock { .. } => 409,
            ShopError::OrderNotFound { .. } => 404,
            ShopError::Gateway { .. } => 502,
            ShopError::Network(_) => 503,
            ShopError::WebhookVerificationFailed(_) => 401,
            ShopError::WebhookParse(_) => 400,
            ShopError::Storage(_) => 503,
            ShopError::Serialization(_) => 500,
            ShopError::Internal(_) => 500,
        }
    }
}

/// Result type alias for shop operations
pub type ShopResult<T> = Result<T, ShopError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(ShopError::Network("timeout".into()).is_retryable());
        assert!(ShopError::Storage("pool exhausted".into()).is_retryable());
        assert!(!ShopError::EmptySelection.is_retryable());
        assert!(!ShopError::InsufficientStock {
            inventory_id: Uuid::nil()
        }
        .is_retryable());
    }

    #[test]
    fn test_promotion_rejections() {
        assert!(ShopError::PromotionExpired { code: "X".into() }.is_promotion_rejection());
        assert!(ShopError::PromotionInactive { code: "X".into() }.is_promotion_rejection());
        assert!(!ShopError::Storage("down".into()).is_promotion_rejection());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ShopError::EmptySelection.status_code(), 404);
        assert_eq!(
            ShopError::InsufficientStock {
                inventory_id: Uuid::nil()
            }
            .status_code(),
            409
        );
        assert_eq!(
            ShopError::Gateway {
                provider: "stripe".into(),
                message: "boom".into()
            }
            .status_code(),
            502
        );
        assert_eq!(
            ShopError::WebhookVerificationFailed("bad sig".into()).status_code(),
            401
        );
    }
}
