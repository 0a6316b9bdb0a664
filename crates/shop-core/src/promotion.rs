//! # Promotion Validator
//!
//! Stateless rules over promotion codes: is this code usable, by this user,
//! right now, and at what discount. Reads never mutate; the only write is
//! [`PromotionValidator::record_usage`], which is idempotent per (code, user).

use crate::error::{ShopError, ShopResult};
use crate::model::PromotionStatus;
use crate::store::{PromotionStore, UsageInsert};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// A code that passed validation, with the discount it grants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidPromotion {
    pub id: Uuid,
    pub code: String,
    pub discount_percentage: u8,
}

#[derive(Clone)]
pub struct PromotionValidator {
    store: Arc<dyn PromotionStore>,
}

impl PromotionValidator {
    pub fn new(store: Arc<dyn PromotionStore>) -> Self {
        Self { store }
    }

    /// Check that `code` exists, is inside its validity window at `now`,
    /// and is switched on. Pure read.
    pub async fn validate(&self, code: &str, now: DateTime<Utc>) -> ShopResult<ValidPromotion> {
        let promo = self
            .store
            .promotion_by_code(code)
            .await?
            .ok_or_else(|| ShopError::PromotionNotFound { code: code.into() })?;

        if now < promo.starts_at {
            return Err(ShopError::PromotionNotYetActive { code: code.into() });
        }
        if now > promo.ends_at {
            return Err(ShopError::PromotionExpired { code: code.into() });
        }
        if promo.status != PromotionStatus::Active {
            return Err(ShopError::PromotionInactive { code: code.into() });
        }

        Ok(ValidPromotion {
            id: promo.id,
            code: promo.code,
            discount_percentage: promo.discount_percentage,
        })
    }

    /// Pure read: has `user_id` already consumed `code`? A pre-flight for
    /// clients only; the write-time guard is [`Self::record_usage`].
    pub async fn check_usage(&self, code: &str, user_id: Uuid) -> ShopResult<bool> {
        let promo = self
            .store
            .promotion_by_code(code)
            .await?
            .ok_or_else(|| ShopError::PromotionNotFound { code: code.into() })?;
        self.store.usage_exists(promo.id, user_id).await
    }

    /// Record that `user_id` consumed the code. Replays report
    /// [`UsageInsert::AlreadyUsed`] instead of failing.
    pub async fn record_usage(
        &self,
        promotion_code_id: Uuid,
        user_id: Uuid,
    ) -> ShopResult<UsageInsert> {
        self.store.insert_usage(promotion_code_id, user_id).await
    }
}
