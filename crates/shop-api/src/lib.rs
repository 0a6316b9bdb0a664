//! # shop-api
//!
//! HTTP API layer for shopflow-rs.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - The checkout endpoint and promotion lookup endpoints
//! - The Stripe webhook endpoint driving order reconciliation
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | POST | `/api/v1/checkout` | Run a checkout |
//! | GET | `/api/v1/promotions/:code` | Validate a promotion code |
//! | GET | `/api/v1/promotions/:code/usage` | Promotion usage pre-flight |
//! | POST | `/webhook/stripe` | Stripe webhook |

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::{AppConfig, AppState};
