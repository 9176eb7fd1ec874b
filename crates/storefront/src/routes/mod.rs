//! HTTP route handlers for the storefront API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                              - Liveness check
//! GET  /health/ready                        - Readiness check (pings the database)
//!
//! # Catalog
//! GET  /api/ebooks                          - Catalog listing
//! GET  /api/ebooks/{id}                     - Ebook detail
//!
//! # Cart
//! GET    /api/cart/{user_id}                - List a user's cart
//! POST   /api/cart                          - Add an ebook to a cart
//! DELETE /api/cart/{user_id}/{ebook_id}     - Remove an ebook from a cart
//!
//! # Checkout
//! POST /api/checkout/webpay                 - Start a Webpay checkout
//! POST /api/checkout/mercadopago            - Start a MercadoPago checkout
//!
//! # Payment confirmation
//! POST /api/payments/webpay/confirm         - Commit a Webpay transaction (token_ws)
//! POST /api/payments/mercadopago/confirm    - Confirm a MercadoPago redirect
//! POST /api/payments/mercadopago/webhook    - MercadoPago webhook receiver
//!
//! # Reader
//! POST /api/reader/access                   - Redeem a guest access code
//! ```

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod payments;
pub mod reader;

use axum::{
    Json, Router,
    extract::State,
    routing::{delete, get, post},
};
use serde_json::json;

use crate::error::Result;
use crate::state::AppState;

/// Create the catalog routes router.
pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(catalog::index))
        .route("/{id}", get(catalog::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(cart::add))
        .route("/{user_id}", get(cart::index))
        .route("/{user_id}/{ebook_id}", delete(cart::remove))
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/webpay", post(checkout::webpay))
        .route("/mercadopago", post(checkout::mercadopago))
}

/// Create the payment confirmation routes router.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/webpay/confirm", post(payments::webpay_confirm))
        .route("/mercadopago/confirm", post(payments::mercadopago_confirm))
        .route("/mercadopago/webhook", post(payments::mercadopago_webhook))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
        .nest("/api/ebooks", catalog_routes())
        .nest("/api/cart", cart_routes())
        .nest("/api/checkout", checkout_routes())
        .nest("/api/payments", payment_routes())
        .route("/api/reader/access", post(reader::access))
}

/// Build the full application router over the given state.
///
/// Used by both the binary and the end-to-end tests; the binary stacks
/// the Sentry layers on top.
pub fn app(state: AppState) -> Router {
    routes()
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness check.
async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Readiness check: verifies the database is reachable.
async fn ready(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    state.store().ping().await?;
    Ok(Json(json!({ "status": "ready" })))
}
