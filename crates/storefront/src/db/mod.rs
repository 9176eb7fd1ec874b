//! Persistence layer for the storefront.
//!
//! # Tables
//!
//! - `profiles` - Registered users
//! - `ebooks` - Catalog
//! - `purchases` - One table for registered and guest purchases; the owner
//!   columns form a tagged union enforced by a CHECK constraint
//! - `guest_access_credentials` - Access codes for guest purchases
//! - `cart_items` - Ephemeral carts for registered users
//!
//! Webhook reconciliation is at-most-once under concurrent redelivery
//! because `apply_payment_result` only matches a purchase that is still
//! `pending`, and the unique index on `purchases.provider_payment_id`
//! rejects the same payment id on a second purchase. The reconciler treats
//! either rejection as "someone else already applied this event".
//!
//! # Migrations
//!
//! Migrations live in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p tintero-cli -- migrate
//! ```

pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use tintero_core::{EbookId, PurchaseId, PurchaseStatus, UserId};

use crate::models::{CartItem, Ebook, GuestAccessCredential, Profile, Purchase};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Underlying database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Stored data violates an invariant (e.g. ambiguous lookup results).
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// The targeted row does not exist.
    #[error("not found")]
    NotFound,
}

/// Storefront persistence operations.
///
/// Implemented by [`PgStore`] for production and [`MemoryStore`] for tests.
#[async_trait]
pub trait Store: Send + Sync {
    /// Check that the backing store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;

    // --- Catalog ---

    /// List the full catalog.
    async fn list_ebooks(&self) -> Result<Vec<Ebook>, RepositoryError>;

    /// Fetch one ebook.
    async fn get_ebook(&self, id: &EbookId) -> Result<Option<Ebook>, RepositoryError>;

    // --- Profiles ---

    /// Fetch a registered user's profile.
    async fn get_profile(&self, id: &UserId) -> Result<Option<Profile>, RepositoryError>;

    // --- Cart ---

    /// List a user's cart items.
    async fn list_cart(&self, user_id: &UserId) -> Result<Vec<CartItem>, RepositoryError>;

    /// Add an ebook to a user's cart. Adding the same ebook twice is a
    /// no-op.
    async fn add_cart_item(
        &self,
        user_id: &UserId,
        ebook_id: &EbookId,
    ) -> Result<(), RepositoryError>;

    /// Remove an ebook from a user's cart. Returns whether a row was
    /// deleted.
    async fn remove_cart_item(
        &self,
        user_id: &UserId,
        ebook_id: &EbookId,
    ) -> Result<bool, RepositoryError>;

    // --- Purchases ---

    /// Insert a new purchase row.
    async fn insert_purchase(&self, purchase: &Purchase) -> Result<(), RepositoryError>;

    /// Insert the access credential generated with a guest purchase.
    async fn insert_guest_credential(
        &self,
        credential: &GuestAccessCredential,
    ) -> Result<(), RepositoryError>;

    /// Fetch a purchase by id, registered or guest.
    async fn get_purchase(&self, id: &PurchaseId) -> Result<Option<Purchase>, RepositoryError>;

    /// Find a registered-user purchase by its external reference.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::DataCorruption`] if more than one row
    /// matches; ambiguous matches are never silently resolved.
    async fn find_registered_by_external_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Purchase>, RepositoryError>;

    /// Find any purchase by its provider payment id.
    async fn find_by_provider_payment_id(
        &self,
        payment_id: &str,
    ) -> Result<Option<Purchase>, RepositoryError>;

    /// Find a guest purchase by id.
    async fn find_guest_purchase(
        &self,
        id: &PurchaseId,
    ) -> Result<Option<Purchase>, RepositoryError>;

    /// Apply a reconciled payment result to a purchase: status, provider
    /// payment id, raw payload, `updated_at`. The write only matches a
    /// purchase that is still `pending`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Conflict`] if the provider payment id is
    /// already recorded on another purchase, or if the purchase is no
    /// longer pending (a concurrent delivery won the race either way), and
    /// [`RepositoryError::NotFound`] if the purchase row is gone.
    async fn apply_payment_result(
        &self,
        id: &PurchaseId,
        status: PurchaseStatus,
        provider_payment_id: &str,
        raw_payload: &serde_json::Value,
    ) -> Result<(), RepositoryError>;

    /// Fetch the access credential for a guest purchase.
    async fn get_guest_credential(
        &self,
        purchase_id: &PurchaseId,
    ) -> Result<Option<GuestAccessCredential>, RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
