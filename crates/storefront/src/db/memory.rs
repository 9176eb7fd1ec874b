//! In-memory implementation of the [`Store`] trait.
//!
//! Backs the unit and end-to-end tests; mirrors the Postgres semantics the
//! reconciler depends on (unique provider payment id, ambiguous external
//! reference detection) without a database.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use tintero_core::{EbookId, PurchaseId, PurchaseStatus, UserId};

use super::{RepositoryError, Store};
use crate::models::{CartItem, Ebook, GuestAccessCredential, Profile, Purchase};

#[derive(Default)]
struct Inner {
    ebooks: Vec<Ebook>,
    profiles: Vec<Profile>,
    cart: Vec<CartItem>,
    purchases: Vec<Purchase>,
    credentials: Vec<GuestAccessCredential>,
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an ebook.
    pub fn add_ebook(&self, ebook: Ebook) {
        self.lock().ebooks.push(ebook);
    }

    /// Seed a profile.
    pub fn add_profile(&self, profile: Profile) {
        self.lock().profiles.push(profile);
    }

    /// Seed a cart item.
    pub fn add_cart_item_sync(&self, item: CartItem) {
        self.lock().cart.push(item);
    }

    /// Seed a purchase directly, bypassing checkout.
    pub fn add_purchase(&self, purchase: Purchase) {
        self.lock().purchases.push(purchase);
    }

    /// Seed a guest access credential.
    pub fn add_credential(&self, credential: GuestAccessCredential) {
        self.lock().credentials.push(credential);
    }

    /// Make every subsequent write fail, to exercise persistence-error
    /// paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of a purchase by id.
    #[must_use]
    pub fn purchase_snapshot(&self, id: &PurchaseId) -> Option<Purchase> {
        self.lock().purchases.iter().find(|p| &p.id == id).cloned()
    }

    /// Number of cart items currently stored for a user.
    #[must_use]
    pub fn cart_len(&self, user_id: &UserId) -> usize {
        self.lock()
            .cart
            .iter()
            .filter(|item| &item.user_id == user_id)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store lock poisoned")
    }

    fn check_writable(&self) -> Result<(), RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn list_ebooks(&self) -> Result<Vec<Ebook>, RepositoryError> {
        let mut ebooks = self.lock().ebooks.clone();
        ebooks.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(ebooks)
    }

    async fn get_ebook(&self, id: &EbookId) -> Result<Option<Ebook>, RepositoryError> {
        Ok(self.lock().ebooks.iter().find(|e| &e.id == id).cloned())
    }

    async fn get_profile(&self, id: &UserId) -> Result<Option<Profile>, RepositoryError> {
        Ok(self.lock().profiles.iter().find(|p| &p.id == id).cloned())
    }

    async fn list_cart(&self, user_id: &UserId) -> Result<Vec<CartItem>, RepositoryError> {
        Ok(self
            .lock()
            .cart
            .iter()
            .filter(|item| &item.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn add_cart_item(
        &self,
        user_id: &UserId,
        ebook_id: &EbookId,
    ) -> Result<(), RepositoryError> {
        self.check_writable()?;
        let mut inner = self.lock();
        let exists = inner
            .cart
            .iter()
            .any(|item| &item.user_id == user_id && &item.ebook_id == ebook_id);
        if !exists {
            inner.cart.push(CartItem {
                user_id: user_id.clone(),
                ebook_id: ebook_id.clone(),
                added_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn remove_cart_item(
        &self,
        user_id: &UserId,
        ebook_id: &EbookId,
    ) -> Result<bool, RepositoryError> {
        self.check_writable()?;
        let mut inner = self.lock();
        let before = inner.cart.len();
        inner
            .cart
            .retain(|item| !(&item.user_id == user_id && &item.ebook_id == ebook_id));
        Ok(inner.cart.len() < before)
    }

    async fn insert_purchase(&self, purchase: &Purchase) -> Result<(), RepositoryError> {
        self.check_writable()?;
        let mut inner = self.lock();
        if inner.purchases.iter().any(|p| p.id == purchase.id) {
            return Err(RepositoryError::Conflict(
                "purchase id already exists".to_owned(),
            ));
        }
        inner.purchases.push(purchase.clone());
        Ok(())
    }

    async fn insert_guest_credential(
        &self,
        credential: &GuestAccessCredential,
    ) -> Result<(), RepositoryError> {
        self.check_writable()?;
        self.lock().credentials.push(credential.clone());
        Ok(())
    }

    async fn get_purchase(&self, id: &PurchaseId) -> Result<Option<Purchase>, RepositoryError> {
        Ok(self.purchase_snapshot(id))
    }

    async fn find_registered_by_external_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Purchase>, RepositoryError> {
        let inner = self.lock();
        let matches: Vec<&Purchase> = inner
            .purchases
            .iter()
            .filter(|p| {
                !p.owner.is_guest() && p.external_reference.as_deref() == Some(reference)
            })
            .collect();

        if matches.len() > 1 {
            return Err(RepositoryError::DataCorruption(format!(
                "external reference {reference} matches {} purchases",
                matches.len()
            )));
        }
        Ok(matches.first().map(|p| (*p).clone()))
    }

    async fn find_by_provider_payment_id(
        &self,
        payment_id: &str,
    ) -> Result<Option<Purchase>, RepositoryError> {
        Ok(self
            .lock()
            .purchases
            .iter()
            .find(|p| p.provider_payment_id.as_deref() == Some(payment_id))
            .cloned())
    }

    async fn find_guest_purchase(
        &self,
        id: &PurchaseId,
    ) -> Result<Option<Purchase>, RepositoryError> {
        Ok(self
            .lock()
            .purchases
            .iter()
            .find(|p| &p.id == id && p.owner.is_guest())
            .cloned())
    }

    async fn apply_payment_result(
        &self,
        id: &PurchaseId,
        status: PurchaseStatus,
        provider_payment_id: &str,
        _raw_payload: &serde_json::Value,
    ) -> Result<(), RepositoryError> {
        self.check_writable()?;
        let mut inner = self.lock();

        // Emulate the unique index on provider_payment_id.
        if inner.purchases.iter().any(|p| {
            &p.id != id && p.provider_payment_id.as_deref() == Some(provider_payment_id)
        }) {
            return Err(RepositoryError::Conflict(format!(
                "provider payment id {provider_payment_id} already recorded"
            )));
        }

        let purchase = inner
            .purchases
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or(RepositoryError::NotFound)?;

        // Emulate the pending-only conditional update.
        if purchase.status.is_terminal() {
            return Err(RepositoryError::Conflict(format!(
                "purchase {id} is no longer pending"
            )));
        }

        purchase.status = status;
        purchase.provider_payment_id = Some(provider_payment_id.to_owned());
        purchase.updated_at = Utc::now();
        Ok(())
    }

    async fn get_guest_credential(
        &self,
        purchase_id: &PurchaseId,
    ) -> Result<Option<GuestAccessCredential>, RepositoryError> {
        Ok(self
            .lock()
            .credentials
            .iter()
            .find(|c| &c.purchase_id == purchase_id)
            .cloned())
    }
}
