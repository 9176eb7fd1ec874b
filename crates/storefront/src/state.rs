//! Application state shared across handlers.

use std::sync::Arc;

use secrecy::SecretString;

use tintero_core::CurrencyCode;

use crate::db::Store;
use crate::payments::{PaymentProvider, PaymentWorkflow};
use crate::services::mailer::ReceiptMailer;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources. Everything behind a trait object so tests can swap
/// in in-memory doubles.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Arc<dyn Store>,
    webpay: Arc<dyn PaymentProvider>,
    mercadopago: Arc<dyn PaymentProvider>,
    mailer: Arc<dyn ReceiptMailer>,
    base_url: String,
    currency: CurrencyCode,
    webhook_secret: Option<SecretString>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        webpay: Arc<dyn PaymentProvider>,
        mercadopago: Arc<dyn PaymentProvider>,
        mailer: Arc<dyn ReceiptMailer>,
        base_url: String,
        currency: CurrencyCode,
        webhook_secret: Option<SecretString>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                store,
                webpay,
                mercadopago,
                mailer,
                base_url: base_url.trim_end_matches('/').to_owned(),
                currency,
                webhook_secret,
            }),
        }
    }

    /// Get a reference to the persistence layer.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    /// Get a reference to the Webpay provider.
    #[must_use]
    pub fn webpay(&self) -> &dyn PaymentProvider {
        self.inner.webpay.as_ref()
    }

    /// Get a reference to the MercadoPago provider.
    #[must_use]
    pub fn mercadopago(&self) -> &dyn PaymentProvider {
        self.inner.mercadopago.as_ref()
    }

    /// Public base URL for building return and reader links.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Currency the catalog charges in.
    #[must_use]
    pub fn currency(&self) -> CurrencyCode {
        self.inner.currency
    }

    /// Shared secret expected on webhook deliveries, if configured.
    #[must_use]
    pub fn webhook_secret(&self) -> Option<&SecretString> {
        self.inner.webhook_secret.as_ref()
    }

    /// Build the payment workflow over this state's store and mailer.
    #[must_use]
    pub fn workflow(&self) -> PaymentWorkflow {
        PaymentWorkflow::new(
            self.inner.store.clone(),
            self.inner.mailer.clone(),
            self.inner.base_url.clone(),
        )
    }
}
