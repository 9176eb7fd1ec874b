//! Payment provider abstraction.
//!
//! Each processor (Webpay, MercadoPago) implements [`PaymentProvider`]:
//! create a checkout for a pending purchase, and verify an inbound payment
//! reference against the provider's API, normalizing the provider-specific
//! status vocabulary into the canonical [`PurchaseStatus`].

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use tintero_core::{PaymentMethod, Price, PurchaseId, PurchaseStatus};

/// Timeout for all provider API calls. A timed-out verification is
/// indistinguishable from a provider outage and must not mutate any
/// purchase state.
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from a payment provider API.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network failure, timeout, or provider 5xx. Safe for the caller to
    /// retry: no purchase state was touched.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The provider rejected the request (4xx).
    #[error("provider API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The provider responded with something we could not interpret.
    #[error("unexpected provider response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}

/// Inbound payment reference from a confirmation redirect or webhook.
///
/// Which fields are present depends on the provider: Webpay confirmations
/// carry a token, MercadoPago webhooks carry a payment id, and redirect
/// confirmations may carry an external reference as well.
#[derive(Debug, Clone, Default)]
pub struct PaymentReference {
    /// Explicit external reference, when the caller already knows it.
    pub external_reference: Option<String>,
    /// Provider transaction token (Webpay `token_ws`).
    pub token: Option<String>,
    /// Provider payment id (MercadoPago `data.id`).
    pub provider_payment_id: Option<String>,
}

impl PaymentReference {
    /// Reference carrying only a transaction token.
    #[must_use]
    pub fn for_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    /// Reference carrying only a provider payment id.
    #[must_use]
    pub fn for_payment_id(payment_id: impl Into<String>) -> Self {
        Self {
            provider_payment_id: Some(payment_id.into()),
            ..Self::default()
        }
    }
}

/// A provider payment result normalized into canonical vocabulary.
#[derive(Debug, Clone)]
pub struct CanonicalPaymentResult {
    /// Provider's unique id for the payment.
    pub provider_payment_id: String,
    /// External reference echoed back by the provider, if any.
    pub external_reference: Option<String>,
    /// Canonical status.
    pub status: PurchaseStatus,
    /// Amount reported by the provider, converted to minor units.
    pub amount: Option<Price>,
    /// The provider's raw response, persisted for auditing.
    pub raw_payload: serde_json::Value,
}

/// What the storefront needs to start a checkout.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    /// The pending purchase being paid for.
    pub purchase_id: PurchaseId,
    /// Correlation string the provider will echo back.
    pub external_reference: String,
    /// Amount to charge.
    pub amount: Price,
    /// Ebook title, shown on the provider's payment page.
    pub title: String,
    /// Where the provider sends the buyer after paying.
    pub return_url: String,
}

/// Redirect information returned by a provider's create endpoint.
#[derive(Debug, Clone)]
pub struct CheckoutRedirect {
    /// URL the buyer must be sent to.
    pub url: String,
    /// Transaction token, when the provider uses one (Webpay).
    pub token: Option<String>,
}

/// A payment processor.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Which payment method this provider handles.
    fn method(&self) -> PaymentMethod;

    /// Create a checkout for a pending purchase.
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutRedirect, ProviderError>;

    /// Verify an inbound payment reference against the provider and return
    /// the normalized result. Must be side-effect free with respect to
    /// local state.
    async fn verify(
        &self,
        reference: &PaymentReference,
    ) -> Result<CanonicalPaymentResult, ProviderError>;
}

/// Normalize a provider status string into the canonical vocabulary.
///
/// Total over all inputs: anything unrecognized maps to `pending`, never to
/// `completed`. Covers both Webpay (`AUTHORIZED`, `FAILED`) and MercadoPago
/// (`approved`, `rejected`, `cancelled`) vocabularies.
#[must_use]
pub fn normalize_status(raw: &str) -> PurchaseStatus {
    match raw {
        "approved" | "AUTHORIZED" => PurchaseStatus::Completed,
        "rejected" | "cancelled" | "FAILED" => PurchaseStatus::Failed,
        _ => PurchaseStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_approved_vocabularies() {
        assert_eq!(normalize_status("approved"), PurchaseStatus::Completed);
        assert_eq!(normalize_status("AUTHORIZED"), PurchaseStatus::Completed);
    }

    #[test]
    fn test_normalize_failed_vocabularies() {
        assert_eq!(normalize_status("rejected"), PurchaseStatus::Failed);
        assert_eq!(normalize_status("cancelled"), PurchaseStatus::Failed);
        assert_eq!(normalize_status("FAILED"), PurchaseStatus::Failed);
    }

    #[test]
    fn test_normalize_unknown_is_pending_never_completed() {
        for raw in [
            "",
            "in_process",
            "in_mediation",
            "charged_back",
            "refunded",
            "APPROVED",   // wrong case for the MercadoPago vocabulary
            "authorized", // wrong case for the Webpay vocabulary
            "Approved",
            "success",
            "garbage",
        ] {
            assert_eq!(normalize_status(raw), PurchaseStatus::Pending, "raw={raw}");
        }
    }

    #[test]
    fn test_case_sensitivity_is_deliberate() {
        // Each provider's vocabulary is matched exactly; a lowercased
        // Webpay status is an unknown status, not a success.
        assert_ne!(normalize_status("authorized"), PurchaseStatus::Completed);
    }
}
