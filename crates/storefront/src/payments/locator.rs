//! Purchase locator.
//!
//! Resolves an inbound payment reference to exactly one purchase. The
//! external reference wins over the provider payment id, and a guest
//! reference is decoded before lookup so guest and registered purchases
//! are never confused.

use tracing::warn;

use tintero_core::ExternalReference;

use super::provider::PaymentReference;
use crate::db::{RepositoryError, Store};
use crate::models::Purchase;

/// Resolve a payment reference to its purchase.
///
/// Lookup order:
///
/// 1. external reference, decoded: a `GUEST-` reference is looked up by the
///    embedded purchase id, anything else by exact match on registered
///    purchases
/// 2. provider payment id, for redeliveries where the purchase was already
///    reconciled
///
/// # Errors
///
/// Returns [`RepositoryError::NotFound`] when no purchase matches and
/// [`RepositoryError::DataCorruption`] when an external reference matches
/// more than one registered purchase.
pub async fn locate(
    store: &dyn Store,
    reference: &PaymentReference,
) -> Result<Purchase, RepositoryError> {
    if let Some(raw) = reference.external_reference.as_deref() {
        match ExternalReference::parse(raw) {
            Some(ExternalReference::Guest { purchase_id, .. }) => {
                if let Some(purchase) = store.find_guest_purchase(&purchase_id).await? {
                    return Ok(purchase);
                }
                warn!(reference = raw, "guest reference matched no purchase");
            }
            Some(ExternalReference::Registered(_)) => {
                if let Some(purchase) =
                    store.find_registered_by_external_reference(raw).await?
                {
                    return Ok(purchase);
                }
                warn!(reference = raw, "external reference matched no purchase");
            }
            None => {
                warn!(reference = raw, "malformed guest reference");
            }
        }
    }

    if let Some(payment_id) = reference.provider_payment_id.as_deref()
        && let Some(purchase) = store.find_by_provider_payment_id(payment_id).await?
    {
        return Ok(purchase);
    }

    Err(RepositoryError::NotFound)
}
