//! Payment reconciler.
//!
//! Applies a verified payment result to its purchase at most once.
//! Completed and failed are terminal: once a purchase has reached either,
//! no later event may change it, whatever its payload says. The status
//! guard here works on a snapshot; the pending-only conditional update in
//! the store closes the race two concurrent deliveries of the same event
//! would otherwise win together, and the unique index on
//! `provider_payment_id` rejects the same payment id landing on a second
//! purchase.

use tracing::{debug, warn};

use tintero_core::PurchaseStatus;

use super::provider::CanonicalPaymentResult;
use crate::db::{RepositoryError, Store};
use crate::models::Purchase;

/// What reconciliation did with the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The purchase was already in a terminal state, or another delivery
    /// of this event won the race. Nothing was written.
    AlreadyProcessed,
    /// The result was applied.
    Applied {
        /// The status the purchase now has.
        new_status: PurchaseStatus,
        /// Whether a completion notification is owed to the buyer.
        notification_due: bool,
    },
}

/// Apply a payment result to a purchase.
///
/// # Errors
///
/// Propagates repository errors other than the duplicate-delivery
/// conflict, which resolves to [`ReconcileOutcome::AlreadyProcessed`].
pub async fn reconcile(
    store: &dyn Store,
    purchase: &Purchase,
    result: &CanonicalPaymentResult,
) -> Result<ReconcileOutcome, RepositoryError> {
    if purchase.status.is_terminal() {
        if purchase.provider_payment_id.as_deref() == Some(result.provider_payment_id.as_str()) {
            debug!(
                purchase_id = %purchase.id,
                status = %purchase.status,
                "duplicate delivery for an already reconciled purchase"
            );
        } else {
            warn!(
                purchase_id = %purchase.id,
                status = %purchase.status,
                inbound_payment_id = %result.provider_payment_id,
                recorded_payment_id = ?purchase.provider_payment_id,
                "payment event for a terminal purchase carries a different payment id"
            );
        }
        return Ok(ReconcileOutcome::AlreadyProcessed);
    }

    if let Some(amount) = &result.amount
        && *amount != purchase.amount
    {
        warn!(
            purchase_id = %purchase.id,
            expected = %purchase.amount.amount_minor,
            reported = %amount.amount_minor,
            "provider reported a different amount than the purchase records"
        );
    }

    match store
        .apply_payment_result(
            &purchase.id,
            result.status,
            &result.provider_payment_id,
            &result.raw_payload,
        )
        .await
    {
        Ok(()) => {}
        Err(RepositoryError::Conflict(reason)) => {
            warn!(
                purchase_id = %purchase.id,
                payment_id = %result.provider_payment_id,
                reason,
                "concurrent delivery already applied, treating as duplicate"
            );
            return Ok(ReconcileOutcome::AlreadyProcessed);
        }
        Err(err) => return Err(err),
    }

    let notification_due = result.status == PurchaseStatus::Completed;

    // The bought ebook no longer belongs in the buyer's cart. Losing this
    // write only leaves a stale cart row, so it never fails the
    // reconciliation.
    if notification_due
        && let Some(user_id) = purchase.owner.user_id()
        && let Err(err) = store.remove_cart_item(user_id, &purchase.ebook_id).await
    {
        warn!(
            purchase_id = %purchase.id,
            error = %err,
            "failed to clear purchased ebook from cart"
        );
    }

    Ok(ReconcileOutcome::Applied {
        new_status: result.status,
        notification_due,
    })
}
