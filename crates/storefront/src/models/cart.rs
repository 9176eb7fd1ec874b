//! Cart domain type.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tintero_core::{EbookId, UserId};

/// An item in a registered user's cart.
///
/// Cart items are ephemeral: the reconciler clears the matching item
/// (best-effort) when a purchase for the same `(user_id, ebook_id)` pair
/// completes.
#[derive(Debug, Clone, Serialize)]
pub struct CartItem {
    /// Owning user.
    pub user_id: UserId,
    /// The ebook in the cart.
    pub ebook_id: EbookId,
    /// When the item was added.
    pub added_at: DateTime<Utc>,
}
