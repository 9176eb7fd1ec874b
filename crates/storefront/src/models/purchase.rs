//! Purchase domain types.
//!
//! A purchase is one logical entity regardless of who bought it: the owner
//! is either a registered user id or guest contact details, never both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tintero_core::{EbookId, Email, PaymentMethod, Price, PurchaseId, PurchaseStatus, UserId};

/// Who owns a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOwner {
    /// A registered user, identified by account id.
    Registered(UserId),
    /// A guest buyer, identified only by contact details.
    Guest(GuestContact),
}

impl PurchaseOwner {
    /// The user id, when the owner is a registered user.
    #[must_use]
    pub const fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::Registered(id) => Some(id),
            Self::Guest(_) => None,
        }
    }

    /// The guest contact, when the owner is a guest.
    #[must_use]
    pub const fn guest_contact(&self) -> Option<&GuestContact> {
        match self {
            Self::Registered(_) => None,
            Self::Guest(contact) => Some(contact),
        }
    }

    /// Whether this purchase belongs to a guest.
    #[must_use]
    pub const fn is_guest(&self) -> bool {
        matches!(self, Self::Guest(_))
    }
}

/// Contact details collected during guest checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestContact {
    /// Where the access credentials are emailed.
    pub email: Email,
    /// Buyer name, used in the receipt greeting.
    pub name: String,
    /// Optional phone number.
    pub phone: Option<String>,
}

/// A purchase of a single e-book.
#[derive(Debug, Clone)]
pub struct Purchase {
    /// Unique purchase ID.
    pub id: PurchaseId,
    /// Registered user or guest contact (exclusive).
    pub owner: PurchaseOwner,
    /// The ebook being bought.
    pub ebook_id: EbookId,
    /// Amount charged.
    pub amount: Price,
    /// Which provider this purchase is paid through.
    pub payment_method: PaymentMethod,
    /// Current canonical status. Forward-only: `pending` is the only state
    /// that may transition.
    pub status: PurchaseStatus,
    /// Opaque correlation string echoed back by the provider.
    pub external_reference: Option<String>,
    /// Provider's payment id, set when the purchase is reconciled.
    /// Unique across purchases when present.
    pub provider_payment_id: Option<String>,
    /// When the purchase was created.
    pub created_at: DateTime<Utc>,
    /// When the purchase was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Access credential for a guest purchase.
///
/// Generated once at purchase creation, independent of payment outcome,
/// and never rotated. Included in the completion email and checked when the
/// guest opens the reader.
#[derive(Debug, Clone)]
pub struct GuestAccessCredential {
    /// The guest purchase this credential belongs to.
    pub purchase_id: PurchaseId,
    /// The ebook it unlocks.
    pub ebook_id: EbookId,
    /// The random access code.
    pub access_code: String,
    /// When the credential was generated.
    pub created_at: DateTime<Utc>,
}
