//! Domain types for the storefront.
//!
//! These represent validated domain objects, separate from database row
//! types. Rows are mapped into these in the persistence layer.

pub mod cart;
pub mod ebook;
pub mod purchase;

pub use cart::CartItem;
pub use ebook::Ebook;
pub use purchase::{GuestAccessCredential, GuestContact, Purchase, PurchaseOwner};

use tintero_core::{Email, UserId};

/// A registered storefront user.
#[derive(Debug, Clone)]
pub struct Profile {
    /// Unique user ID.
    pub id: UserId,
    /// The user's email address, used for receipts.
    pub email: Email,
    /// Display name.
    pub display_name: String,
}
