//! Shared domain types.

pub mod email;
pub mod id;
pub mod price;
pub mod reference;
pub mod status;

pub use email::{Email, EmailError};
pub use id::{EbookId, PurchaseId, UserId};
pub use price::{CurrencyCode, Price};
pub use reference::{ExternalReference, GUEST_REFERENCE_PREFIX};
pub use status::{PaymentMethod, PurchaseStatus};
