//! External payment reference parsing.
//!
//! An external reference is an opaque string set at payment-creation time
//! and echoed back by the provider. Guest purchases encode their own routing
//! information in it: `GUEST-<purchaseId>-<ebookId>`. Anything without the
//! guest prefix belongs to a registered-user purchase and is matched against
//! the stored `external_reference` column verbatim.

use std::fmt;

use crate::types::id::{EbookId, PurchaseId};

/// Prefix marking a guest-purchase external reference.
pub const GUEST_REFERENCE_PREFIX: &str = "GUEST-";

/// A parsed external payment reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalReference {
    /// Guest purchase, with the purchase and ebook ids embedded in the
    /// reference itself.
    Guest {
        purchase_id: PurchaseId,
        ebook_id: EbookId,
    },
    /// Registered-user purchase; the raw value is looked up in the store.
    Registered(String),
}

impl ExternalReference {
    /// Build the guest reference for a purchase.
    ///
    /// Generated ids are dashless, so the two embedded ids can be split
    /// back out unambiguously.
    #[must_use]
    pub fn guest(purchase_id: PurchaseId, ebook_id: EbookId) -> Self {
        Self::Guest {
            purchase_id,
            ebook_id,
        }
    }

    /// Parse a raw external reference string.
    ///
    /// Returns `None` only for a guest-prefixed reference that does not
    /// carry both ids; a reference without the guest prefix is always a
    /// valid registered reference.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let Some(rest) = raw.strip_prefix(GUEST_REFERENCE_PREFIX) else {
            return Some(Self::Registered(raw.to_owned()));
        };

        let (purchase, ebook) = rest.split_once('-')?;
        if purchase.is_empty() || ebook.is_empty() {
            return None;
        }

        Some(Self::Guest {
            purchase_id: PurchaseId::new(purchase),
            ebook_id: EbookId::new(ebook),
        })
    }

    /// Whether this reference routes to the guest purchase store.
    #[must_use]
    pub const fn is_guest(&self) -> bool {
        matches!(self, Self::Guest { .. })
    }
}

impl fmt::Display for ExternalReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guest {
                purchase_id,
                ebook_id,
            } => write!(f, "{GUEST_REFERENCE_PREFIX}{purchase_id}-{ebook_id}"),
            Self::Registered(raw) => write!(f, "{raw}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_guest_reference() {
        let parsed = ExternalReference::parse("GUEST-abc123-ebook456").expect("valid");
        assert_eq!(
            parsed,
            ExternalReference::Guest {
                purchase_id: PurchaseId::new("abc123"),
                ebook_id: EbookId::new("ebook456"),
            }
        );
    }

    #[test]
    fn test_parse_numeric_guest_reference() {
        let parsed = ExternalReference::parse("GUEST-42-7").expect("valid");
        assert_eq!(
            parsed,
            ExternalReference::Guest {
                purchase_id: PurchaseId::new("42"),
                ebook_id: EbookId::new("7"),
            }
        );
    }

    #[test]
    fn test_unprefixed_reference_never_routes_to_guest_store() {
        let parsed = ExternalReference::parse("ORDER-abc123-ebook456").expect("valid");
        assert!(!parsed.is_guest());
        assert_eq!(
            parsed,
            ExternalReference::Registered("ORDER-abc123-ebook456".to_owned())
        );
    }

    #[test]
    fn test_malformed_guest_references_rejected() {
        assert!(ExternalReference::parse("GUEST-").is_none());
        assert!(ExternalReference::parse("GUEST-abc123").is_none());
        assert!(ExternalReference::parse("GUEST--ebook456").is_none());
        assert!(ExternalReference::parse("GUEST-abc123-").is_none());
    }

    #[test]
    fn test_display_roundtrip() {
        let reference =
            ExternalReference::guest(PurchaseId::new("abc123"), EbookId::new("ebook456"));
        let raw = reference.to_string();
        assert_eq!(raw, "GUEST-abc123-ebook456");
        assert_eq!(ExternalReference::parse(&raw).expect("valid"), reference);
    }
}
