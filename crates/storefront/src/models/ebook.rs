//! E-book catalog domain type.

use serde::Serialize;
use tintero_core::{EbookId, Price};

/// An e-book in the catalog.
#[derive(Debug, Clone, Serialize)]
pub struct Ebook {
    /// Unique ebook ID.
    pub id: EbookId,
    /// Title shown in the catalog and in receipt emails.
    pub title: String,
    /// Author name.
    pub author: String,
    /// Sale price in minor units.
    pub price: Price,
    /// Short description for the catalog listing.
    pub description: String,
    /// Cover image URL, if any.
    pub cover_url: Option<String>,
}
