//! Catalog route handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use tracing::instrument;

use tintero_core::EbookId;

use crate::error::{AppError, Result};
use crate::models::Ebook;
use crate::state::AppState;

/// Ebook data as exposed by the API.
#[derive(Serialize)]
pub struct EbookView {
    pub id: String,
    pub title: String,
    pub author: String,
    pub price_minor: i64,
    pub currency: String,
    pub price_display: String,
    pub description: String,
    pub cover_url: Option<String>,
}

impl From<Ebook> for EbookView {
    fn from(ebook: Ebook) -> Self {
        Self {
            id: ebook.id.into_inner(),
            title: ebook.title,
            author: ebook.author,
            price_minor: ebook.price.amount_minor,
            currency: ebook.price.currency.code().to_string(),
            price_display: ebook.price.display(),
            description: ebook.description,
            cover_url: ebook.cover_url,
        }
    }
}

/// `GET /api/ebooks` - list the catalog.
#[instrument(skip(state))]
pub async fn index(State(state): State<AppState>) -> Result<Json<Vec<EbookView>>> {
    let ebooks = state.store().list_ebooks().await?;
    Ok(Json(ebooks.into_iter().map(EbookView::from).collect()))
}

/// `GET /api/ebooks/{id}` - ebook detail.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EbookView>> {
    let ebook = state
        .store()
        .get_ebook(&EbookId::new(id.clone()))
        .await?
        .ok_or(AppError::NotFound(id))?;
    Ok(Json(ebook.into()))
}
