//! Cart route handlers.
//!
//! Carts belong to registered users only; guests buy directly through
//! checkout.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tintero_core::{EbookId, UserId};

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Request body for adding an ebook to a cart.
#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub user_id: String,
    pub ebook_id: String,
}

/// Cart item as exposed by the API.
#[derive(Serialize)]
pub struct CartItemView {
    pub ebook_id: String,
    pub title: String,
    pub price_display: String,
}

/// Cart as exposed by the API.
#[derive(Serialize)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub total_minor: i64,
    pub total_display: String,
}

/// `GET /api/cart/{user_id}` - list a user's cart with catalog details.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<CartView>> {
    let user_id = UserId::new(user_id);
    let items = state.store().list_cart(&user_id).await?;

    let mut views = Vec::with_capacity(items.len());
    let mut total_minor = 0_i64;
    for item in items {
        // An ebook deleted from the catalog leaves an orphan cart row;
        // skip it rather than failing the whole cart.
        let Some(ebook) = state.store().get_ebook(&item.ebook_id).await? else {
            continue;
        };
        total_minor += ebook.price.amount_minor;
        views.push(CartItemView {
            ebook_id: ebook.id.into_inner(),
            title: ebook.title,
            price_display: ebook.price.display(),
        });
    }

    let total = tintero_core::Price::from_minor(total_minor, state.currency());
    Ok(Json(CartView {
        items: views,
        total_minor,
        total_display: total.display(),
    }))
}

/// `POST /api/cart` - add an ebook to a cart. Adding twice is a no-op.
#[instrument(skip(state))]
pub async fn add(
    State(state): State<AppState>,
    Json(body): Json<AddToCartRequest>,
) -> Result<StatusCode> {
    let user_id = UserId::new(body.user_id);
    let ebook_id = EbookId::new(body.ebook_id.clone());

    if state.store().get_profile(&user_id).await?.is_none() {
        return Err(AppError::NotFound(user_id.into_inner()));
    }
    if state.store().get_ebook(&ebook_id).await?.is_none() {
        return Err(AppError::NotFound(body.ebook_id));
    }

    state.store().add_cart_item(&user_id, &ebook_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/cart/{user_id}/{ebook_id}` - remove an ebook from a cart.
#[instrument(skip(state))]
pub async fn remove(
    State(state): State<AppState>,
    Path((user_id, ebook_id)): Path<(String, String)>,
) -> Result<StatusCode> {
    let removed = state
        .store()
        .remove_cart_item(&UserId::new(user_id), &EbookId::new(ebook_id.clone()))
        .await?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(ebook_id))
    }
}
