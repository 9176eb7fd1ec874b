//! Guest reader access.
//!
//! A guest redeems the purchase id plus the access code from the
//! completion email. The code only unlocks a completed purchase; a
//! pending or failed one answers the same way as a wrong code.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tintero_core::{PurchaseId, PurchaseStatus};

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Request body for redeeming a guest access code.
#[derive(Debug, Deserialize)]
pub struct AccessRequest {
    pub purchase_id: String,
    pub access_code: String,
}

/// Response granting reader access.
#[derive(Serialize)]
pub struct AccessResponse {
    pub ebook_id: String,
    pub reader_url: String,
}

/// `POST /api/reader/access` - redeem a guest access code.
#[instrument(skip(state, body))]
pub async fn access(
    State(state): State<AppState>,
    Json(body): Json<AccessRequest>,
) -> Result<Json<AccessResponse>> {
    let purchase_id = PurchaseId::new(body.purchase_id);

    let denied = || AppError::Unauthorized("invalid purchase or access code".to_string());

    let purchase = state
        .store()
        .find_guest_purchase(&purchase_id)
        .await?
        .ok_or_else(denied)?;
    if purchase.status != PurchaseStatus::Completed {
        return Err(denied());
    }

    let credential = state
        .store()
        .get_guest_credential(&purchase_id)
        .await?
        .ok_or_else(denied)?;
    if credential.access_code != body.access_code {
        return Err(denied());
    }

    Ok(Json(AccessResponse {
        reader_url: format!("{}/reader/{}", state.base_url(), credential.ebook_id),
        ebook_id: credential.ebook_id.into_inner(),
    }))
}
