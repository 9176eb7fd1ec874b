//! Checkout route handlers.
//!
//! Checkout creates a pending purchase, then asks the provider for a
//! redirect URL. A provider failure after the insert leaves the pending
//! row in place; it simply never reconciles.

use axum::{Json, extract::State};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tintero_core::{
    Email, GUEST_REFERENCE_PREFIX, PaymentMethod, PurchaseId, PurchaseStatus, UserId,
};

use crate::error::{AppError, Result};
use crate::models::{Ebook, GuestAccessCredential, GuestContact, Purchase, PurchaseOwner};
use crate::payments::{CheckoutRequest, PaymentProvider};
use crate::services::generate_access_code;
use crate::state::AppState;

/// Request body for starting a checkout.
#[derive(Debug, Deserialize)]
pub struct StartCheckoutRequest {
    pub ebook_id: String,
    pub buyer: BuyerRequest,
}

/// Who is buying. Exactly one of the fields must be set.
#[derive(Debug, Deserialize)]
pub struct BuyerRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub guest: Option<GuestRequest>,
}

/// Guest contact details collected at checkout.
#[derive(Debug, Deserialize)]
pub struct GuestRequest {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Response for a started checkout.
#[derive(Serialize)]
pub struct StartCheckoutResponse {
    pub purchase_id: String,
    pub redirect_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// `POST /api/checkout/webpay` - start a Webpay checkout.
#[instrument(skip(state, body))]
pub async fn webpay(
    State(state): State<AppState>,
    Json(body): Json<StartCheckoutRequest>,
) -> Result<Json<StartCheckoutResponse>> {
    let provider = state.webpay();
    start_checkout(&state, provider, PaymentMethod::Webpay, body).await
}

/// `POST /api/checkout/mercadopago` - start a MercadoPago checkout.
#[instrument(skip(state, body))]
pub async fn mercadopago(
    State(state): State<AppState>,
    Json(body): Json<StartCheckoutRequest>,
) -> Result<Json<StartCheckoutResponse>> {
    let provider = state.mercadopago();
    start_checkout(&state, provider, PaymentMethod::MercadoPago, body).await
}

async fn start_checkout(
    state: &AppState,
    provider: &dyn PaymentProvider,
    method: PaymentMethod,
    body: StartCheckoutRequest,
) -> Result<Json<StartCheckoutResponse>> {
    let ebook = state
        .store()
        .get_ebook(&tintero_core::EbookId::new(body.ebook_id.clone()))
        .await?
        .ok_or(AppError::NotFound(body.ebook_id))?;

    let owner = resolve_owner(state, body.buyer).await?;
    let purchase_id = PurchaseId::generate();
    let external_reference = match &owner {
        PurchaseOwner::Registered(_) => format!("ORD-{purchase_id}"),
        PurchaseOwner::Guest(_) => {
            format!("{GUEST_REFERENCE_PREFIX}{purchase_id}-{}", ebook.id)
        }
    };

    let now = Utc::now();
    let purchase = Purchase {
        id: purchase_id.clone(),
        owner: owner.clone(),
        ebook_id: ebook.id.clone(),
        amount: ebook.price,
        payment_method: method,
        status: PurchaseStatus::Pending,
        external_reference: Some(external_reference.clone()),
        provider_payment_id: None,
        created_at: now,
        updated_at: now,
    };
    state.store().insert_purchase(&purchase).await?;

    // The credential exists from the moment the purchase does; the email
    // sent on completion only reveals it.
    if owner.is_guest() {
        state
            .store()
            .insert_guest_credential(&GuestAccessCredential {
                purchase_id: purchase_id.clone(),
                ebook_id: ebook.id.clone(),
                access_code: generate_access_code(),
                created_at: now,
            })
            .await?;
    }

    let redirect = provider
        .create_checkout(&CheckoutRequest {
            purchase_id: purchase_id.clone(),
            external_reference,
            amount: ebook.price,
            title: ebook_checkout_title(&ebook),
            return_url: format!("{}/checkout/return/{method}", state.base_url()),
        })
        .await?;

    Ok(Json(StartCheckoutResponse {
        purchase_id: purchase_id.into_inner(),
        redirect_url: redirect.url,
        token: redirect.token,
    }))
}

async fn resolve_owner(state: &AppState, buyer: BuyerRequest) -> Result<PurchaseOwner> {
    match (buyer.user_id, buyer.guest) {
        (Some(user_id), None) => {
            let user_id = UserId::new(user_id);
            if state.store().get_profile(&user_id).await?.is_none() {
                return Err(AppError::NotFound(user_id.into_inner()));
            }
            Ok(PurchaseOwner::Registered(user_id))
        }
        (None, Some(guest)) => {
            let email = Email::parse(&guest.email)
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            if guest.name.trim().is_empty() {
                return Err(AppError::BadRequest("guest name is required".to_string()));
            }
            Ok(PurchaseOwner::Guest(GuestContact {
                email,
                name: guest.name,
                phone: guest.phone,
            }))
        }
        _ => Err(AppError::BadRequest(
            "buyer must be exactly one of user_id or guest".to_string(),
        )),
    }
}

fn ebook_checkout_title(ebook: &Ebook) -> String {
    format!("{} - {}", ebook.title, ebook.author)
}
