//! Payment confirmation and webhook handlers.
//!
//! All three endpoints funnel into the same workflow, so a redirect
//! confirmation and a webhook racing each other resolve to one applied
//! event and one duplicate.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};

use tintero_core::PurchaseStatus;

use crate::error::{AppError, Result};
use crate::payments::{PaymentReference, mercadopago::WebhookEnvelope};
use crate::state::AppState;

/// Header carrying the shared webhook secret.
const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

/// Request body for the Webpay confirmation endpoint.
#[derive(Debug, Deserialize)]
pub struct WebpayConfirmRequest {
    pub token_ws: String,
}

/// Request body for the MercadoPago redirect confirmation endpoint.
#[derive(Debug, Deserialize)]
pub struct MercadoPagoConfirmRequest {
    pub payment_id: String,
    #[serde(default)]
    pub external_reference: Option<String>,
}

/// Response for a processed payment. The redirect points at the reader on
/// success and at the failure page otherwise.
#[derive(Serialize)]
pub struct PaymentResponse {
    pub success: bool,
    pub status: PurchaseStatus,
    pub purchase_id: String,
    pub redirect_url: String,
}

/// `POST /api/payments/webpay/confirm` - commit a Webpay transaction after
/// the buyer returns with `token_ws`.
#[instrument(skip(state, body))]
pub async fn webpay_confirm(
    State(state): State<AppState>,
    Json(body): Json<WebpayConfirmRequest>,
) -> Result<Json<PaymentResponse>> {
    if body.token_ws.is_empty() {
        return Err(AppError::BadRequest("token_ws is required".to_string()));
    }

    let processed = state
        .workflow()
        .process(state.webpay(), PaymentReference::for_token(&body.token_ws))
        .await?;

    payment_response(&state, processed).await
}

/// `POST /api/payments/mercadopago/confirm` - confirm a MercadoPago
/// payment after the buyer returns from the checkout preference.
#[instrument(skip(state, body))]
pub async fn mercadopago_confirm(
    State(state): State<AppState>,
    Json(body): Json<MercadoPagoConfirmRequest>,
) -> Result<Json<PaymentResponse>> {
    if body.payment_id.is_empty() {
        return Err(AppError::BadRequest("payment_id is required".to_string()));
    }

    let reference = PaymentReference {
        external_reference: body.external_reference,
        token: None,
        provider_payment_id: Some(body.payment_id),
    };
    let processed = state
        .workflow()
        .process(state.mercadopago(), reference)
        .await?;

    payment_response(&state, processed).await
}

/// `POST /api/payments/mercadopago/webhook` - webhook receiver.
///
/// Non-payment event types are acknowledged with 200 and ignored, so the
/// provider stops redelivering them.
#[instrument(skip(state, headers, envelope))]
pub async fn mercadopago_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(envelope): Json<WebhookEnvelope>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    verify_webhook_secret(&state, &headers)?;

    if envelope.event_type != "payment" {
        info!(event_type = %envelope.event_type, "ignoring non-payment webhook event");
        return Ok((
            StatusCode::OK,
            Json(json!({ "success": true, "ignored": true })),
        ));
    }

    let payment_id = envelope.payment_id().ok_or_else(|| {
        AppError::BadRequest("payment webhook is missing data.id".to_string())
    })?;

    let processed = state
        .workflow()
        .process(state.mercadopago(), PaymentReference::for_payment_id(payment_id))
        .await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "status": processed.status,
            "already_processed": processed.already_processed,
        })),
    ))
}

fn verify_webhook_secret(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let Some(expected) = state.webhook_secret() else {
        return Ok(());
    };

    let presented = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    if presented == Some(expected.expose_secret()) {
        Ok(())
    } else {
        warn!("webhook delivery with missing or wrong secret");
        Err(AppError::Unauthorized("invalid webhook secret".to_string()))
    }
}

async fn payment_response(
    state: &AppState,
    processed: crate::payments::ProcessedPayment,
) -> Result<Json<PaymentResponse>> {
    let success = processed.status == PurchaseStatus::Completed;
    let redirect_url = if success {
        let purchase = state
            .store()
            .get_purchase(&processed.purchase_id)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "purchase {} missing right after reconciliation",
                    processed.purchase_id
                ))
            })?;
        format!("{}/reader/{}", state.base_url(), purchase.ebook_id)
    } else {
        format!("{}/checkout/failure", state.base_url())
    };

    Ok(Json(PaymentResponse {
        success,
        status: processed.status,
        purchase_id: processed.purchase_id.into_inner(),
        redirect_url,
    }))
}
