//! MercadoPago REST client.
//!
//! MercadoPago is preference based: `create_checkout` creates a checkout
//! preference and returns its `init_point` URL. Payment results arrive
//! asynchronously as webhooks carrying `{type, data: {id}}` envelopes;
//! `verify` looks the payment up at `/v1/payments/{id}`.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;

use tintero_core::{PaymentMethod, Price};

use super::provider::{
    CanonicalPaymentResult, CheckoutRedirect, CheckoutRequest, PROVIDER_TIMEOUT, PaymentProvider,
    PaymentReference, ProviderError, normalize_status,
};
use crate::config::MercadoPagoConfig;

/// Webhook envelope delivered by MercadoPago.
///
/// Only `type == "payment"` events are processed; every other event type is
/// acknowledged without processing so the provider stops redelivering it.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    /// Event type (`payment`, `refund`, `plan`, ...).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event payload.
    #[serde(default)]
    pub data: WebhookData,
}

/// Payload of a webhook envelope.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookData {
    /// Provider payment id.
    pub id: Option<serde_json::Value>,
}

impl WebhookEnvelope {
    /// The payment id as a string, however the provider encoded it
    /// (numeric ids are common).
    #[must_use]
    pub fn payment_id(&self) -> Option<String> {
        match self.data.id.as_ref()? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// MercadoPago API client.
#[derive(Clone)]
pub struct MercadoPagoClient {
    client: reqwest::Client,
    api_base: String,
}

impl MercadoPagoClient {
    /// Create a new MercadoPago client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build or the access
    /// token is not a valid header value.
    pub fn new(config: &MercadoPagoConfig) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", config.access_token.expose_secret());
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&auth_value)
                .map_err(|e| ProviderError::Parse(format!("invalid access token format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(PROVIDER_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_owned(),
        })
    }

    async fn read_payload(
        response: reqwest::Response,
    ) -> Result<serde_json::Value, ProviderError> {
        let status = response.status();
        if status.is_server_error() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Unavailable(format!(
                "mercadopago returned {status}: {message}"
            )));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PaymentProvider for MercadoPagoClient {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::MercadoPago
    }

    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutRedirect, ProviderError> {
        let url = format!("{}/checkout/preferences", self.api_base);
        let body = serde_json::json!({
            "items": [{
                "title": request.title,
                "quantity": 1,
                "unit_price": request.amount.to_decimal(),
                "currency_id": request.amount.currency.code(),
            }],
            "external_reference": request.external_reference,
            "back_urls": {
                "success": request.return_url,
                "failure": request.return_url,
                "pending": request.return_url,
            },
            "auto_return": "approved",
        });

        let response = self.client.post(&url).json(&body).send().await?;
        let payload = Self::read_payload(response).await?;

        let init_point = payload
            .get("init_point")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ProviderError::Parse("preference response missing init_point".to_owned())
            })?;

        Ok(CheckoutRedirect {
            url: init_point.to_owned(),
            token: payload
                .get("id")
                .and_then(|v| v.as_str())
                .map(str::to_owned),
        })
    }

    async fn verify(
        &self,
        reference: &PaymentReference,
    ) -> Result<CanonicalPaymentResult, ProviderError> {
        let payment_id = reference.provider_payment_id.as_deref().ok_or_else(|| {
            ProviderError::Parse("mercadopago verification needs a payment id".to_owned())
        })?;

        let url = format!("{}/v1/payments/{payment_id}", self.api_base);
        let response = self.client.get(&url).send().await?;
        let payload = Self::read_payload(response).await?;

        let raw_status = payload.get("status").and_then(|v| v.as_str()).unwrap_or("");
        let external_reference = payload
            .get("external_reference")
            .and_then(|v| v.as_str())
            .map(str::to_owned);
        let currency = payload
            .get("currency_id")
            .and_then(|v| v.as_str())
            .and_then(|c| c.parse().ok())
            .unwrap_or_default();
        let amount = payload
            .get("transaction_amount")
            .and_then(serde_json::Value::as_f64)
            .map(|a| Price::from_major_f64(a, currency));

        Ok(CanonicalPaymentResult {
            provider_payment_id: payment_id.to_owned(),
            external_reference,
            status: normalize_status(raw_status),
            amount,
            raw_payload: payload,
        })
    }
}
