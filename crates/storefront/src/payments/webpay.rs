//! Transbank Webpay Plus REST client.
//!
//! Webpay is token based: `create_checkout` opens a transaction and returns
//! a token plus the form URL; after the buyer pays, Transbank redirects back
//! with `token_ws` and the transaction must be committed (a PUT on the
//! transaction resource) to learn its final status.
//!
//! Amounts on the wire are in major units of the purchase currency (whole
//! pesos for CLP); conversion happens here and nowhere else.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::prelude::ToPrimitive;
use secrecy::ExposeSecret;
use serde::Serialize;

use tintero_core::{CurrencyCode, PaymentMethod, Price, PurchaseStatus};

use super::provider::{
    CanonicalPaymentResult, CheckoutRedirect, CheckoutRequest, PROVIDER_TIMEOUT, PaymentProvider,
    PaymentReference, ProviderError, normalize_status,
};
use crate::config::WebpayConfig;

const TRANSACTIONS_PATH: &str = "/rswebpaytransaction/api/webpay/v1.2/transactions";

/// Webpay Plus API client.
#[derive(Clone)]
pub struct WebpayClient {
    client: reqwest::Client,
    api_base: String,
    currency: CurrencyCode,
}

#[derive(Serialize)]
struct CreateTransactionBody<'a> {
    buy_order: &'a str,
    session_id: &'a str,
    amount: f64,
    return_url: &'a str,
}

impl WebpayClient {
    /// Create a new Webpay client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build or the API key
    /// is not a valid header value.
    pub fn new(config: &WebpayConfig, currency: CurrencyCode) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Tbk-Api-Key-Id",
            HeaderValue::from_str(&config.commerce_code)
                .map_err(|e| ProviderError::Parse(format!("invalid commerce code: {e}")))?,
        );
        headers.insert(
            "Tbk-Api-Key-Secret",
            HeaderValue::from_str(config.api_key.expose_secret())
                .map_err(|e| ProviderError::Parse(format!("invalid API key format: {e}")))?,
        );
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(PROVIDER_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_owned(),
            currency,
        })
    }

    async fn read_payload(
        response: reqwest::Response,
    ) -> Result<serde_json::Value, ProviderError> {
        let status = response.status();
        if status.is_server_error() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Unavailable(format!(
                "webpay returned {status}: {message}"
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
impl PaymentProvider for WebpayClient {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Webpay
    }

    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutRedirect, ProviderError> {
        let url = format!("{}{TRANSACTIONS_PATH}", self.api_base);
        let body = CreateTransactionBody {
            buy_order: &request.external_reference,
            session_id: request.purchase_id.as_str(),
            amount: request.amount.to_decimal().to_f64().ok_or_else(|| {
                ProviderError::Parse("amount does not fit the wire format".to_owned())
            })?,
            return_url: &request.return_url,
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let payload = Self::read_payload(response).await?;

        let token = payload
            .get("token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::Parse("create response missing token".to_owned()))?;
        let form_url = payload
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::Parse("create response missing url".to_owned()))?;

        Ok(CheckoutRedirect {
            url: format!("{form_url}?token_ws={token}"),
            token: Some(token.to_owned()),
        })
    }

    async fn verify(
        &self,
        reference: &PaymentReference,
    ) -> Result<CanonicalPaymentResult, ProviderError> {
        let token = reference
            .token
            .as_deref()
            .ok_or_else(|| ProviderError::Parse("webpay verification needs a token".to_owned()))?;

        // Committing the transaction is what finalizes it on Transbank's
        // side; redelivering the same commit yields the same result.
        let url = format!("{}{TRANSACTIONS_PATH}/{token}", self.api_base);
        let response = self.client.put(&url).send().await?;
        let payload = Self::read_payload(response).await?;

        let raw_status = payload.get("status").and_then(|v| v.as_str()).unwrap_or("");
        let buy_order = payload
            .get("buy_order")
            .and_then(|v| v.as_str())
            .map(str::to_owned);
        let amount = payload
            .get("amount")
            .and_then(serde_json::Value::as_f64)
            .map(|a| Price::from_major_f64(a, self.currency));

        let status = match normalize_status(raw_status) {
            // Webpay reports AUTHORIZED with a non-zero response_code for
            // soft declines; only response_code 0 is an approval.
            PurchaseStatus::Completed
                if payload
                    .get("response_code")
                    .and_then(serde_json::Value::as_i64)
                    .unwrap_or(0)
                    != 0 =>
            {
                PurchaseStatus::Failed
            }
            other => other,
        };

        Ok(CanonicalPaymentResult {
            provider_payment_id: token.to_owned(),
            external_reference: buy_order,
            status,
            amount,
            raw_payload: payload,
        })
    }
}
