//! End-to-end payment flow tests.
//!
//! Drive the full axum router in process with an in-memory store, a
//! canned payment provider and a recording mailer: webhook and redirect
//! confirmations, duplicate deliveries, failed payments and guest reader
//! access.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use http_body_util::BodyExt;
use secrecy::SecretString;
use tower::ServiceExt;

use tintero_core::{
    CurrencyCode, EbookId, Email, PaymentMethod, Price, PurchaseId, PurchaseStatus, UserId,
};
use tintero_storefront::db::MemoryStore;
use tintero_storefront::models::{
    Ebook, GuestAccessCredential, GuestContact, Profile, Purchase, PurchaseOwner,
};
use tintero_storefront::payments::{
    CanonicalPaymentResult, CheckoutRedirect, CheckoutRequest, PaymentProvider, PaymentReference,
    ProviderError,
};
use tintero_storefront::routes;
use tintero_storefront::services::mailer::{MailError, ReceiptEmail, ReceiptMailer};
use tintero_storefront::state::AppState;

// =============================================================================
// Test Doubles
// =============================================================================

/// Provider returning a canned verification result on every call.
struct StaticProvider {
    method: PaymentMethod,
    result: CanonicalPaymentResult,
}

#[async_trait]
impl PaymentProvider for StaticProvider {
    fn method(&self) -> PaymentMethod {
        self.method
    }

    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutRedirect, ProviderError> {
        Ok(CheckoutRedirect {
            url: format!("https://pay.example.com/{}", request.external_reference),
            token: Some("tok-test".to_owned()),
        })
    }

    async fn verify(
        &self,
        _reference: &PaymentReference,
    ) -> Result<CanonicalPaymentResult, ProviderError> {
        Ok(self.result.clone())
    }
}

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<ReceiptEmail>>,
}

impl RecordingMailer {
    fn sent(&self) -> Vec<ReceiptEmail> {
        self.sent.lock().expect("mailer lock").clone()
    }
}

#[async_trait]
impl ReceiptMailer for RecordingMailer {
    async fn send_receipt(&self, email: &ReceiptEmail) -> Result<(), MailError> {
        self.sent.lock().expect("mailer lock").push(email.clone());
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

const BASE_URL: &str = "https://tintero.cl";

fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.add_ebook(Ebook {
        id: EbookId::new("7"),
        title: "Sub Terra".to_owned(),
        author: "Baldomero Lillo".to_owned(),
        price: Price::from_minor(3990, CurrencyCode::Clp),
        description: "Cuentos mineros".to_owned(),
        cover_url: None,
    });
    store.add_profile(Profile {
        id: UserId::new("user-1"),
        email: Email::parse("lectora@example.com").expect("valid"),
        display_name: "Lectora".to_owned(),
    });
    store
}

fn pending_guest_purchase(store: &MemoryStore) {
    store.add_purchase(Purchase {
        id: PurchaseId::new("42"),
        owner: PurchaseOwner::Guest(GuestContact {
            email: Email::parse("guest@example.com").expect("valid"),
            name: "Ana".to_owned(),
            phone: None,
        }),
        ebook_id: EbookId::new("7"),
        amount: Price::from_minor(3990, CurrencyCode::Clp),
        payment_method: PaymentMethod::MercadoPago,
        status: PurchaseStatus::Pending,
        external_reference: Some("GUEST-42-7".to_owned()),
        provider_payment_id: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    });
    store.add_credential(GuestAccessCredential {
        purchase_id: PurchaseId::new("42"),
        ebook_id: EbookId::new("7"),
        access_code: "XK29ANB4QT7M".to_owned(),
        created_at: Utc::now(),
    });
}

fn approved_result(external_reference: &str, payment_id: &str) -> CanonicalPaymentResult {
    CanonicalPaymentResult {
        provider_payment_id: payment_id.to_owned(),
        external_reference: Some(external_reference.to_owned()),
        status: PurchaseStatus::Completed,
        amount: Some(Price::from_minor(3990, CurrencyCode::Clp)),
        raw_payload: serde_json::json!({"status": "approved"}),
    }
}

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    mailer: Arc<RecordingMailer>,
}

fn build_app(
    store: Arc<MemoryStore>,
    mercadopago_result: CanonicalPaymentResult,
    webpay_result: CanonicalPaymentResult,
    webhook_secret: Option<&str>,
) -> TestApp {
    let mailer = Arc::new(RecordingMailer::default());
    let state = AppState::new(
        store.clone(),
        Arc::new(StaticProvider {
            method: PaymentMethod::Webpay,
            result: webpay_result,
        }),
        Arc::new(StaticProvider {
            method: PaymentMethod::MercadoPago,
            result: mercadopago_result,
        }),
        mailer.clone(),
        BASE_URL.to_owned(),
        CurrencyCode::Clp,
        webhook_secret.map(SecretString::from),
    );
    TestApp {
        router: routes::app(state),
        store,
        mailer,
    }
}

async fn post_json(
    router: &Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    post_json_with_headers(router, uri, body, &[]).await
}

async fn post_json_with_headers(
    router: &Router,
    uri: &str,
    body: serde_json::Value,
    headers: &[(&str, &str)],
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder
        .body(Body::from(body.to_string()))
        .expect("request");

    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, json)
}

// =============================================================================
// Webhook Scenarios
// =============================================================================

#[tokio::test]
async fn test_approved_webhook_completes_guest_purchase_and_emails_credentials() {
    let store = seeded_store();
    pending_guest_purchase(&store);
    let app = build_app(
        store,
        approved_result("GUEST-42-7", "PAY-100"),
        approved_result("unused", "unused"),
        None,
    );

    let (status, body) = post_json(
        &app.router,
        "/api/payments/mercadopago/webhook",
        serde_json::json!({"type": "payment", "data": {"id": 100}}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["already_processed"], false);

    let purchase = app
        .store
        .purchase_snapshot(&PurchaseId::new("42"))
        .expect("stored");
    assert_eq!(purchase.status, PurchaseStatus::Completed);
    assert_eq!(purchase.provider_payment_id.as_deref(), Some("PAY-100"));

    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to.as_str(), "guest@example.com");
    assert_eq!(sent[0].access_code.as_deref(), Some("XK29ANB4QT7M"));
    assert_eq!(sent[0].reader_url, "https://tintero.cl/reader/7");
}

#[tokio::test]
async fn test_duplicate_webhook_delivery_applies_once_and_emails_once() {
    let store = seeded_store();
    pending_guest_purchase(&store);
    let app = build_app(
        store,
        approved_result("GUEST-42-7", "PAY-100"),
        approved_result("unused", "unused"),
        None,
    );
    let envelope = serde_json::json!({"type": "payment", "data": {"id": 100}});

    let (first_status, first) = post_json(
        &app.router,
        "/api/payments/mercadopago/webhook",
        envelope.clone(),
    )
    .await;
    let (second_status, second) =
        post_json(&app.router, "/api/payments/mercadopago/webhook", envelope).await;

    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(first["already_processed"], false);
    assert_eq!(second["already_processed"], true);

    let purchase = app
        .store
        .purchase_snapshot(&PurchaseId::new("42"))
        .expect("stored");
    assert_eq!(purchase.status, PurchaseStatus::Completed);
    assert_eq!(app.mailer.sent().len(), 1);
}

#[tokio::test]
async fn test_non_payment_webhook_is_acknowledged_without_mutation() {
    let store = seeded_store();
    pending_guest_purchase(&store);
    let app = build_app(
        store,
        approved_result("GUEST-42-7", "PAY-100"),
        approved_result("unused", "unused"),
        None,
    );

    let (status, body) = post_json(
        &app.router,
        "/api/payments/mercadopago/webhook",
        serde_json::json!({"type": "refund", "data": {"id": 100}}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ignored"], true);

    let purchase = app
        .store
        .purchase_snapshot(&PurchaseId::new("42"))
        .expect("stored");
    assert_eq!(purchase.status, PurchaseStatus::Pending);
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_webhook_missing_payment_id_is_bad_request() {
    let store = seeded_store();
    let app = build_app(
        store,
        approved_result("GUEST-42-7", "PAY-100"),
        approved_result("unused", "unused"),
        None,
    );

    let (status, _) = post_json(
        &app.router,
        "/api/payments/mercadopago/webhook",
        serde_json::json!({"type": "payment", "data": {}}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_with_wrong_secret_is_rejected() {
    let store = seeded_store();
    pending_guest_purchase(&store);
    let app = build_app(
        store,
        approved_result("GUEST-42-7", "PAY-100"),
        approved_result("unused", "unused"),
        Some("s3cr3t-value-9000"),
    );
    let envelope = serde_json::json!({"type": "payment", "data": {"id": 100}});

    let (missing, _) = post_json(
        &app.router,
        "/api/payments/mercadopago/webhook",
        envelope.clone(),
    )
    .await;
    assert_eq!(missing, StatusCode::UNAUTHORIZED);

    let (wrong, _) = post_json_with_headers(
        &app.router,
        "/api/payments/mercadopago/webhook",
        envelope.clone(),
        &[("x-webhook-secret", "nope")],
    )
    .await;
    assert_eq!(wrong, StatusCode::UNAUTHORIZED);

    let (right, _) = post_json_with_headers(
        &app.router,
        "/api/payments/mercadopago/webhook",
        envelope,
        &[("x-webhook-secret", "s3cr3t-value-9000")],
    )
    .await;
    assert_eq!(right, StatusCode::OK);
}

// =============================================================================
// Redirect Confirmation Scenarios
// =============================================================================

#[tokio::test]
async fn test_failed_webpay_confirmation_marks_purchase_failed_without_email() {
    let store = seeded_store();
    store.add_purchase(Purchase {
        id: PurchaseId::new("p1"),
        owner: PurchaseOwner::Registered(UserId::new("user-1")),
        ebook_id: EbookId::new("7"),
        amount: Price::from_minor(3990, CurrencyCode::Clp),
        payment_method: PaymentMethod::Webpay,
        status: PurchaseStatus::Pending,
        external_reference: Some("ORD-p1".to_owned()),
        provider_payment_id: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    });

    let mut failed = approved_result("ORD-p1", "tok-99");
    failed.status = PurchaseStatus::Failed;
    failed.raw_payload = serde_json::json!({"status": "FAILED"});
    let app = build_app(store, approved_result("unused", "unused"), failed, None);

    let (status, body) = post_json(
        &app.router,
        "/api/payments/webpay/confirm",
        serde_json::json!({"token_ws": "tok-99"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["redirect_url"], "https://tintero.cl/checkout/failure");

    let purchase = app
        .store
        .purchase_snapshot(&PurchaseId::new("p1"))
        .expect("stored");
    assert_eq!(purchase.status, PurchaseStatus::Failed);
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_completed_webpay_confirmation_returns_reader_redirect() {
    let store = seeded_store();
    store.add_purchase(Purchase {
        id: PurchaseId::new("p1"),
        owner: PurchaseOwner::Registered(UserId::new("user-1")),
        ebook_id: EbookId::new("7"),
        amount: Price::from_minor(3990, CurrencyCode::Clp),
        payment_method: PaymentMethod::Webpay,
        status: PurchaseStatus::Pending,
        external_reference: Some("ORD-p1".to_owned()),
        provider_payment_id: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    });
    let app = build_app(
        store,
        approved_result("unused", "unused"),
        approved_result("ORD-p1", "tok-99"),
        None,
    );

    let (status, body) = post_json(
        &app.router,
        "/api/payments/webpay/confirm",
        serde_json::json!({"token_ws": "tok-99"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["redirect_url"], "https://tintero.cl/reader/7");

    // Registered buyer gets the receipt at the profile address.
    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to.as_str(), "lectora@example.com");
    assert!(sent[0].access_code.is_none());
}

#[tokio::test]
async fn test_confirmation_for_unknown_reference_is_not_found() {
    let store = seeded_store();
    let app = build_app(
        store,
        approved_result("unused", "unused"),
        approved_result("ORD-ghost", "tok-99"),
        None,
    );

    let (status, _) = post_json(
        &app.router,
        "/api/payments/webpay/confirm",
        serde_json::json!({"token_ws": "tok-99"}),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_persistence_failure_surfaces_500_and_redelivery_succeeds() {
    let store = seeded_store();
    pending_guest_purchase(&store);
    let app = build_app(
        store,
        approved_result("GUEST-42-7", "PAY-100"),
        approved_result("unused", "unused"),
        None,
    );
    let envelope = serde_json::json!({"type": "payment", "data": {"id": 100}});

    app.store.set_fail_writes(true);
    let (status, _) = post_json(
        &app.router,
        "/api/payments/mercadopago/webhook",
        envelope.clone(),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(app.mailer.sent().is_empty());

    let purchase = app
        .store
        .purchase_snapshot(&PurchaseId::new("42"))
        .expect("stored");
    assert_eq!(purchase.status, PurchaseStatus::Pending);

    // The provider redelivers after the store recovers; the event applies
    // as if the first delivery never happened.
    app.store.set_fail_writes(false);
    let (status, body) =
        post_json(&app.router, "/api/payments/mercadopago/webhook", envelope).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["already_processed"], false);
    assert_eq!(app.mailer.sent().len(), 1);
}

// =============================================================================
// Reader Access
// =============================================================================

#[tokio::test]
async fn test_guest_reader_access_after_completion() {
    let store = seeded_store();
    pending_guest_purchase(&store);
    let app = build_app(
        store,
        approved_result("GUEST-42-7", "PAY-100"),
        approved_result("unused", "unused"),
        None,
    );

    // Not completed yet: the access code alone is not enough.
    let (status, _) = post_json(
        &app.router,
        "/api/reader/access",
        serde_json::json!({"purchase_id": "42", "access_code": "XK29ANB4QT7M"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    post_json(
        &app.router,
        "/api/payments/mercadopago/webhook",
        serde_json::json!({"type": "payment", "data": {"id": 100}}),
    )
    .await;

    let (status, body) = post_json(
        &app.router,
        "/api/reader/access",
        serde_json::json!({"purchase_id": "42", "access_code": "XK29ANB4QT7M"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ebook_id"], "7");
    assert_eq!(body["reader_url"], "https://tintero.cl/reader/7");

    let (wrong_code, _) = post_json(
        &app.router,
        "/api/reader/access",
        serde_json::json!({"purchase_id": "42", "access_code": "WRONG"}),
    )
    .await;
    assert_eq!(wrong_code, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Checkout
// =============================================================================

#[tokio::test]
async fn test_guest_checkout_creates_pending_purchase_and_credential() {
    let store = seeded_store();
    let app = build_app(
        store,
        approved_result("unused", "unused"),
        approved_result("unused", "unused"),
        None,
    );

    let (status, body) = post_json(
        &app.router,
        "/api/checkout/mercadopago",
        serde_json::json!({
            "ebook_id": "7",
            "buyer": {"guest": {"email": "ana@example.com", "name": "Ana"}}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let purchase_id = body["purchase_id"].as_str().expect("purchase id");
    assert!(body["redirect_url"]
        .as_str()
        .expect("redirect")
        .starts_with("https://pay.example.com/GUEST-"));

    let purchase = app
        .store
        .purchase_snapshot(&PurchaseId::new(purchase_id))
        .expect("stored");
    assert_eq!(purchase.status, PurchaseStatus::Pending);
    assert!(purchase.owner.is_guest());
    assert_eq!(
        purchase.external_reference.as_deref(),
        Some(format!("GUEST-{purchase_id}-7").as_str())
    );
}

#[tokio::test]
async fn test_checkout_rejects_ambiguous_buyer() {
    let store = seeded_store();
    let app = build_app(
        store,
        approved_result("unused", "unused"),
        approved_result("unused", "unused"),
        None,
    );

    let (status, _) = post_json(
        &app.router,
        "/api/checkout/webpay",
        serde_json::json!({
            "ebook_id": "7",
            "buyer": {
                "user_id": "user-1",
                "guest": {"email": "ana@example.com", "name": "Ana"}
            }
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}
