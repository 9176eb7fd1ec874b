//! End-to-end payment processing.
//!
//! [`PaymentWorkflow`] is what the confirmation and webhook handlers call:
//! verify with the provider, locate the purchase, reconcile, and when a
//! purchase just completed, email the buyer. The email is strictly
//! best-effort; a mail failure is logged and the reconciled state stands.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, instrument, warn};

use tintero_core::{PurchaseId, PurchaseStatus};

use super::locator::locate;
use super::provider::{PaymentProvider, PaymentReference, ProviderError};
use super::reconciler::{ReconcileOutcome, reconcile};
use crate::db::{RepositoryError, Store};
use crate::models::Purchase;
use crate::services::mailer::{ReceiptEmail, ReceiptMailer};

/// Errors surfaced to the HTTP layer by payment processing.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The provider could not be reached or rejected the verification.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// No purchase matches the inbound reference.
    #[error("no purchase matches the payment reference")]
    NotFound,

    /// The persistence layer failed.
    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for WorkflowError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound,
            other => Self::Repository(other),
        }
    }
}

/// Result of processing one inbound payment event.
#[derive(Debug, Clone)]
pub struct ProcessedPayment {
    /// The purchase the event resolved to.
    pub purchase_id: PurchaseId,
    /// The purchase's status after processing.
    pub status: PurchaseStatus,
    /// Whether this event was a duplicate of one already applied.
    pub already_processed: bool,
}

/// Drives verification, location, reconciliation and notification.
#[derive(Clone)]
pub struct PaymentWorkflow {
    store: Arc<dyn Store>,
    mailer: Arc<dyn ReceiptMailer>,
    base_url: String,
}

impl PaymentWorkflow {
    /// Build a workflow over the given store and mailer.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, mailer: Arc<dyn ReceiptMailer>, base_url: String) -> Self {
        Self {
            store,
            mailer,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Process one inbound payment event.
    ///
    /// # Errors
    ///
    /// Fails when the provider cannot verify the reference, when no
    /// purchase matches it, or when the reconciliation write fails. A
    /// notification failure is logged, never returned.
    #[instrument(skip(self, provider), fields(method = %provider.method()))]
    pub async fn process(
        &self,
        provider: &dyn PaymentProvider,
        reference: PaymentReference,
    ) -> Result<ProcessedPayment, WorkflowError> {
        let result = provider.verify(&reference).await?;

        // The caller's reference wins when it names the purchase; the
        // provider's echo fills the gaps (webhooks carry only an id).
        let merged = PaymentReference {
            external_reference: reference
                .external_reference
                .or_else(|| result.external_reference.clone()),
            token: reference.token,
            provider_payment_id: Some(result.provider_payment_id.clone()),
        };

        let purchase = locate(self.store.as_ref(), &merged).await?;
        let outcome = reconcile(self.store.as_ref(), &purchase, &result).await?;

        match outcome {
            ReconcileOutcome::AlreadyProcessed => {
                info!(purchase_id = %purchase.id, "duplicate payment event, nothing applied");
                Ok(ProcessedPayment {
                    purchase_id: purchase.id,
                    status: purchase.status,
                    already_processed: true,
                })
            }
            ReconcileOutcome::Applied {
                new_status,
                notification_due,
            } => {
                info!(purchase_id = %purchase.id, status = %new_status, "payment reconciled");
                if notification_due {
                    self.notify(&purchase).await;
                }
                Ok(ProcessedPayment {
                    purchase_id: purchase.id,
                    status: new_status,
                    already_processed: false,
                })
            }
        }
    }

    /// Send the completion email for a just-completed purchase. Failures
    /// are logged and swallowed.
    async fn notify(&self, purchase: &Purchase) {
        let email = match self.build_receipt(purchase).await {
            Ok(email) => email,
            Err(err) => {
                error!(
                    purchase_id = %purchase.id,
                    error = %err,
                    "could not assemble completion email"
                );
                return;
            }
        };

        if let Err(err) = self.mailer.send_receipt(&email).await {
            error!(
                purchase_id = %purchase.id,
                error = %err,
                "failed to send completion email"
            );
        }
    }

    async fn build_receipt(&self, purchase: &Purchase) -> Result<ReceiptEmail, RepositoryError> {
        let ebook = self
            .store
            .get_ebook(&purchase.ebook_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        let (to, recipient_name, access_code) = if let Some(contact) = purchase.owner.guest_contact()
        {
            let credential = self.store.get_guest_credential(&purchase.id).await?;
            if credential.is_none() {
                warn!(purchase_id = %purchase.id, "guest purchase has no access credential");
            }
            (
                contact.email.clone(),
                contact.name.clone(),
                credential.map(|c| c.access_code),
            )
        } else {
            let user_id = purchase.owner.user_id().ok_or(RepositoryError::NotFound)?;
            let profile = self
                .store
                .get_profile(user_id)
                .await?
                .ok_or(RepositoryError::NotFound)?;
            (profile.email, profile.display_name, None)
        };

        Ok(ReceiptEmail {
            to,
            recipient_name,
            title: ebook.title,
            author: ebook.author,
            price_display: purchase.amount.display(),
            reader_url: format!("{}/reader/{}", self.base_url, purchase.ebook_id),
            access_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{Ebook, GuestAccessCredential, GuestContact, Profile, PurchaseOwner};
    use crate::payments::provider::{
        CanonicalPaymentResult, CheckoutRedirect, CheckoutRequest,
    };
    use crate::services::mailer::MailError;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use tintero_core::{
        CurrencyCode, EbookId, Email, PaymentMethod, Price, UserId,
    };

    struct MockProvider {
        result: Mutex<Option<Result<CanonicalPaymentResult, ProviderError>>>,
    }

    impl MockProvider {
        fn verifying(result: CanonicalPaymentResult) -> Self {
            Self {
                result: Mutex::new(Some(Ok(result))),
            }
        }

        fn failing(err: ProviderError) -> Self {
            Self {
                result: Mutex::new(Some(Err(err))),
            }
        }
    }

    #[async_trait]
    impl PaymentProvider for MockProvider {
        fn method(&self) -> PaymentMethod {
            PaymentMethod::Webpay
        }

        async fn create_checkout(
            &self,
            _request: &CheckoutRequest,
        ) -> Result<CheckoutRedirect, ProviderError> {
            unimplemented!("not exercised by workflow tests")
        }

        async fn verify(
            &self,
            _reference: &PaymentReference,
        ) -> Result<CanonicalPaymentResult, ProviderError> {
            self.result
                .lock()
                .expect("mock lock")
                .take()
                .expect("verify called once")
        }
    }

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<ReceiptEmail>>,
        fail: bool,
    }

    impl RecordingMailer {
        fn failing() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn sent(&self) -> Vec<ReceiptEmail> {
            self.sent.lock().expect("mailer lock").clone()
        }
    }

    #[async_trait]
    impl ReceiptMailer for RecordingMailer {
        async fn send_receipt(&self, email: &ReceiptEmail) -> Result<(), MailError> {
            if self.fail {
                return Err(MailError::Send("smtp connection refused".to_owned()));
            }
            self.sent.lock().expect("mailer lock").push(email.clone());
            Ok(())
        }
    }

    fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.add_ebook(Ebook {
            id: EbookId::new("7"),
            title: "Cien anos de soledad".to_owned(),
            author: "Gabriel Garcia Marquez".to_owned(),
            price: Price::from_minor(4990, CurrencyCode::Clp),
            description: "A novel".to_owned(),
            cover_url: None,
        });
        store
    }

    fn guest_purchase(store: &MemoryStore) -> Purchase {
        let purchase = Purchase {
            id: PurchaseId::new("42"),
            owner: PurchaseOwner::Guest(GuestContact {
                email: Email::parse("guest@example.com").expect("valid"),
                name: "Ana".to_owned(),
                phone: None,
            }),
            ebook_id: EbookId::new("7"),
            amount: Price::from_minor(4990, CurrencyCode::Clp),
            payment_method: PaymentMethod::Webpay,
            status: PurchaseStatus::Pending,
            external_reference: Some("GUEST-42-7".to_owned()),
            provider_payment_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.add_purchase(purchase.clone());
        store.add_credential(GuestAccessCredential {
            purchase_id: purchase.id.clone(),
            ebook_id: purchase.ebook_id.clone(),
            access_code: "A1B2C3D4E5F6".to_owned(),
            created_at: Utc::now(),
        });
        purchase
    }

    fn approved_result(external_reference: &str) -> CanonicalPaymentResult {
        CanonicalPaymentResult {
            provider_payment_id: "PAY-1".to_owned(),
            external_reference: Some(external_reference.to_owned()),
            status: PurchaseStatus::Completed,
            amount: Some(Price::from_minor(4990, CurrencyCode::Clp)),
            raw_payload: serde_json::json!({"status": "approved"}),
        }
    }

    #[tokio::test]
    async fn test_completed_guest_payment_sends_credentials_email() {
        let store = seeded_store();
        guest_purchase(&store);
        let mailer = Arc::new(RecordingMailer::default());
        let workflow = PaymentWorkflow::new(
            store.clone(),
            mailer.clone(),
            "https://tintero.cl".to_owned(),
        );
        let provider = MockProvider::verifying(approved_result("GUEST-42-7"));

        let processed = workflow
            .process(&provider, PaymentReference::for_payment_id("PAY-1"))
            .await
            .expect("processed");

        assert_eq!(processed.status, PurchaseStatus::Completed);
        assert!(!processed.already_processed);

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to.as_str(), "guest@example.com");
        assert_eq!(sent[0].access_code.as_deref(), Some("A1B2C3D4E5F6"));
        assert_eq!(sent[0].reader_url, "https://tintero.cl/reader/7");
    }

    #[tokio::test]
    async fn test_duplicate_event_sends_no_second_email() {
        let store = seeded_store();
        let purchase = guest_purchase(&store);
        // Put the seeded row into its reconciled shape first.
        store
            .apply_payment_result(
                &purchase.id,
                PurchaseStatus::Completed,
                "PAY-1",
                &serde_json::json!({}),
            )
            .await
            .expect("seeded");

        let mailer = Arc::new(RecordingMailer::default());
        let workflow = PaymentWorkflow::new(
            store.clone(),
            mailer.clone(),
            "https://tintero.cl".to_owned(),
        );
        let provider = MockProvider::verifying(approved_result("GUEST-42-7"));

        let processed = workflow
            .process(&provider, PaymentReference::for_payment_id("PAY-1"))
            .await
            .expect("processed");

        assert!(processed.already_processed);
        assert_eq!(processed.status, PurchaseStatus::Completed);
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_mail_failure_does_not_undo_reconciliation() {
        let store = seeded_store();
        let purchase = guest_purchase(&store);
        let mailer = Arc::new(RecordingMailer::failing());
        let workflow = PaymentWorkflow::new(
            store.clone(),
            mailer,
            "https://tintero.cl".to_owned(),
        );
        let provider = MockProvider::verifying(approved_result("GUEST-42-7"));

        let processed = workflow
            .process(&provider, PaymentReference::for_payment_id("PAY-1"))
            .await
            .expect("processed despite mail failure");

        assert_eq!(processed.status, PurchaseStatus::Completed);
        let stored = store.purchase_snapshot(&purchase.id).expect("stored");
        assert_eq!(stored.status, PurchaseStatus::Completed);
    }

    #[tokio::test]
    async fn test_failed_payment_sends_no_email() {
        let store = seeded_store();
        guest_purchase(&store);
        let mailer = Arc::new(RecordingMailer::default());
        let workflow = PaymentWorkflow::new(
            store.clone(),
            mailer.clone(),
            "https://tintero.cl".to_owned(),
        );
        let mut result = approved_result("GUEST-42-7");
        result.status = PurchaseStatus::Failed;
        let provider = MockProvider::verifying(result);

        let processed = workflow
            .process(&provider, PaymentReference::for_payment_id("PAY-1"))
            .await
            .expect("processed");

        assert_eq!(processed.status, PurchaseStatus::Failed);
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_touches_nothing() {
        let store = seeded_store();
        let purchase = guest_purchase(&store);
        let mailer = Arc::new(RecordingMailer::default());
        let workflow = PaymentWorkflow::new(
            store.clone(),
            mailer.clone(),
            "https://tintero.cl".to_owned(),
        );
        let provider = MockProvider::failing(ProviderError::Unavailable("timeout".to_owned()));

        let err = workflow
            .process(&provider, PaymentReference::for_payment_id("PAY-1"))
            .await
            .expect_err("provider down");
        assert!(matches!(err, WorkflowError::Provider(_)));

        let stored = store.purchase_snapshot(&purchase.id).expect("stored");
        assert_eq!(stored.status, PurchaseStatus::Pending);
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unmatched_reference_is_not_found() {
        let store = seeded_store();
        let mailer = Arc::new(RecordingMailer::default());
        let workflow = PaymentWorkflow::new(
            store,
            mailer,
            "https://tintero.cl".to_owned(),
        );
        let provider = MockProvider::verifying(approved_result("GUEST-999-7"));

        let err = workflow
            .process(&provider, PaymentReference::for_payment_id("PAY-1"))
            .await
            .expect_err("no purchase");
        assert!(matches!(err, WorkflowError::NotFound));
    }

    #[tokio::test]
    async fn test_registered_completion_emails_profile_address() {
        let store = seeded_store();
        store.add_profile(Profile {
            id: UserId::new("user-1"),
            email: Email::parse("reader@example.com").expect("valid"),
            display_name: "Benja".to_owned(),
        });
        store.add_purchase(Purchase {
            id: PurchaseId::new("p1"),
            owner: PurchaseOwner::Registered(UserId::new("user-1")),
            ebook_id: EbookId::new("7"),
            amount: Price::from_minor(4990, CurrencyCode::Clp),
            payment_method: PaymentMethod::Webpay,
            status: PurchaseStatus::Pending,
            external_reference: Some("ORD-p1".to_owned()),
            provider_payment_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });

        let mailer = Arc::new(RecordingMailer::default());
        let workflow = PaymentWorkflow::new(
            store,
            mailer.clone(),
            "https://tintero.cl".to_owned(),
        );
        let provider = MockProvider::verifying(approved_result("ORD-p1"));

        let processed = workflow
            .process(&provider, PaymentReference::for_token("tok-1"))
            .await
            .expect("processed");

        assert_eq!(processed.status, PurchaseStatus::Completed);
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to.as_str(), "reader@example.com");
        assert!(sent[0].access_code.is_none());
    }
}
