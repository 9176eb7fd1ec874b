//! Payment reconciliation workflow.
//!
//! The flow for every provider callback, redirect confirmation or webhook:
//!
//! 1. [`provider`] - verify the payment with the provider and normalize its
//!    status vocabulary into the canonical one
//! 2. [`locator`] - resolve the inbound reference to exactly one purchase
//! 3. [`reconciler`] - apply the canonical status at most once
//! 4. notify - send the receipt/credentials email; failure here never
//!    rolls back the reconciliation
//!
//! [`workflow::PaymentWorkflow`] strings the steps together for the HTTP
//! handlers.

pub mod locator;
pub mod mercadopago;
pub mod provider;
pub mod reconciler;
pub mod webpay;
pub mod workflow;

pub use provider::{
    CanonicalPaymentResult, CheckoutRedirect, CheckoutRequest, PaymentProvider, PaymentReference,
    ProviderError, normalize_status,
};
pub use reconciler::ReconcileOutcome;
pub use workflow::{PaymentWorkflow, ProcessedPayment, WorkflowError};
