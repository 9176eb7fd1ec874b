//! Storefront services.

pub mod credentials;
pub mod mailer;

pub use credentials::generate_access_code;
pub use mailer::{MailError, ReceiptEmail, ReceiptMailer, SmtpMailer};
