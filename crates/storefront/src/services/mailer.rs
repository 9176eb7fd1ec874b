//! Completion email delivery.
//!
//! Uses SMTP via lettre for delivery with Askama HTML templates. The
//! workflow talks to the [`ReceiptMailer`] trait so tests can record what
//! would have been sent.

use askama::Template;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use tintero_core::Email;

use crate::config::EmailConfig;

/// HTML template for the purchase completion email.
#[derive(Template)]
#[template(path = "email/receipt.html")]
struct ReceiptEmailHtml<'a> {
    recipient_name: &'a str,
    title: &'a str,
    author: &'a str,
    price_display: &'a str,
    reader_url: &'a str,
    access_code: Option<&'a str>,
}

/// Plain text template for the purchase completion email.
#[derive(Template)]
#[template(path = "email/receipt.txt")]
struct ReceiptEmailText<'a> {
    recipient_name: &'a str,
    title: &'a str,
    author: &'a str,
    price_display: &'a str,
    reader_url: &'a str,
    access_code: Option<&'a str>,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum MailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    /// Delivery failure reported by a non-SMTP transport.
    #[error("Send error: {0}")]
    Send(String),
}

/// Everything the completion email needs.
#[derive(Debug, Clone)]
pub struct ReceiptEmail {
    /// Recipient address.
    pub to: Email,
    /// Name used in the greeting.
    pub recipient_name: String,
    /// Purchased ebook title.
    pub title: String,
    /// Purchased ebook author.
    pub author: String,
    /// Formatted amount charged, e.g. `$4.990 CLP`.
    pub price_display: String,
    /// Link into the reader for this ebook.
    pub reader_url: String,
    /// Guest access code; absent for registered buyers.
    pub access_code: Option<String>,
}

/// Sends purchase completion emails.
#[async_trait]
pub trait ReceiptMailer: Send + Sync {
    /// Send the completion email for a purchase.
    async fn send_receipt(&self, email: &ReceiptEmail) -> Result<(), MailError>;
}

/// Render the two bodies of the completion email.
///
/// # Errors
///
/// Returns an error if a template fails to render.
pub fn render_receipt(email: &ReceiptEmail) -> Result<(String, String), askama::Error> {
    let html = ReceiptEmailHtml {
        recipient_name: &email.recipient_name,
        title: &email.title,
        author: &email.author,
        price_display: &email.price_display,
        reader_url: &email.reader_url,
        access_code: email.access_code.as_deref(),
    }
    .render()?;
    let text = ReceiptEmailText {
        recipient_name: &email.recipient_name,
        title: &email.title,
        author: &email.author,
        price_display: &email.price_display,
        reader_url: &email.reader_url,
        access_code: email.access_code.as_deref(),
    }
    .render()?;
    Ok((text, html))
}

/// SMTP-backed mailer.
#[derive(Clone)]
pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    /// Create a new mailer from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl ReceiptMailer for SmtpMailer {
    async fn send_receipt(&self, email: &ReceiptEmail) -> Result<(), MailError> {
        let (text, html) = render_receipt(email)?;

        let subject = format!("Tu compra en Tintero: {}", email.title);
        let message = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| MailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(email
                .to
                .as_str()
                .parse()
                .map_err(|_| MailError::InvalidAddress(email.to.as_str().to_string()))?)
            .subject(&subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html),
                    ),
            )?;

        self.mailer.send(message).await?;

        tracing::info!(to = %email.to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}
