//! `PostgreSQL` implementation of the [`Store`] trait.
//!
//! Queries are runtime-checked (`query`/`query_as`) so the workspace builds
//! without a live database; rows are mapped into domain types here and
//! nowhere else.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use tintero_core::{
    CurrencyCode, EbookId, Email, PaymentMethod, Price, PurchaseId, PurchaseStatus, UserId,
};

use super::{RepositoryError, Store};
use crate::models::{
    CartItem, Ebook, GuestAccessCredential, GuestContact, Profile, Purchase, PurchaseOwner,
};

/// Store backed by the storefront `PostgreSQL` database.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Raw purchases row; decoded into [`Purchase`] via `TryFrom`.
#[derive(FromRow)]
struct PurchaseRow {
    id: String,
    kind: String,
    user_id: Option<String>,
    guest_email: Option<String>,
    guest_name: Option<String>,
    guest_phone: Option<String>,
    ebook_id: String,
    amount_minor: i64,
    currency: String,
    payment_method: String,
    status: String,
    external_reference: Option<String>,
    provider_payment_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PurchaseRow> for Purchase {
    type Error = RepositoryError;

    fn try_from(row: PurchaseRow) -> Result<Self, Self::Error> {
        let owner = match row.kind.as_str() {
            "registered" => {
                let user_id = row.user_id.ok_or_else(|| {
                    RepositoryError::DataCorruption(format!(
                        "registered purchase {} has no user_id",
                        row.id
                    ))
                })?;
                PurchaseOwner::Registered(UserId::new(user_id))
            }
            "guest" => {
                let email = row.guest_email.ok_or_else(|| {
                    RepositoryError::DataCorruption(format!(
                        "guest purchase {} has no guest_email",
                        row.id
                    ))
                })?;
                let email = Email::parse(&email).map_err(|e| {
                    RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
                })?;
                PurchaseOwner::Guest(GuestContact {
                    email,
                    name: row.guest_name.unwrap_or_default(),
                    phone: row.guest_phone,
                })
            }
            other => {
                return Err(RepositoryError::DataCorruption(format!(
                    "unknown purchase kind: {other}"
                )));
            }
        };

        let currency: CurrencyCode = row
            .currency
            .parse()
            .map_err(RepositoryError::DataCorruption)?;
        let status: PurchaseStatus = row
            .status
            .parse()
            .map_err(RepositoryError::DataCorruption)?;
        let payment_method: PaymentMethod = row
            .payment_method
            .parse()
            .map_err(RepositoryError::DataCorruption)?;

        Ok(Self {
            id: PurchaseId::new(row.id),
            owner,
            ebook_id: EbookId::new(row.ebook_id),
            amount: Price::from_minor(row.amount_minor, currency),
            payment_method,
            status,
            external_reference: row.external_reference,
            provider_payment_id: row.provider_payment_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Raw ebooks row.
#[derive(FromRow)]
struct EbookRow {
    id: String,
    title: String,
    author: String,
    price_minor: i64,
    currency: String,
    description: String,
    cover_url: Option<String>,
}

impl TryFrom<EbookRow> for Ebook {
    type Error = RepositoryError;

    fn try_from(row: EbookRow) -> Result<Self, Self::Error> {
        let currency: CurrencyCode = row
            .currency
            .parse()
            .map_err(RepositoryError::DataCorruption)?;
        Ok(Self {
            id: EbookId::new(row.id),
            title: row.title,
            author: row.author,
            price: Price::from_minor(row.price_minor, currency),
            description: row.description,
            cover_url: row.cover_url,
        })
    }
}

const PURCHASE_COLUMNS: &str = "id, kind, user_id, guest_email, guest_name, guest_phone, \
     ebook_id, amount_minor, currency, payment_method, status, \
     external_reference, provider_payment_id, created_at, updated_at";

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    async fn list_ebooks(&self) -> Result<Vec<Ebook>, RepositoryError> {
        let rows: Vec<EbookRow> = sqlx::query_as(
            "SELECT id, title, author, price_minor, currency, description, cover_url \
             FROM ebooks ORDER BY title",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Ebook::try_from).collect()
    }

    async fn get_ebook(&self, id: &EbookId) -> Result<Option<Ebook>, RepositoryError> {
        let row: Option<EbookRow> = sqlx::query_as(
            "SELECT id, title, author, price_minor, currency, description, cover_url \
             FROM ebooks WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Ebook::try_from).transpose()
    }

    async fn get_profile(&self, id: &UserId) -> Result<Option<Profile>, RepositoryError> {
        let row: Option<(String, String, String)> =
            sqlx::query_as("SELECT id, email, display_name FROM profiles WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(id, email, display_name)| {
            let email = Email::parse(&email).map_err(|e| {
                RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
            })?;
            Ok(Profile {
                id: UserId::new(id),
                email,
                display_name,
            })
        })
        .transpose()
    }

    async fn list_cart(&self, user_id: &UserId) -> Result<Vec<CartItem>, RepositoryError> {
        let rows: Vec<(String, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT user_id, ebook_id, added_at FROM cart_items \
             WHERE user_id = $1 ORDER BY added_at",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(user_id, ebook_id, added_at)| CartItem {
                user_id: UserId::new(user_id),
                ebook_id: EbookId::new(ebook_id),
                added_at,
            })
            .collect())
    }

    async fn add_cart_item(
        &self,
        user_id: &UserId,
        ebook_id: &EbookId,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO cart_items (user_id, ebook_id) VALUES ($1, $2) \
             ON CONFLICT (user_id, ebook_id) DO NOTHING",
        )
        .bind(user_id.as_str())
        .bind(ebook_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_cart_item(
        &self,
        user_id: &UserId,
        ebook_id: &EbookId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND ebook_id = $2")
            .bind(user_id.as_str())
            .bind(ebook_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_purchase(&self, purchase: &Purchase) -> Result<(), RepositoryError> {
        let (kind, user_id, guest_email, guest_name, guest_phone) = match &purchase.owner {
            PurchaseOwner::Registered(id) => ("registered", Some(id.as_str()), None, None, None),
            PurchaseOwner::Guest(contact) => (
                "guest",
                None,
                Some(contact.email.as_str()),
                Some(contact.name.as_str()),
                contact.phone.as_deref(),
            ),
        };

        sqlx::query(
            "INSERT INTO purchases \
             (id, kind, user_id, guest_email, guest_name, guest_phone, ebook_id, \
              amount_minor, currency, payment_method, status, external_reference, \
              created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(purchase.id.as_str())
        .bind(kind)
        .bind(user_id)
        .bind(guest_email)
        .bind(guest_name)
        .bind(guest_phone)
        .bind(purchase.ebook_id.as_str())
        .bind(purchase.amount.amount_minor)
        .bind(purchase.amount.currency.code())
        .bind(purchase.payment_method.to_string())
        .bind(purchase.status.to_string())
        .bind(purchase.external_reference.as_deref())
        .bind(purchase.created_at)
        .bind(purchase.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RepositoryError::Conflict("purchase id already exists".to_owned());
            }
            RepositoryError::Database(e)
        })?;
        Ok(())
    }

    async fn insert_guest_credential(
        &self,
        credential: &GuestAccessCredential,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO guest_access_credentials \
             (purchase_id, ebook_id, access_code, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(credential.purchase_id.as_str())
        .bind(credential.ebook_id.as_str())
        .bind(&credential.access_code)
        .bind(credential.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_purchase(&self, id: &PurchaseId) -> Result<Option<Purchase>, RepositoryError> {
        let row: Option<PurchaseRow> =
            sqlx::query_as(&format!("SELECT {PURCHASE_COLUMNS} FROM purchases WHERE id = $1"))
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        row.map(Purchase::try_from).transpose()
    }

    async fn find_registered_by_external_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Purchase>, RepositoryError> {
        let rows: Vec<PurchaseRow> = sqlx::query_as(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases \
             WHERE kind = 'registered' AND external_reference = $1"
        ))
        .bind(reference)
        .fetch_all(&self.pool)
        .await?;

        if rows.len() > 1 {
            return Err(RepositoryError::DataCorruption(format!(
                "external reference {reference} matches {} purchases",
                rows.len()
            )));
        }

        rows.into_iter().next().map(Purchase::try_from).transpose()
    }

    async fn find_by_provider_payment_id(
        &self,
        payment_id: &str,
    ) -> Result<Option<Purchase>, RepositoryError> {
        let row: Option<PurchaseRow> = sqlx::query_as(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE provider_payment_id = $1"
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Purchase::try_from).transpose()
    }

    async fn find_guest_purchase(
        &self,
        id: &PurchaseId,
    ) -> Result<Option<Purchase>, RepositoryError> {
        let row: Option<PurchaseRow> = sqlx::query_as(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE kind = 'guest' AND id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Purchase::try_from).transpose()
    }

    async fn apply_payment_result(
        &self,
        id: &PurchaseId,
        status: PurchaseStatus,
        provider_payment_id: &str,
        raw_payload: &serde_json::Value,
    ) -> Result<(), RepositoryError> {
        // Conditional on the row still being pending: two deliveries racing
        // on the same purchase both read it as pending, but only one update
        // can match.
        let result = sqlx::query(
            "UPDATE purchases \
             SET status = $2, provider_payment_id = $3, provider_raw_payload = $4, \
                 updated_at = now() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id.as_str())
        .bind(status.to_string())
        .bind(provider_payment_id)
        .bind(raw_payload)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                // Another delivery of the same provider event won the race.
                return RepositoryError::Conflict(format!(
                    "provider payment id {provider_payment_id} already recorded"
                ));
            }
            RepositoryError::Database(e)
        })?;

        if result.rows_affected() == 0 {
            // Either the row is gone or a concurrent delivery already moved
            // it out of pending.
            let exists: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM purchases WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;
            return Err(match exists {
                Some(_) => RepositoryError::Conflict(format!("purchase {id} is no longer pending")),
                None => RepositoryError::NotFound,
            });
        }
        Ok(())
    }

    async fn get_guest_credential(
        &self,
        purchase_id: &PurchaseId,
    ) -> Result<Option<GuestAccessCredential>, RepositoryError> {
        let row: Option<(String, String, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT purchase_id, ebook_id, access_code, created_at \
             FROM guest_access_credentials WHERE purchase_id = $1",
        )
        .bind(purchase_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(purchase_id, ebook_id, access_code, created_at)| GuestAccessCredential {
                purchase_id: PurchaseId::new(purchase_id),
                ebook_id: EbookId::new(ebook_id),
                access_code,
                created_at,
            },
        ))
    }
}
