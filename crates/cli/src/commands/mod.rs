//! CLI command implementations.

use secrecy::SecretString;

pub mod migrate;
pub mod seed;

/// Resolve the database URL from `TINTERO_DATABASE_URL` or `DATABASE_URL`.
pub(crate) fn database_url() -> Result<SecretString, Box<dyn std::error::Error>> {
    std::env::var("TINTERO_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| "TINTERO_DATABASE_URL not set".into())
}
