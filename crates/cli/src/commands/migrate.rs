//! Database migration command.
//!
//! Migrations are embedded at compile time from
//! `crates/storefront/migrations/` and applied in order.
//!
//! # Environment Variables
//!
//! - `TINTERO_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string

use secrecy::SecretString;
use tracing::info;

use tintero_storefront::db::create_pool;

use super::database_url;

/// Run the storefront database migrations.
///
/// # Errors
///
/// Returns an error if the database URL is missing, the connection fails,
/// or a migration fails to apply.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let database_url: SecretString = database_url()?;

    info!("Connecting to database...");
    let pool = create_pool(&database_url).await?;

    info!("Running migrations...");
    sqlx::migrate!("../storefront/migrations").run(&pool).await?;

    info!("Migrations complete!");
    Ok(())
}
