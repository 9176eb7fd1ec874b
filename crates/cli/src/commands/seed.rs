//! Seed the database with sample catalog data.
//!
//! Inserts a handful of ebooks and one demo profile so a fresh local
//! environment has something to browse and buy. Re-running is safe:
//! existing rows are left untouched.

use tracing::info;

use tintero_storefront::db::create_pool;

use super::database_url;

const SAMPLE_EBOOKS: &[(&str, &str, &str, i64)] = &[
    (
        "sub-terra",
        "Sub Terra",
        "Baldomero Lillo",
        3990,
    ),
    (
        "la-amortajada",
        "La amortajada",
        "Maria Luisa Bombal",
        4490,
    ),
    (
        "hijo-de-ladron",
        "Hijo de ladron",
        "Manuel Rojas",
        5990,
    ),
    (
        "el-obsceno-pajaro",
        "El obsceno pajaro de la noche",
        "Jose Donoso",
        7490,
    ),
];

/// Insert sample ebooks and a demo profile.
///
/// # Errors
///
/// Returns an error if the database URL is missing or an insert fails.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let database_url = database_url()?;
    let pool = create_pool(&database_url).await?;
    info!("Connected to database");

    let mut inserted = 0_u64;
    for (id, title, author, price_minor) in SAMPLE_EBOOKS {
        let result = sqlx::query(
            "INSERT INTO ebooks (id, title, author, price_minor, currency, description) \
             VALUES ($1, $2, $3, $4, 'CLP', $5) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(id)
        .bind(title)
        .bind(author)
        .bind(price_minor)
        .bind(format!("{title}, de {author}."))
        .execute(&pool)
        .await?;
        inserted += result.rows_affected();
    }

    sqlx::query(
        "INSERT INTO profiles (id, email, display_name) \
         VALUES ('demo-user', 'demo@tintero.cl', 'Lectora Demo') \
         ON CONFLICT (id) DO NOTHING",
    )
    .execute(&pool)
    .await?;

    info!(inserted, "Seeding complete!");
    Ok(())
}
