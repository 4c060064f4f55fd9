//! Load the ingredient catalogue from a JSON file of `{ "name", "measurement_unit" }` objects.
//!
//! Usage: `seed [path]` (defaults to `data/ingredients.json`). Rows that already exist are skipped.

use anyhow::Context;
use foodgram_api::db::{create_pool, database_url, run_migrations};
use serde::Deserialize;
use uuid::Uuid;

const DEFAULT_PATH: &str = "data/ingredients.json";

#[derive(Debug, Deserialize)]
struct IngredientRecord {
    name: String,
    measurement_unit: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let database_url = database_url()?;

    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_PATH.to_string());
    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading {path}"))?;
    let records: Vec<IngredientRecord> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))?;

    let pool = create_pool(&database_url).await?;
    // Ensure migrations are applied.
    run_migrations(&pool).await?;

    let inserted = seed_ingredients(&pool, &records).await?;
    println!(
        "Seed completed. {inserted} new ingredients, {} skipped",
        records.len() as u64 - inserted
    );
    Ok(())
}

async fn seed_ingredients(pool: &sqlx::PgPool, records: &[IngredientRecord]) -> anyhow::Result<u64> {
    let mut inserted = 0;
    for record in records {
        let name = record.name.trim();
        let unit = record.measurement_unit.trim();
        if name.is_empty() || unit.is_empty() {
            continue;
        }
        let result = sqlx::query(
            r#"
            INSERT INTO ingredients (id, name, measurement_unit)
            VALUES ($1, $2, $3)
            ON CONFLICT (name, measurement_unit) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(unit)
        .execute(pool)
        .await?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}
