use foodgram_api::db::{create_pool, database_url, run_migrations};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let pool = create_pool(&database_url()?).await?;
    run_migrations(&pool).await?;
    println!("Migrations applied");
    Ok(())
}
