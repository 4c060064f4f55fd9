use anyhow::Result;
use sea_orm::{DatabaseConnection, SqlxPostgresConnector};
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

pub type DbPool = sqlx::PgPool;
pub type OrmConn = DatabaseConnection;

pub async fn create_pool(database_url: &str) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Wrap an existing pool so SeaORM and raw `sqlx` queries share the same connections.
pub fn orm_from_pool(pool: &DbPool) -> OrmConn {
    SqlxPostgresConnector::from_sqlx_postgres_pool(pool.clone())
}

/// Apply the SQL files in `migrations/` that have not run yet.
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// `DATABASE_URL` on its own, for tooling that needs no other configuration.
pub fn database_url() -> Result<String> {
    database_url_from(|key| std::env::var(key).ok())
}

fn database_url_from(lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    lookup("DATABASE_URL")
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is not set"))
}

#[cfg(test)]
mod tests {
    use super::database_url_from;

    #[test]
    fn database_url_needs_nothing_else() {
        let url = database_url_from(|key| {
            (key == "DATABASE_URL").then(|| "postgres://localhost/foodgram".to_string())
        })
        .unwrap();
        assert_eq!(url, "postgres://localhost/foodgram");
    }

    #[test]
    fn missing_or_blank_database_url_is_an_error() {
        assert!(database_url_from(|_| None).is_err());
        assert!(database_url_from(|_| Some("  ".to_string())).is_err());
    }
}
