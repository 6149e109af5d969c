use pgsocket_core::error::CoreError;
use pgsocket_core::ports::DatabaseAccess;
use sqlx::postgres::PgPoolOptions;

pub mod repositories;

pub type DbPool = sqlx::PgPool;

/// Default upper bound on pooled connections.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 20;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to confirm the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await
        .map(|_| ())
}

/// Apply the embedded migrations in `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await
}

/// The application's database-access object.
///
/// Holds the pool of the primary connection. Cloning the pool it hands out
/// shares the same underlying connections.
#[derive(Debug, Clone)]
pub struct Database {
    master: DbPool,
}

impl Database {
    pub fn new(master: DbPool) -> Self {
        Self { master }
    }

    /// Borrow the primary pool without the closed-pool check.
    pub fn master(&self) -> &DbPool {
        &self.master
    }
}

impl DatabaseAccess for Database {
    type Pool = DbPool;

    fn master_pool(&self) -> Result<DbPool, CoreError> {
        if self.master.is_closed() {
            return Err(CoreError::DependencyUnavailable(
                "primary database pool is closed".into(),
            ));
        }
        Ok(self.master.clone())
    }
}
