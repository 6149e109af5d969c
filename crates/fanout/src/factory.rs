use std::sync::Arc;

use async_trait::async_trait;
use pgsocket_core::error::FanoutError;
use pgsocket_core::options::FanoutOptions;
use pgsocket_core::ports::{AdapterFactory, FanoutAdapter};
use pgsocket_db::DbPool;

use crate::adapter::PgFanoutAdapter;

/// Builds [`PgFanoutAdapter`]s on a Postgres pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgAdapterFactory;

#[async_trait]
impl AdapterFactory<DbPool> for PgAdapterFactory {
    async fn create_adapter(
        &self,
        pool: DbPool,
        options: FanoutOptions,
    ) -> Result<Arc<dyn FanoutAdapter>, FanoutError> {
        let adapter = PgFanoutAdapter::start(pool, options).await?;
        Ok(Arc::new(adapter))
    }
}
