//! sqlx-backed Postgres store.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info};

use kubegame_core::{BoxFuture, OperatorConfig};

use crate::connector::{ConnectTarget, StoreConnector};
use crate::error::{StoreError, StoreResult};
use crate::record::{CREATE_WORLD_TABLE, INSERT_WORLD, InsertOutcome, WorldRecord, WorldStore};

const TABLE_EXISTS: &str = "SELECT EXISTS (\
     SELECT 1 FROM information_schema.tables \
     WHERE table_schema = current_schema() AND table_name = $1)";

/// Opens pooled Postgres connections.
#[derive(Debug, Clone)]
pub struct PgConnector {
    max_connections: u32,
    connect_timeout: Duration,
}

impl PgConnector {
    pub fn new(max_connections: u32, connect_timeout: Duration) -> Self {
        Self {
            max_connections: max_connections.max(1),
            connect_timeout,
        }
    }

    pub fn from_config(config: &OperatorConfig) -> Self {
        Self::new(config.database.max_connections, config.connect_timeout())
    }
}

impl StoreConnector for PgConnector {
    fn connect<'a>(
        &'a self,
        target: &'a ConnectTarget,
    ) -> BoxFuture<'a, StoreResult<Arc<dyn WorldStore>>> {
        Box::pin(async move {
            let dsn = target.dsn()?;
            debug!(%target, "opening postgres pool");

            let pool = PgPoolOptions::new()
                .max_connections(self.max_connections)
                .acquire_timeout(self.connect_timeout)
                .connect(dsn.as_str())
                .await
                .map_err(|e| StoreError::Connect(format!("{target}: {e}")))?;

            info!(%target, "postgres pool opened");
            Ok(Arc::new(PgWorldStore::new(pool)) as Arc<dyn WorldStore>)
        })
    }
}

/// World store over a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgWorldStore {
    pool: PgPool,
}

impl PgWorldStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl WorldStore for PgWorldStore {
    fn table_exists<'a>(&'a self, table: &'a str) -> BoxFuture<'a, StoreResult<bool>> {
        Box::pin(async move {
            sqlx::query_scalar::<_, bool>(TABLE_EXISTS)
                .bind(table)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StoreError::Query(format!("checking table {table}: {e}")))
        })
    }

    fn create_world_table(&self) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query(CREATE_WORLD_TABLE)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Query(format!("creating worlds table: {e}")))?;
            Ok(())
        })
    }

    fn insert_world<'a>(
        &'a self,
        record: &'a WorldRecord,
    ) -> BoxFuture<'a, StoreResult<InsertOutcome>> {
        Box::pin(async move {
            let result = sqlx::query(INSERT_WORLD)
                .bind(&record.name)
                .bind(&record.game)
                .bind(&record.description)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Query(format!("inserting world {}: {e}", record.name)))?;

            Ok(if result.rows_affected() == 0 {
                InsertOutcome::AlreadyPresent
            } else {
                InsertOutcome::Inserted
            })
        })
    }
}
