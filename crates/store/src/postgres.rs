//! Postgres-backed [`Store`]: one connection pool, one table for every
//! backend concern. Here the single concern is `store_rows(table_name,
//! data)` — rows are carried as opaque `jsonb`, matching the `Store`
//! contract's own opaque `Row` type, so the schema does not need to grow a
//! Postgres column per field every time a record type changes shape.
//!
//! `where_`/`set` are applied in the application layer rather than pushed
//! down into SQL, mirroring the file backend's filtering — the engine only
//! ever runs these filters over one execution tree's worth of rows at a
//! time, so this is not a hot path.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row as SqlxRow};
use tracing::info;

use crate::contract::{project_row, row_matches, ColumnSet, Row, Store, Table, Where};
use crate::error::StoreError;

/// Connects to Postgres and exposes the generic `store_rows` table behind
/// the `Store` contract.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to `database_url` with a pool of up to `max_connections`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        info!("connecting to Postgres store (max_connections={max_connections})");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Construct directly from an existing pool (used by callers that
    /// already manage one, and by tests against a live database).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded schema migration.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        info!("running store migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn fetch_rows(&self, table: Table) -> Result<Vec<(i64, Row)>, StoreError> {
        let records = sqlx::query("SELECT id, data FROM store_rows WHERE table_name = $1 ORDER BY id")
            .bind(table.name())
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(records.len());
        for record in records {
            let id: i64 = record.try_get("id")?;
            let data: serde_json::Value = record.try_get("data")?;
            match data {
                serde_json::Value::Object(map) => out.push((id, map)),
                other => unreachable!("store_rows.data is always a JSON object, got {other:?}"),
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn insert(&self, table: Table, row: Row) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO store_rows (table_name, data) VALUES ($1, $2)")
            .bind(table.name())
            .bind(serde_json::Value::Object(row))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update(&self, table: Table, where_: &Where, set: &ColumnSet) -> Result<(), StoreError> {
        let rows = self.fetch_rows(table).await?;
        for (id, mut row) in rows {
            if row_matches(&row, where_) {
                for (col, value) in set {
                    row.insert(col.clone(), value.clone());
                }
                sqlx::query("UPDATE store_rows SET data = $1 WHERE id = $2")
                    .bind(serde_json::Value::Object(row))
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        table: Table,
        where_: &Where,
        projection: Option<&[String]>,
    ) -> Result<Vec<Row>, StoreError> {
        let rows = self.fetch_rows(table).await?;
        Ok(rows
            .into_iter()
            .map(|(_, row)| row)
            .filter(|row| row_matches(row, where_))
            .map(|row| project_row(&row, projection))
            .collect())
    }

    async fn exists(&self, table: Table, where_: &Where) -> Result<bool, StoreError> {
        let rows = self.fetch_rows(table).await?;
        Ok(rows.iter().any(|(_, row)| row_matches(row, where_)))
    }
}
