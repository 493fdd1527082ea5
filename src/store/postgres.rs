use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use derive_new::new;
use futures::TryStreamExt as _;
use rust_decimal::Decimal;
use snafu::{IntoError as _, ResultExt as _};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column as _, Postgres, Row as _, TypeInfo as _};
use tracing::instrument;
use uuid::Uuid;

use super::*;
use crate::config::DatabaseConfig;
use crate::model::Timestamp;

/// Extra time the client waits past the server-side `statement_timeout` before abandoning a statement.
const CLIENT_GRACE: Duration = Duration::from_secs(1);

/// A PostgreSQL backed [Store] sharing a bounded pool of connections between requests.
#[derive(Debug, Clone, new)]
pub struct PgStore {
    pool: PgPool,
    query_timeout: Duration,
}

impl Connection for DatabaseConfig {
    type Database = PgStore;

    async fn connect(&self) -> Result<PgStore, DatabaseError> {
        let host = self.url.host_str().unwrap_or("localhost").to_string();

        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(self.url.as_str())
            .await
            .context(DatabaseConnectionSnafu { host: host.clone() })?;

        tracing::info!(
            %host,
            max_connections = self.max_connections,
            query_timeout = ?self.query_timeout,
            "connected to the analytics database"
        );

        Ok(PgStore::new(pool, self.query_timeout))
    }
}

impl PgStore {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Create the tables and indexes described by the catalog, if they do not exist yet.
    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context(MigrationSnafu)?;

        tracing::info!("database schema is up to date");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("closed the database pool");
    }

    async fn run(&self, sql: &Validated) -> Result<Scalar> {
        // the lease goes back to the pool when `tx` is dropped, on every path out of this function
        let mut tx = self.pool.begin().await.context(AcquireSnafu)?;

        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .context(ExecuteSnafu)?;

        sqlx::query(&statement_timeout(self.query_timeout))
            .execute(&mut *tx)
            .await
            .context(ExecuteSnafu)?;

        let (first, second) = {
            let mut rows = sqlx::query(sql.as_str()).persistent(false).fetch(&mut *tx);
            let first = rows.try_next().await.map_err(|source| self.classify(source))?;
            let second = match first {
                Some(_) => rows.try_next().await.map_err(|source| self.classify(source))?,
                None => None,
            };
            (first, second)
        };

        let (rows, columns) = observed_shape(first.as_ref().map(|row| row.len()), second.is_some());
        check_shape(rows, columns)?;
        let Some(row) = first else {
            return UnexpectedShapeSnafu { rows, columns }.fail();
        };

        let scalar = decode(&row)?;

        tx.rollback().await.context(ExecuteSnafu)?;

        Ok(scalar)
    }

    fn classify(&self, source: sqlx::Error) -> QueryError {
        let canceled = source
            .as_database_error()
            .and_then(|error| error.code())
            .is_some_and(|code| code == QUERY_CANCELED);

        if canceled {
            TimeoutSnafu {
                timeout: self.query_timeout,
            }
            .build()
        } else {
            ExecuteSnafu.into_error(source)
        }
    }
}

impl Store for PgStore {
    #[instrument(skip(self, sql), fields(sql = %sql))]
    async fn execute(&self, sql: &Validated) -> Result<Scalar> {
        let budget = self.query_timeout;

        match tokio::time::timeout(budget + CLIENT_GRACE, self.run(sql)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout = ?budget, "abandoned a statement that outlived its budget");
                TimeoutSnafu { timeout: budget }.fail()
            }
        }
    }
}

/// `statement_timeout = 0` disables the limit, so a budget under a millisecond rounds up to one.
fn statement_timeout(budget: Duration) -> String {
    format!("SET LOCAL statement_timeout = {}", budget.as_millis().max(1))
}

fn decode(row: &PgRow) -> Result<Scalar> {
    let type_name = row.column(0).type_info().name().to_string();

    match type_name.as_str() {
        "INT2" => get(row, |value: i16| Scalar::Integer(value.into())),
        "INT4" => get(row, |value: i32| Scalar::Integer(value.into())),
        "INT8" => get(row, Scalar::Integer),
        "FLOAT4" => get(row, |value: f32| Scalar::Float(value.into())),
        "FLOAT8" => get(row, Scalar::Float),
        "NUMERIC" => get(row, |value: Decimal| Scalar::Decimal(value)),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => get(row, Scalar::Text),
        "BOOL" => get(row, Scalar::Bool),
        "UUID" => get(row, |value: Uuid| Scalar::Uuid(value)),
        "DATE" => get(row, |value: NaiveDate| Scalar::Date(value)),
        "TIMESTAMPTZ" => get(row, |value: Timestamp| Scalar::Timestamp(value)),
        "TIMESTAMP" => get(row, |value: NaiveDateTime| Scalar::Timestamp(value.and_utc())),
        _ => UnsupportedTypeSnafu { type_name }.fail(),
    }
}

fn get<'r, T>(row: &'r PgRow, scalar: impl FnOnce(T) -> Scalar) -> Result<Scalar>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    let value: Option<T> = row.try_get(0).context(DecodeSnafu)?;
    Ok(value.map_or(Scalar::Null, scalar))
}
