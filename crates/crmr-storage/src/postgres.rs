//! Postgres-backed store. Queries are rendered to parameterized SQL and rows
//! come back as JSON objects via `row_to_json`.

use anyhow::Context;
use async_trait::async_trait;
use crmr_core::{value_text, ColumnType, Row};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::{Comparison, DataStore, Query, QueryError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStatement {
    pub sql: String,
    /// Text parameters, cast in SQL to the column type. `None` binds NULL.
    pub params: Vec<Option<String>>,
}

/// Render `query` as a single SELECT. Identifiers come from the entity schema,
/// so unknown columns are rejected here rather than interpolated.
pub fn render_sql(query: &Query) -> Result<SqlStatement, QueryError> {
    query.check_columns()?;
    let schema = query.schema();

    let projection = query
        .fields
        .iter()
        .map(|f| quote_ident(f))
        .collect::<Vec<_>>()
        .join(", ");

    let mut params = Vec::with_capacity(query.conditions.len());
    let mut predicates = Vec::with_capacity(query.conditions.len());
    for condition in &query.conditions {
        let column_type = schema
            .column(&condition.field)
            .map(|c| c.column_type)
            .unwrap_or(ColumnType::Text);
        params.push(value_text(&condition.value));
        let placeholder = params.len();
        let predicate = match condition.comparison {
            Comparison::Ilike => format!(
                "{}::text ILIKE ${placeholder}",
                quote_ident(&condition.field)
            ),
            other => format!(
                "{} {} ${placeholder}::{}",
                quote_ident(&condition.field),
                other.sql_operator(),
                column_type.pg_type()
            ),
        };
        predicates.push(predicate);
    }

    let mut inner = format!("SELECT {projection} FROM {}", quote_ident(schema.table));
    if !predicates.is_empty() {
        inner.push_str(" WHERE ");
        inner.push_str(&predicates.join(" AND "));
    }

    Ok(SqlStatement {
        sql: format!("SELECT row_to_json(t) AS row FROM ({inner}) t"),
        params,
    })
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .context("connecting to postgres")?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl DataStore for PgStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn execute(&self, query: &Query) -> Result<Vec<Row>, QueryError> {
        let statement = render_sql(query)?;
        debug!(sql = %statement.sql, params = statement.params.len(), "postgres report query");

        let mut sql_query = sqlx::query_scalar::<_, JsonValue>(&statement.sql);
        for param in &statement.params {
            sql_query = sql_query.bind(param.clone());
        }
        let values = sql_query.fetch_all(&self.pool).await.map_err(|err| {
            warn!(data_source = %query.data_source, error = %err, "postgres report query failed");
            QueryError::Backend(err)
        })?;

        values
            .into_iter()
            .map(|value| match value {
                JsonValue::Object(row) => Ok(row),
                other => Err(QueryError::MalformedRow {
                    data_source: query.data_source,
                    message: format!("expected object, got {other}"),
                }),
            })
            .collect()
    }
}
